mod app;
mod auth;
mod chunker;
mod config;
mod db;
mod dispatch;
mod embedding;
mod error;
mod limiter;
mod models;
mod processor;
mod reconciler;
mod routes;
#[cfg(test)]
mod testing;
mod vector_store;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use app::AppState;
use chunker::Chunker;
use config::load_settings_from_path;
use db::DocumentStore;
use db::postgres::PostgresDocumentStore;
use dispatch::queue::{JobQueue, QueueDispatcher, spawn_worker};
use dispatch::{Dispatcher, ScanDispatcher};
use embedding::openai::OpenAIEmbeddingModel;
use limiter::InMemoryCounterStore;
use processor::DocumentProcessor;
use reconciler::{BatchReconciler, ReconcilerConfig};
use vector_store::remote::RemoteVectorIndex;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting tutordesk ingestion server...");

    // Load configuration.
    let settings = Arc::new(load_settings_from_path("tutordesk.toml")?);
    info!(
        "Configuration loaded: environment={}, host={}, port={}",
        settings.environment, settings.host, settings.port
    );

    // Initialize document store.
    let store = Arc::new(
        PostgresDocumentStore::new(&settings.postgres_uri, settings.db_pool_size).await?,
    );
    store.initialize().await?;
    info!("Document store initialized");

    // Initialize remote vector index.
    let index = Arc::new(RemoteVectorIndex::new(
        &settings.vector_index_url,
        &settings.vector_index_api_key,
        settings.upsert_batch_size,
        settings.upsert_batch_delay_ms,
        settings.index_request_timeout_secs,
    ));
    info!("Vector index client initialized: {}", settings.vector_index_url);

    // Initialize embedding model.
    let openai_api_key = std::env::var("OPENAI_API_KEY").unwrap_or_else(|_| "".to_string());
    let embedder = Arc::new(OpenAIEmbeddingModel::new(
        &settings.embedding_model,
        &openai_api_key,
        &settings.embedding_api_base,
        settings.vector_dimensions,
        settings.embedding_batch_size,
    ));
    info!("Embedding model initialized: {}", settings.embedding_model);

    // Build the processing pipeline.
    let processor = Arc::new(DocumentProcessor::new(
        store.clone(),
        embedder.clone(),
        index.clone(),
        Chunker::new(settings.chunk_size, settings.chunk_overlap),
    ));
    let reconciler = Arc::new(BatchReconciler::new(
        store.clone(),
        processor.clone(),
        ReconcilerConfig {
            batch_size: settings.processing_batch_size,
            stuck_after: settings.stuck_threshold(),
            max_retries: settings.max_retries,
            run_budget: settings.run_budget(),
        },
    ));

    // Probe the job queue once at startup; fall back to scan mode if it is
    // disabled or unreachable.
    let dispatcher: Arc<dyn Dispatcher> = if settings.queue_enabled {
        let queue = match JobQueue::connect(&settings.postgres_uri).await {
            Ok(queue) => {
                if queue.probe().await {
                    Some(Arc::new(queue))
                } else {
                    None
                }
            }
            Err(_) => None,
        };
        match queue {
            Some(queue) => {
                queue.initialize().await?;
                spawn_worker(
                    queue.clone(),
                    store.clone(),
                    processor.clone(),
                    std::time::Duration::from_millis(settings.queue_poll_interval_ms),
                    settings.stuck_threshold(),
                );
                info!("Dispatch mode: queue");
                Arc::new(QueueDispatcher::new(queue))
            }
            None => {
                warn!("Job queue unreachable, falling back to scan dispatch");
                Arc::new(ScanDispatcher)
            }
        }
    } else {
        info!("Dispatch mode: scan");
        Arc::new(ScanDispatcher)
    };

    // Build application state.
    let state = Arc::new(AppState {
        settings: settings.clone(),
        store,
        index,
        embedder,
        processor,
        reconciler,
        dispatcher,
        limiter: Arc::new(InMemoryCounterStore::new()),
    });

    // Build router.
    let app = routes::build_router(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server.
    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

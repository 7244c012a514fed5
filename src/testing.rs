//! Shared in-memory fakes for the embedding and vector index seams, plus a
//! fully wired `AppState` for handler tests.

use async_trait::async_trait;
use axum::http::HeaderMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::app::AppState;
use crate::chunker::Chunker;
use crate::config::Settings;
use crate::db::memory::InMemoryDocumentStore;
use crate::dispatch::ScanDispatcher;
use crate::embedding::EmbeddingModel;
use crate::limiter::InMemoryCounterStore;
use crate::models::chunk::{VectorMatch, VectorRecord};
use crate::processor::DocumentProcessor;
use crate::reconciler::{BatchReconciler, ReconcilerConfig};
use crate::vector_store::{IndexStatus, UpsertReport, VectorIndex};

/// Deterministic embedder: every text maps to a fixed-dimension vector.
pub struct FakeEmbedder {
    pub dimensions: usize,
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(dimensions: usize) -> Self {
        let embedder = Self::new(dimensions);
        embedder.fail.store(true, Ordering::SeqCst);
        embedder
    }
}

#[async_trait]
impl EmbeddingModel for FakeEmbedder {
    async fn embed_for_ingestion(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("embedding backend unavailable");
        }
        Ok(texts.iter().map(|_| vec![0.1; self.dimensions]).collect())
    }

    async fn embed_for_query(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let _ = text;
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("embedding backend unavailable");
        }
        Ok(vec![0.1; self.dimensions])
    }

    fn dimensions(&self) -> u32 {
        self.dimensions as u32
    }
}

pub fn test_settings() -> Settings {
    Settings {
        host: "127.0.0.1".to_string(),
        port: 0,
        environment: "test".to_string(),
        jwt_algorithm: "HS256".to_string(),
        jwt_secret_key: "test-jwt-secret".to_string(),
        bypass_auth_mode: true,
        dev_user_id: "dev-user".to_string(),
        cron_secret: "test-cron-secret".to_string(),
        postgres_uri: String::new(),
        db_pool_size: 1,
        embedding_model: "text-embedding-3-small".to_string(),
        embedding_api_base: "http://127.0.0.1:1".to_string(),
        embedding_batch_size: 100,
        vector_dimensions: 4,
        chunk_size: 40,
        chunk_overlap: 5,
        vector_index_url: "http://127.0.0.1:1".to_string(),
        vector_index_api_key: "test-key".to_string(),
        upsert_batch_size: 20,
        upsert_batch_delay_ms: 0,
        index_request_timeout_secs: 1,
        processing_batch_size: 10,
        stuck_threshold_minutes: 10,
        max_retries: 3,
        run_budget_seconds: 300,
        queue_enabled: false,
        queue_poll_interval_ms: 2000,
        reprocess_per_window: 10,
        limit_window_seconds: 60,
    }
}

/// Wire a complete `AppState` over the in-memory store and fakes. Returns the
/// store separately so tests can seed and inspect documents.
pub fn test_state() -> (Arc<AppState>, Arc<InMemoryDocumentStore>) {
    test_state_with(Arc::new(FakeIndex::new()))
}

pub fn test_state_with(index: Arc<FakeIndex>) -> (Arc<AppState>, Arc<InMemoryDocumentStore>) {
    let settings = Arc::new(test_settings());
    let store = Arc::new(InMemoryDocumentStore::new());
    let embedder = Arc::new(FakeEmbedder::new(4));
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
    let state = Arc::new(AppState {
        settings,
        store: store.clone(),
        index,
        embedder,
        processor,
        reconciler,
        dispatcher: Arc::new(ScanDispatcher),
        limiter: Arc::new(InMemoryCounterStore::new()),
    });
    (state, store)
}

pub fn cron_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("authorization", "Bearer test-cron-secret".parse().unwrap());
    headers
}

/// Records upserts; can drop everything or a fixed number of trailing vectors.
#[derive(Default)]
pub struct FakeIndex {
    pub upserted: Mutex<Vec<VectorRecord>>,
    pub fail_all: AtomicBool,
    pub short_by: AtomicUsize,
    pub deleted: Mutex<Vec<String>>,
    pub matches: Mutex<Vec<VectorMatch>>,
}

impl FakeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upserted_ids(&self) -> Vec<String> {
        self.upserted
            .lock()
            .unwrap()
            .iter()
            .map(|v| v.id.clone())
            .collect()
    }
}

#[async_trait]
impl VectorIndex for FakeIndex {
    async fn upsert_vectors(&self, vectors: &[VectorRecord]) -> UpsertReport {
        if self.fail_all.load(Ordering::SeqCst) {
            return UpsertReport {
                attempted: vectors.len(),
                stored: 0,
                failed_ids: vectors.iter().map(|v| v.id.clone()).collect(),
            };
        }
        let short = self.short_by.load(Ordering::SeqCst).min(vectors.len());
        let stored_count = vectors.len() - short;
        let mut upserted = self.upserted.lock().unwrap();
        upserted.extend(vectors[..stored_count].iter().cloned());
        UpsertReport {
            attempted: vectors.len(),
            stored: stored_count,
            failed_ids: vectors[stored_count..].iter().map(|v| v.id.clone()).collect(),
        }
    }

    async fn query_vectors(
        &self,
        _query: &[f32],
        _chatbot_id: &str,
        _top_k: usize,
    ) -> Vec<VectorMatch> {
        self.matches.lock().unwrap().clone()
    }

    async fn delete_document_vectors(&self, document_id: &str) -> bool {
        self.deleted.lock().unwrap().push(document_id.to_string());
        true
    }

    async fn check_status(&self) -> IndexStatus {
        IndexStatus {
            connected: true,
            stats: None,
            error: None,
        }
    }
}

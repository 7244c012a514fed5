//! PostgreSQL-backed job queue. Jobs are plain document ids; dequeue uses
//! `FOR UPDATE SKIP LOCKED` so multiple workers never double-claim a job.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{DispatchMode, Dispatcher};
use crate::db::DocumentStore;
use crate::processor::DocumentProcessor;

pub struct JobQueue {
    pool: PgPool,
}

impl JobQueue {
    pub async fn connect(uri: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(uri)
            .await?;
        Ok(Self { pool })
    }

    /// Cheap liveness check run once at startup to pick the dispatch mode.
    pub async fn probe(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    pub async fn initialize(&self) -> anyhow::Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS processing_jobs (
                id BIGSERIAL PRIMARY KEY,
                document_id TEXT NOT NULL,
                enqueued_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn enqueue(&self, document_id: &str) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO processing_jobs (document_id) VALUES ($1)")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Pop the oldest pending job, if any. The delete-returning form makes
    /// claim and removal one atomic step.
    pub async fn dequeue(&self) -> anyhow::Result<Option<String>> {
        let row = sqlx::query(
            "DELETE FROM processing_jobs
             WHERE id = (
                 SELECT id FROM processing_jobs
                 ORDER BY enqueued_at ASC, id ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING document_id",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get("document_id")))
    }

    pub async fn depth(&self) -> anyhow::Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS depth FROM processing_jobs")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("depth"))
    }
}

pub struct QueueDispatcher {
    queue: Arc<JobQueue>,
}

impl QueueDispatcher {
    pub fn new(queue: Arc<JobQueue>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl Dispatcher for QueueDispatcher {
    fn mode(&self) -> DispatchMode {
        DispatchMode::Queue
    }

    async fn document_eligible(&self, document_id: &str) -> anyhow::Result<()> {
        self.queue.enqueue(document_id).await
    }

    async fn queue_depth(&self) -> Option<i64> {
        match self.queue.depth().await {
            Ok(depth) => Some(depth),
            Err(err) => {
                warn!(error = %err, "queue depth unavailable");
                None
            }
        }
    }
}

/// Background worker that drains the queue. Claims each document through the
/// same conditional claim as the reconciler, so a job enqueued twice or
/// already picked up elsewhere is dropped harmlessly.
pub fn spawn_worker(
    queue: Arc<JobQueue>,
    store: Arc<dyn DocumentStore>,
    processor: Arc<DocumentProcessor>,
    poll_interval: std::time::Duration,
    stuck_after: chrono::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!(poll_interval_ms = poll_interval.as_millis() as u64, "queue worker started");
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            // Drain everything pending, then go back to sleep.
            loop {
                let document_id = match queue.dequeue().await {
                    Ok(Some(id)) => id,
                    Ok(None) => break,
                    Err(err) => {
                        error!(error = %err, "queue dequeue failed");
                        break;
                    }
                };
                if let Err(err) = handle_job(&store, &processor, &document_id, stuck_after).await {
                    warn!(document_id, error = %err, "queued job failed");
                }
            }
        }
    })
}

async fn handle_job(
    store: &Arc<dyn DocumentStore>,
    processor: &Arc<DocumentProcessor>,
    document_id: &str,
    stuck_after: chrono::Duration,
) -> anyhow::Result<()> {
    let Some(document) = store.get_document(document_id).await? else {
        warn!(document_id, "queued document no longer exists");
        return Ok(());
    };
    if !store.claim(document_id, stuck_after).await? {
        info!(document_id, "queued document not claimable, dropping job");
        return Ok(());
    }
    // Terminal status is already written by the processor; the error value
    // only matters for logging here.
    if let Err(err) = processor.process(&document).await {
        warn!(document_id, error = %err, "queued document processing failed");
    }
    Ok(())
}

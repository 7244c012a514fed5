//! Batch reconciler: picks up eligible documents and drives each through the
//! processor, strictly one at a time, under a wall-clock run budget.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, warn};

use crate::db::DocumentStore;
use crate::error::ProcessError;
use crate::models::api::{DocumentOutcome, ProcessRunSummary};
use crate::models::document::Document;
use crate::processor::DocumentProcessor;

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Max documents per run.
    pub batch_size: i64,
    /// Age after which a `processing` document is considered abandoned.
    pub stuck_after: chrono::Duration,
    /// Error documents at or past this retry count are left alone.
    pub max_retries: i32,
    /// Wall-clock budget for one run; the remainder waits for the next run.
    pub run_budget: Duration,
}

pub struct BatchReconciler {
    store: Arc<dyn DocumentStore>,
    processor: Arc<DocumentProcessor>,
    config: ReconcilerConfig,
}

impl BatchReconciler {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        processor: Arc<DocumentProcessor>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            processor,
            config,
        }
    }

    /// Execute one reconciliation run. Fails only if the eligibility listing
    /// itself fails; per-document failures are captured in the summary.
    pub async fn run(&self) -> anyhow::Result<ProcessRunSummary> {
        let started = Instant::now();
        let eligible = self
            .store
            .list_eligible(
                self.config.batch_size,
                self.config.stuck_after,
                self.config.max_retries,
            )
            .await?;

        info!(candidates = eligible.len(), "reconciliation run started");

        let mut results = Vec::with_capacity(eligible.len());
        for document in &eligible {
            if started.elapsed() >= self.config.run_budget {
                warn!(
                    processed = results.len(),
                    remaining = eligible.len() - results.len(),
                    "run budget exhausted, deferring remainder"
                );
                break;
            }

            match self.store.claim(&document.id, self.config.stuck_after).await {
                Ok(true) => results.push(self.process_one(document).await),
                // Another worker got there first; not counted against the run.
                Ok(false) => {
                    info!(document_id = %document.id, "claim lost, skipping");
                }
                Err(err) => {
                    results.push(DocumentOutcome {
                        document_id: document.id.clone(),
                        success: false,
                        chunk_count: None,
                        error: Some(format!("claim failed: {err}")),
                        processing_time_ms: 0,
                    });
                }
            }
        }

        let successful = results.iter().filter(|r| r.success).count();
        let summary = ProcessRunSummary {
            processed: results.len(),
            successful,
            failed: results.len() - successful,
            results,
        };
        info!(
            processed = summary.processed,
            successful = summary.successful,
            failed = summary.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "reconciliation run finished"
        );
        Ok(summary)
    }

    async fn process_one(&self, document: &Document) -> DocumentOutcome {
        let started = Instant::now();
        match self.processor.process(document).await {
            Ok(chunk_count) => DocumentOutcome {
                document_id: document.id.clone(),
                success: true,
                chunk_count: Some(chunk_count),
                error: None,
                processing_time_ms: started.elapsed().as_millis() as u64,
            },
            Err(err) => {
                self.record_failure(&document.id, &err).await;
                DocumentOutcome {
                    document_id: document.id.clone(),
                    success: false,
                    chunk_count: None,
                    error: Some(err.to_string()),
                    processing_time_ms: started.elapsed().as_millis() as u64,
                }
            }
        }
    }

    /// Stamp the attempt into the document's metadata so operators can see
    /// when and why the last attempt failed without trawling logs.
    async fn record_failure(&self, document_id: &str, err: &ProcessError) {
        let mut patch = std::collections::HashMap::new();
        patch.insert(
            "last_attempt_at".to_string(),
            serde_json::json!(Utc::now().to_rfc3339()),
        );
        patch.insert(
            "last_attempt_error".to_string(),
            serde_json::json!(err.to_string()),
        );
        if let Err(db_err) = self
            .store
            .merge_processing_metadata(document_id, &patch)
            .await
        {
            warn!(document_id, error = %db_err, "failed to record attempt metadata");
        }
    }
}

//! Dispatch strategy for batch reprocessing. With a reachable job queue,
//! batch requests enqueue and a background worker drains; otherwise the
//! service falls back to in-process sequential scans.

pub mod queue;

use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    Queue,
    Scan,
}

impl DispatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchMode::Queue => "queue",
            DispatchMode::Scan => "scan",
        }
    }
}

/// Strategy seam used by the batch-reprocess route and diagnostics.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    fn mode(&self) -> DispatchMode;

    /// Hand one document over for asynchronous processing. In scan mode this
    /// is a no-op; the caller marks and processes inline.
    async fn document_eligible(&self, document_id: &str) -> anyhow::Result<()>;

    /// Pending job count, when the backing mode can report one.
    async fn queue_depth(&self) -> Option<i64>;
}

/// Fallback dispatcher when no queue is configured or reachable.
pub struct ScanDispatcher;

#[async_trait]
impl Dispatcher for ScanDispatcher {
    fn mode(&self) -> DispatchMode {
        DispatchMode::Scan
    }

    async fn document_eligible(&self, _document_id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn queue_depth(&self) -> Option<i64> {
        None
    }
}

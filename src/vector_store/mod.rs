pub mod remote;
pub mod utils;

use async_trait::async_trait;
use serde::Serialize;

use crate::models::chunk::{VectorMatch, VectorRecord};

/// Verified outcome of an upsert call: how many vectors actually landed in
/// the index, and which ids were lost.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpsertReport {
    pub attempted: usize,
    pub stored: usize,
    pub failed_ids: Vec<String>,
}

impl UpsertReport {
    pub fn complete(&self) -> bool {
        self.stored == self.attempted
    }
}

/// Connectivity/diagnostics snapshot of the remote index.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Abstract vector index interface. Implementations are tolerant by
/// contract: they never panic or propagate transport errors; failures show
/// up in the returned report/flags.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Upsert vectors in batches, falling back to per-vector calls for any
    /// batch that fails. Returns the verified stored count.
    async fn upsert_vectors(&self, vectors: &[VectorRecord]) -> UpsertReport;

    /// Similarity query scoped to one chatbot. Returns an empty list on any
    /// error; query failures degrade rather than propagate.
    async fn query_vectors(&self, query: &[f32], chatbot_id: &str, top_k: usize)
    -> Vec<VectorMatch>;

    /// Delete all vectors whose metadata references the document id.
    async fn delete_document_vectors(&self, document_id: &str) -> bool;

    /// Stats/describe call for health diagnostics.
    async fn check_status(&self) -> IndexStatus;
}

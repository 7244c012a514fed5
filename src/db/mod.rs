pub mod postgres;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::Duration;
use std::collections::HashMap;

use crate::models::document::Document;

/// Persistent record of uploaded documents and their processing status.
///
/// This is the only shared mutable resource between concurrent processing
/// runs; all coordination happens through `status` / `processing_started_at`
/// via the conditional `claim`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create tables/indexes.
    async fn initialize(&self) -> anyhow::Result<()>;

    /// Fetch one document, including its content.
    async fn get_document(&self, id: &str) -> anyhow::Result<Option<Document>>;

    /// Documents needing work, oldest first: `uploaded`, `processing` past
    /// the stuck threshold, or `error` below the retry cap.
    async fn list_eligible(
        &self,
        limit: i64,
        stuck_after: Duration,
        max_retries: i32,
    ) -> anyhow::Result<Vec<Document>>;

    /// Conditionally claim a document for processing: succeeds only while it
    /// is still eligible (or stuck), so two concurrent runs can never both
    /// claim it. Stamps `processing_started_at` and clears the error message.
    async fn claim(&self, id: &str, stuck_after: Duration) -> anyhow::Result<bool>;

    /// Move a set of documents straight to `processing`, skipping any that
    /// are already `processing` or `completed`. Returns the ids accepted.
    async fn mark_processing(&self, ids: &[String]) -> anyhow::Result<Vec<String>>;

    /// Terminal success: status `completed`, chunk count, completion stamp.
    async fn mark_completed(&self, id: &str, chunk_count: i32) -> anyhow::Result<()>;

    /// Terminal failure for this attempt: status `error`, message recorded,
    /// `retry_count` incremented.
    async fn mark_error(&self, id: &str, message: &str) -> anyhow::Result<()>;

    /// Manual reprocess: back to `uploaded` with error state cleared.
    /// `retry_count` is preserved; it only ever increases.
    async fn reset_for_reprocess(&self, id: &str) -> anyhow::Result<()>;

    /// Merge keys into `processing_metadata` without clobbering existing
    /// entries.
    async fn merge_processing_metadata(
        &self,
        id: &str,
        patch: &HashMap<String, serde_json::Value>,
    ) -> anyhow::Result<()>;

    /// Document counts grouped by status, for diagnostics.
    async fn status_counts(&self) -> anyhow::Result<HashMap<String, i64>>;

    /// Documents sitting in `processing` past the threshold.
    async fn stuck_documents(&self, stuck_after: Duration) -> anyhow::Result<Vec<Document>>;

    /// Owner (user id) of a chatbot, for authorization on manual endpoints.
    async fn chatbot_owner(&self, chatbot_id: &str) -> anyhow::Result<Option<String>>;

    /// Remove a document record. Vector cleanup is the caller's job.
    async fn delete_document(&self, id: &str) -> anyhow::Result<bool>;
}

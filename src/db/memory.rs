//! In-process `DocumentStore` used by processor/reconciler tests. Mirrors
//! the conditional-claim semantics of the Postgres implementation.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use super::DocumentStore;
use crate::models::document::{Document, DocumentStatus};

#[derive(Default)]
pub struct InMemoryDocumentStore {
    docs: Mutex<HashMap<String, Document>>,
    owners: Mutex<HashMap<String, String>>,
    /// When set, list_eligible fails, simulating record-store outage.
    pub fail_listing: std::sync::atomic::AtomicBool,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, doc: Document) {
        self.docs.lock().unwrap().insert(doc.id.clone(), doc);
    }

    pub fn set_owner(&self, chatbot_id: &str, user_id: &str) {
        self.owners
            .lock()
            .unwrap()
            .insert(chatbot_id.to_string(), user_id.to_string());
    }

    pub fn get(&self, id: &str) -> Option<Document> {
        self.docs.lock().unwrap().get(id).cloned()
    }

    fn claimable(doc: &Document, stuck_after: Duration, now: DateTime<Utc>) -> bool {
        match doc.status {
            DocumentStatus::Uploaded | DocumentStatus::Error => true,
            DocumentStatus::Processing => doc.is_stuck(stuck_after, now),
            DocumentStatus::Completed => false,
        }
    }
}

/// Build a test document. `created_offset_secs` orders documents for
/// oldest-first selection checks.
pub fn test_document(id: &str, status: DocumentStatus, created_offset_secs: i64) -> Document {
    Document {
        id: id.to_string(),
        chatbot_id: "cb1".to_string(),
        file_name: format!("{id}.txt"),
        content: Some("Cells are the basic unit of life. Photosynthesis feeds the plant. Mitochondria produce energy. Osmosis moves water.".to_string()),
        status,
        retry_count: 0,
        chunk_count: 0,
        error_message: None,
        processing_started_at: None,
        processing_completed_at: None,
        processing_metadata: HashMap::new(),
        created_at: Utc::now() - Duration::seconds(3600 - created_offset_secs),
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn get_document(&self, id: &str) -> anyhow::Result<Option<Document>> {
        Ok(self.get(id))
    }

    async fn list_eligible(
        &self,
        limit: i64,
        stuck_after: Duration,
        max_retries: i32,
    ) -> anyhow::Result<Vec<Document>> {
        if self.fail_listing.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("record store unavailable");
        }
        let now = Utc::now();
        let docs = self.docs.lock().unwrap();
        let mut eligible: Vec<Document> = docs
            .values()
            .filter(|d| match d.status {
                DocumentStatus::Uploaded => true,
                DocumentStatus::Processing => d.is_stuck(stuck_after, now),
                DocumentStatus::Error => d.retry_count < max_retries,
                DocumentStatus::Completed => false,
            })
            .cloned()
            .collect();
        eligible.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        eligible.truncate(limit as usize);
        Ok(eligible)
    }

    async fn claim(&self, id: &str, stuck_after: Duration) -> anyhow::Result<bool> {
        let now = Utc::now();
        let mut docs = self.docs.lock().unwrap();
        let Some(doc) = docs.get_mut(id) else {
            return Ok(false);
        };
        if !Self::claimable(doc, stuck_after, now) {
            return Ok(false);
        }
        doc.status = DocumentStatus::Processing;
        doc.processing_started_at = Some(now);
        doc.error_message = None;
        Ok(true)
    }

    async fn mark_processing(&self, ids: &[String]) -> anyhow::Result<Vec<String>> {
        let now = Utc::now();
        let mut docs = self.docs.lock().unwrap();
        let mut accepted = Vec::new();
        for id in ids {
            if let Some(doc) = docs.get_mut(id) {
                if matches!(
                    doc.status,
                    DocumentStatus::Processing | DocumentStatus::Completed
                ) {
                    continue;
                }
                doc.status = DocumentStatus::Processing;
                doc.processing_started_at = Some(now);
                doc.error_message = None;
                accepted.push(id.clone());
            }
        }
        Ok(accepted)
    }

    async fn mark_completed(&self, id: &str, chunk_count: i32) -> anyhow::Result<()> {
        let mut docs = self.docs.lock().unwrap();
        if let Some(doc) = docs.get_mut(id) {
            doc.status = DocumentStatus::Completed;
            doc.chunk_count = chunk_count;
            doc.processing_completed_at = Some(Utc::now());
            doc.error_message = None;
        }
        Ok(())
    }

    async fn mark_error(&self, id: &str, message: &str) -> anyhow::Result<()> {
        let mut docs = self.docs.lock().unwrap();
        if let Some(doc) = docs.get_mut(id) {
            doc.status = DocumentStatus::Error;
            doc.retry_count += 1;
            doc.error_message = Some(message.to_string());
        }
        Ok(())
    }

    async fn reset_for_reprocess(&self, id: &str) -> anyhow::Result<()> {
        let mut docs = self.docs.lock().unwrap();
        if let Some(doc) = docs.get_mut(id) {
            doc.status = DocumentStatus::Uploaded;
            doc.error_message = None;
            doc.processing_started_at = None;
            doc.processing_completed_at = None;
        }
        Ok(())
    }

    async fn merge_processing_metadata(
        &self,
        id: &str,
        patch: &HashMap<String, serde_json::Value>,
    ) -> anyhow::Result<()> {
        let mut docs = self.docs.lock().unwrap();
        if let Some(doc) = docs.get_mut(id) {
            for (k, v) in patch {
                doc.processing_metadata.insert(k.clone(), v.clone());
            }
        }
        Ok(())
    }

    async fn status_counts(&self) -> anyhow::Result<HashMap<String, i64>> {
        let docs = self.docs.lock().unwrap();
        let mut counts = HashMap::new();
        for doc in docs.values() {
            *counts.entry(doc.status.as_str().to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn stuck_documents(&self, stuck_after: Duration) -> anyhow::Result<Vec<Document>> {
        let now = Utc::now();
        let docs = self.docs.lock().unwrap();
        let mut stuck: Vec<Document> = docs
            .values()
            .filter(|d| d.is_stuck(stuck_after, now))
            .cloned()
            .collect();
        stuck.sort_by(|a, b| a.processing_started_at.cmp(&b.processing_started_at));
        Ok(stuck)
    }

    async fn chatbot_owner(&self, chatbot_id: &str) -> anyhow::Result<Option<String>> {
        Ok(self.owners.lock().unwrap().get(chatbot_id).cloned())
    }

    async fn delete_document(&self, id: &str) -> anyhow::Result<bool> {
        Ok(self.docs.lock().unwrap().remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_claim_is_conditional() {
        let store = InMemoryDocumentStore::new();
        store.insert(test_document("d1", DocumentStatus::Uploaded, 0));
        let threshold = Duration::minutes(10);

        assert!(store.claim("d1", threshold).await.unwrap());
        // A second claim loses the race: the document is freshly processing.
        assert!(!store.claim("d1", threshold).await.unwrap());
        assert!(!store.claim("missing", threshold).await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_processing_can_be_reclaimed() {
        let store = InMemoryDocumentStore::new();
        let mut doc = test_document("d2", DocumentStatus::Processing, 0);
        doc.processing_started_at = Some(Utc::now() - Duration::minutes(20));
        store.insert(doc);

        assert!(store.claim("d2", Duration::minutes(10)).await.unwrap());
        let reclaimed = store.get("d2").unwrap();
        // processing_started_at was re-stamped to now.
        assert!(Utc::now() - reclaimed.processing_started_at.unwrap() < Duration::minutes(1));
    }

    #[tokio::test]
    async fn test_eligibility_excludes_exhausted_retries() {
        let store = InMemoryDocumentStore::new();
        let mut exhausted = test_document("d3", DocumentStatus::Error, 0);
        exhausted.retry_count = 3;
        store.insert(exhausted);
        let mut retryable = test_document("d4", DocumentStatus::Error, 10);
        retryable.retry_count = 2;
        store.insert(retryable);
        store.insert(test_document("d5", DocumentStatus::Completed, 20));

        let eligible = store
            .list_eligible(10, Duration::minutes(10), 3)
            .await
            .unwrap();
        let ids: Vec<&str> = eligible.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d4"]);
    }

    #[tokio::test]
    async fn test_eligibility_oldest_first_and_capped() {
        let store = InMemoryDocumentStore::new();
        store.insert(test_document("new", DocumentStatus::Uploaded, 100));
        store.insert(test_document("old", DocumentStatus::Uploaded, 0));
        store.insert(test_document("mid", DocumentStatus::Uploaded, 50));

        let eligible = store
            .list_eligible(2, Duration::minutes(10), 3)
            .await
            .unwrap();
        let ids: Vec<&str> = eligible.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["old", "mid"]);
    }

    #[tokio::test]
    async fn test_retry_count_only_increases() {
        let store = InMemoryDocumentStore::new();
        store.insert(test_document("d6", DocumentStatus::Uploaded, 0));

        store.mark_error("d6", "first failure").await.unwrap();
        assert_eq!(store.get("d6").unwrap().retry_count, 1);

        store.mark_error("d6", "second failure").await.unwrap();
        assert_eq!(store.get("d6").unwrap().retry_count, 2);

        // Completion and manual reset both leave the counter alone.
        store.mark_completed("d6", 3).await.unwrap();
        assert_eq!(store.get("d6").unwrap().retry_count, 2);
        store.reset_for_reprocess("d6").await.unwrap();
        assert_eq!(store.get("d6").unwrap().retry_count, 2);
    }

    #[tokio::test]
    async fn test_metadata_merge_preserves_existing_keys() {
        let store = InMemoryDocumentStore::new();
        let mut doc = test_document("d7", DocumentStatus::Uploaded, 0);
        doc.processing_metadata
            .insert("source".to_string(), serde_json::json!("upload"));
        store.insert(doc);

        let mut patch = HashMap::new();
        patch.insert("last_attempt_at".to_string(), serde_json::json!("2026-01-01"));
        store.merge_processing_metadata("d7", &patch).await.unwrap();

        let doc = store.get("d7").unwrap();
        assert_eq!(doc.processing_metadata.get("source").unwrap(), "upload");
        assert_eq!(
            doc.processing_metadata.get("last_attempt_at").unwrap(),
            "2026-01-01"
        );
    }

    #[tokio::test]
    async fn test_mark_processing_filters_active_and_completed() {
        let store = InMemoryDocumentStore::new();
        store.insert(test_document("a", DocumentStatus::Uploaded, 0));
        store.insert(test_document("b", DocumentStatus::Completed, 0));
        let mut processing = test_document("c", DocumentStatus::Processing, 0);
        processing.processing_started_at = Some(Utc::now());
        store.insert(processing);
        store.insert(test_document("d", DocumentStatus::Error, 0));

        let ids: Vec<String> = ["a", "b", "c", "d", "ghost"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut accepted = store.mark_processing(&ids).await.unwrap();
        accepted.sort();
        assert_eq!(accepted, vec!["a".to_string(), "d".to_string()]);
    }
}

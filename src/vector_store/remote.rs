use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::models::chunk::{VectorMatch, VectorRecord};
use crate::vector_store::utils::{extract_error_message, is_json_content_type};
use crate::vector_store::{IndexStatus, UpsertReport, VectorIndex};

/// One failed call against the remote index.
#[derive(Debug)]
struct CallError {
    /// HTTP status, when the request made it to the server.
    status: Option<u16>,
    message: String,
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// HTTP client for the remote vector index REST surface.
///
/// Tolerant by design: misconfigured gateways in front of the index return
/// HTML error pages, so every response is content-type checked before JSON
/// parsing and error bodies are reduced to a readable message.
pub struct RemoteVectorIndex {
    base_url: String,
    api_key: String,
    http_client: reqwest::Client,
    batch_size: usize,
    batch_delay: Duration,
}

impl RemoteVectorIndex {
    pub fn new(
        base_url: &str,
        api_key: &str,
        batch_size: usize,
        batch_delay_ms: u64,
        request_timeout_secs: u64,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(request_timeout_secs.max(1)))
                .build()
                .unwrap_or_default(),
            batch_size: batch_size.max(1),
            batch_delay: Duration::from_millis(batch_delay_ms),
        }
    }

    async fn read_response(&self, resp: reqwest::Response) -> Result<serde_json::Value, CallError> {
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(CallError {
                status: Some(status.as_u16()),
                message: extract_error_message(status.as_u16(), content_type.as_deref(), &body),
            });
        }
        if !is_json_content_type(content_type.as_deref()) {
            return Err(CallError {
                status: Some(status.as_u16()),
                message: format!(
                    "unexpected content type {}: {}",
                    content_type.as_deref().unwrap_or("unknown"),
                    extract_error_message(status.as_u16(), content_type.as_deref(), &body)
                ),
            });
        }
        serde_json::from_str(&body).map_err(|e| CallError {
            status: Some(status.as_u16()),
            message: format!("invalid JSON response: {e}"),
        })
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, CallError> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .http_client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| CallError {
                status: None,
                message: format!("transport error: {e}"),
            })?;
        self.read_response(resp).await
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value, CallError> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .http_client
            .get(&url)
            .header("Api-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| CallError {
                status: None,
                message: format!("transport error: {e}"),
            })?;
        self.read_response(resp).await
    }

    async fn upsert_call(&self, vectors: &[VectorRecord]) -> Result<(), CallError> {
        self.post_json("/vectors/upsert", &json!({ "vectors": vectors }))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl VectorIndex for RemoteVectorIndex {
    async fn upsert_vectors(&self, vectors: &[VectorRecord]) -> UpsertReport {
        let mut report = UpsertReport {
            attempted: vectors.len(),
            ..Default::default()
        };

        for (batch_index, batch) in vectors.chunks(self.batch_size).enumerate() {
            // Fixed pacing between batches so bursts of chunks don't
            // overwhelm the index.
            if batch_index > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }

            match self.upsert_call(batch).await {
                Ok(()) => {
                    debug!("upserted batch of {} vectors", batch.len());
                    report.stored += batch.len();
                }
                Err(e) => {
                    warn!(
                        "batch upsert of {} vectors failed ({e}); retrying one at a time",
                        batch.len()
                    );
                    for vector in batch {
                        match self.upsert_call(std::slice::from_ref(vector)).await {
                            Ok(()) => {
                                debug!("vector {} stored via fallback", vector.id);
                                report.stored += 1;
                            }
                            Err(e) => {
                                error!("vector {} failed: {e}", vector.id);
                                report.failed_ids.push(vector.id.clone());
                            }
                        }
                    }
                }
            }
        }

        if !report.complete() {
            warn!(
                "upsert stored {} of {} vectors ({} lost)",
                report.stored,
                report.attempted,
                report.failed_ids.len()
            );
        }
        report
    }

    async fn query_vectors(
        &self,
        query: &[f32],
        chatbot_id: &str,
        top_k: usize,
    ) -> Vec<VectorMatch> {
        let body = json!({
            "vector": query,
            "topK": top_k,
            "includeMetadata": true,
            "filter": { "chatbot_id": { "$eq": chatbot_id } },
        });

        match self.post_json("/query", &body).await {
            Ok(value) => value
                .get("matches")
                .and_then(|m| serde_json::from_value::<Vec<VectorMatch>>(m.clone()).ok())
                .unwrap_or_default(),
            Err(e) => {
                warn!("vector query failed for chatbot {chatbot_id}: {e}");
                vec![]
            }
        }
    }

    async fn delete_document_vectors(&self, document_id: &str) -> bool {
        let body = json!({
            "filter": { "document_id": { "$eq": document_id } },
        });

        match self.post_json("/vectors/delete", &body).await {
            Ok(_) => {
                info!("deleted vectors for document {document_id}");
                true
            }
            // Nothing indexed for this document is not a failure.
            Err(CallError {
                status: Some(404), ..
            }) => {
                info!("no vectors found for document {document_id}");
                true
            }
            Err(e) => {
                error!("vector delete failed for document {document_id}: {e}");
                false
            }
        }
    }

    async fn check_status(&self) -> IndexStatus {
        match self.get_json("/describe_index_stats").await {
            Ok(stats) => IndexStatus {
                connected: true,
                stats: Some(stats),
                error: None,
            },
            Err(e) => IndexStatus {
                connected: false,
                stats: None,
                error: Some(e.message),
            },
        }
    }
}

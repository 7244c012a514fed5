use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::document::Document;

// ──────────────────────────── Batch processing ────────────────────────────

/// Outcome of one document within a batch run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentOutcome {
    pub document_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub processing_time_ms: u64,
}

/// Summary returned by the scheduled/manual batch trigger.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRunSummary {
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<DocumentOutcome>,
}

// ──────────────────────────── Reprocess ────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReprocessResponse {
    pub document: Document,
    pub chunk_count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReprocessRequest {
    pub document_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchReprocessResponse {
    pub queued: usize,
}

// ──────────────────────────── Diagnostics ────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StuckDocumentInfo {
    pub document_id: String,
    pub file_name: String,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsResponse {
    pub status_counts: HashMap<String, i64>,
    pub stuck_documents: Vec<StuckDocumentInfo>,
    pub dispatch_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_depth: Option<i64>,
    pub recommendations: Vec<String>,
}

// ──────────────────────────── Retrieve ────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveRequest {
    pub chatbot_id: String,
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedChunk {
    pub id: String,
    pub document_id: Option<String>,
    pub text: Option<String>,
    pub score: f64,
}

#[derive(Debug, Serialize)]
pub struct RetrieveResponse {
    pub matches: Vec<RetrievedChunk>,
}

// ──────────────────────────── Documents ────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub success: bool,
    pub document_id: String,
    pub vectors_deleted: bool,
}

// ──────────────────────────── Auth ────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: String,
}

// ──────────────────────────── Health ────────────────────────────

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub environment: String,
}

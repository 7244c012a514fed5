use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle state of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploaded,
    Processing,
    Completed,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Error => "error",
        }
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(DocumentStatus::Uploaded),
            "processing" => Ok(DocumentStatus::Processing),
            "completed" => Ok(DocumentStatus::Completed),
            "error" => Ok(DocumentStatus::Error),
            other => anyhow::bail!("unknown document status: {other}"),
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One uploaded source file tracked through the ingestion state machine.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub chatbot_id: String,
    pub file_name: String,
    /// Extracted text, populated by the upload pipeline. Not serialized in
    /// API responses.
    #[serde(skip_serializing)]
    pub content: Option<String>,
    pub status: DocumentStatus,
    pub retry_count: i32,
    pub chunk_count: i32,
    pub error_message: Option<String>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_completed_at: Option<DateTime<Utc>>,
    pub processing_metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// A document is stuck when it has sat in `processing` longer than the
    /// threshold, presumably abandoned by a crashed worker.
    pub fn is_stuck(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
        self.status == DocumentStatus::Processing
            && self
                .processing_started_at
                .map(|started| now - started > threshold)
                .unwrap_or(true)
    }
}

use async_trait::async_trait;
use chrono::Duration;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tracing::info;

use super::DocumentStore;
use crate::models::document::{Document, DocumentStatus};

/// PostgreSQL-backed document record store.
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    pub async fn new(uri: &str, pool_size: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(std::time::Duration::from_secs(10))
            .connect(uri)
            .await?;

        info!("Connected to PostgreSQL (pool_size={pool_size})");
        Ok(Self { pool })
    }
}

const DOCUMENT_COLUMNS: &str = "id, chatbot_id, file_name, content, status, retry_count, \
     chunk_count, error_message, processing_started_at, processing_completed_at, \
     processing_metadata, created_at";

fn document_from_row(row: &PgRow) -> anyhow::Result<Document> {
    let status: String = row.get("status");
    let metadata: serde_json::Value = row.get("processing_metadata");
    Ok(Document {
        id: row.get("id"),
        chatbot_id: row.get("chatbot_id"),
        file_name: row.get("file_name"),
        content: row.get("content"),
        status: status.parse::<DocumentStatus>()?,
        retry_count: row.get("retry_count"),
        chunk_count: row.get("chunk_count"),
        error_message: row.get("error_message"),
        processing_started_at: row.get("processing_started_at"),
        processing_completed_at: row.get("processing_completed_at"),
        processing_metadata: serde_json::from_value(metadata).unwrap_or_default(),
        created_at: row.get("created_at"),
    })
}

fn seconds(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / 1000.0
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn initialize(&self) -> anyhow::Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                id VARCHAR(255) PRIMARY KEY,
                chatbot_id VARCHAR(255) NOT NULL,
                file_name VARCHAR(1024) NOT NULL,
                content TEXT,
                status VARCHAR(32) NOT NULL DEFAULT 'uploaded',
                retry_count INTEGER NOT NULL DEFAULT 0,
                chunk_count INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                processing_started_at TIMESTAMP WITH TIME ZONE,
                processing_completed_at TIMESTAMP WITH TIME ZONE,
                processing_metadata JSONB NOT NULL DEFAULT '{}',
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chatbots (
                id VARCHAR(255) PRIMARY KEY,
                user_id VARCHAR(255) NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_documents_chatbot_id ON documents(chatbot_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_documents_created_at ON documents(created_at)",
        )
        .execute(&self.pool)
        .await?;

        info!("Document store tables initialized");
        Ok(())
    }

    async fn get_document(&self, id: &str) -> anyhow::Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(document_from_row).transpose()
    }

    async fn list_eligible(
        &self,
        limit: i64,
        stuck_after: Duration,
        max_retries: i32,
    ) -> anyhow::Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents
             WHERE status = 'uploaded'
                OR (status = 'processing'
                    AND (processing_started_at IS NULL
                         OR processing_started_at < NOW() - make_interval(secs => $1)))
                OR (status = 'error' AND retry_count < $2)
             ORDER BY created_at ASC
             LIMIT $3"
        ))
        .bind(seconds(stuck_after))
        .bind(max_retries)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(document_from_row).collect()
    }

    async fn claim(&self, id: &str, stuck_after: Duration) -> anyhow::Result<bool> {
        // Conditional update: the claim only succeeds while the document is
        // still in a claimable state, so concurrent runs cannot both take it.
        let row = sqlx::query(
            "UPDATE documents
                SET status = 'processing',
                    processing_started_at = NOW(),
                    error_message = NULL,
                    updated_at = NOW()
              WHERE id = $1
                AND (status IN ('uploaded', 'error')
                     OR (status = 'processing'
                         AND (processing_started_at IS NULL
                              OR processing_started_at < NOW() - make_interval(secs => $2))))
              RETURNING id",
        )
        .bind(id)
        .bind(seconds(stuck_after))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn mark_processing(&self, ids: &[String]) -> anyhow::Result<Vec<String>> {
        let rows = sqlx::query(
            "UPDATE documents
                SET status = 'processing',
                    processing_started_at = NOW(),
                    error_message = NULL,
                    updated_at = NOW()
              WHERE id = ANY($1)
                AND status NOT IN ('processing', 'completed')
              RETURNING id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    async fn mark_completed(&self, id: &str, chunk_count: i32) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE documents
                SET status = 'completed',
                    chunk_count = $2,
                    processing_completed_at = NOW(),
                    error_message = NULL,
                    updated_at = NOW()
              WHERE id = $1",
        )
        .bind(id)
        .bind(chunk_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_error(&self, id: &str, message: &str) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE documents
                SET status = 'error',
                    retry_count = retry_count + 1,
                    error_message = $2,
                    updated_at = NOW()
              WHERE id = $1",
        )
        .bind(id)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset_for_reprocess(&self, id: &str) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE documents
                SET status = 'uploaded',
                    error_message = NULL,
                    processing_started_at = NULL,
                    processing_completed_at = NULL,
                    updated_at = NOW()
              WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn merge_processing_metadata(
        &self,
        id: &str,
        patch: &HashMap<String, serde_json::Value>,
    ) -> anyhow::Result<()> {
        let patch_json = serde_json::to_value(patch)?;
        // JSONB concatenation merges in place without clobbering existing keys.
        sqlx::query(
            "UPDATE documents
                SET processing_metadata = COALESCE(processing_metadata, '{}'::jsonb) || $2,
                    updated_at = NOW()
              WHERE id = $1",
        )
        .bind(id)
        .bind(&patch_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn status_counts(&self) -> anyhow::Result<HashMap<String, i64>> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM documents GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>("status"), r.get::<i64, _>("count")))
            .collect())
    }

    async fn stuck_documents(&self, stuck_after: Duration) -> anyhow::Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents
             WHERE status = 'processing'
               AND (processing_started_at IS NULL
                    OR processing_started_at < NOW() - make_interval(secs => $1))
             ORDER BY processing_started_at ASC NULLS FIRST"
        ))
        .bind(seconds(stuck_after))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(document_from_row).collect()
    }

    async fn chatbot_owner(&self, chatbot_id: &str) -> anyhow::Result<Option<String>> {
        let owner: Option<String> =
            sqlx::query_scalar("SELECT user_id FROM chatbots WHERE id = $1")
                .bind(chatbot_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(owner)
    }

    async fn delete_document(&self, id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

//! Single-document processing pipeline: chunk, embed, upsert, record outcome.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::chunker::Chunker;
use crate::db::DocumentStore;
use crate::embedding::EmbeddingModel;
use crate::error::ProcessError;
use crate::models::chunk::VectorRecord;
use crate::models::document::Document;
use crate::vector_store::VectorIndex;

pub struct DocumentProcessor {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn EmbeddingModel>,
    index: Arc<dyn VectorIndex>,
    chunker: Chunker,
}

impl DocumentProcessor {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn EmbeddingModel>,
        index: Arc<dyn VectorIndex>,
        chunker: Chunker,
    ) -> Self {
        Self {
            store,
            embedder,
            index,
            chunker,
        }
    }

    /// Run the full pipeline for one already-claimed document and write the
    /// terminal status back. Returns the stored chunk count on success.
    pub async fn process(&self, document: &Document) -> Result<usize, ProcessError> {
        match self.run_pipeline(document).await {
            Ok(chunk_count) => {
                self.store
                    .mark_completed(&document.id, chunk_count as i32)
                    .await
                    .map_err(|e| ProcessError::Store(e.to_string()))?;
                info!(
                    document_id = %document.id,
                    chunk_count,
                    "document processed"
                );
                Ok(chunk_count)
            }
            Err(err) => {
                error!(document_id = %document.id, error = %err, "document processing failed");
                if let Err(db_err) = self.store.mark_error(&document.id, &err.to_string()).await {
                    // The document stays `processing` and will be re-claimed
                    // once it passes the stuck threshold.
                    warn!(
                        document_id = %document.id,
                        error = %db_err,
                        "failed to record error status"
                    );
                }
                Err(err)
            }
        }
    }

    async fn run_pipeline(&self, document: &Document) -> Result<usize, ProcessError> {
        let content = document
            .content
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(ProcessError::EmptyContent)?;

        let chunks = self.chunker.split(content);
        if chunks.is_empty() {
            return Err(ProcessError::EmptyContent);
        }

        let embeddings = self
            .embedder
            .embed_for_ingestion(&chunks)
            .await
            .map_err(|e| ProcessError::Embedding(e.to_string()))?;
        if embeddings.len() != chunks.len() {
            return Err(ProcessError::Embedding(format!(
                "got {} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let vectors: Vec<VectorRecord> = chunks
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (text, values))| {
                VectorRecord::new(&document.id, &document.chatbot_id, i, text, values)
            })
            .collect();

        let report = self.index.upsert_vectors(&vectors).await;
        if !report.complete() {
            return Err(ProcessError::VectorShortfall {
                stored: report.stored,
                expected: report.attempted,
            });
        }

        Ok(vectors.len())
    }
}

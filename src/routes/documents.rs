use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::app::AppState;
use crate::auth::extract_user;
use crate::dispatch::DispatchMode;
use crate::models::api::{
    AuthContext, BatchReprocessRequest, BatchReprocessResponse, DeleteResponse, HealthResponse,
    ReprocessResponse,
};
use crate::models::document::{Document, DocumentStatus};

/// Document management routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/documents/{document_id}", get(get_document))
        .route("/documents/{document_id}", delete(delete_document))
        .route("/documents/{document_id}/reprocess", post(reprocess_document))
        .route("/documents/reprocess-batch", post(reprocess_batch))
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        environment: state.settings.environment.clone(),
    })
}

fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AuthContext, (StatusCode, String)> {
    extract_user(
        headers,
        &state.settings.jwt_secret_key,
        &state.settings.jwt_algorithm,
        state.settings.bypass_auth_mode,
        &state.settings.dev_user_id,
    )
}

fn internal(e: impl std::fmt::Display) -> (StatusCode, String) {
    error!("Database error: {e}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Database error: {e}"),
    )
}

/// Fetch a document and verify the caller owns its chatbot.
async fn load_owned_document(
    state: &AppState,
    auth: &AuthContext,
    document_id: &str,
) -> Result<Document, (StatusCode, String)> {
    let document = state
        .store
        .get_document(document_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Document not found".to_string()))?;

    let owner = state
        .store
        .chatbot_owner(&document.chatbot_id)
        .await
        .map_err(internal)?;
    if owner.as_deref() != Some(auth.user_id.as_str()) {
        return Err((
            StatusCode::FORBIDDEN,
            "Document belongs to another user".to_string(),
        ));
    }
    Ok(document)
}

/// GET /documents/:document_id - Document status and processing details.
async fn get_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
) -> Result<Json<Document>, (StatusCode, String)> {
    let auth = authenticate(&state, &headers)?;
    let document = load_owned_document(&state, &auth, &document_id).await?;
    Ok(Json(document))
}

/// DELETE /documents/:document_id - Remove the record and its vectors.
async fn delete_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
) -> Result<Json<DeleteResponse>, (StatusCode, String)> {
    let auth = authenticate(&state, &headers)?;
    load_owned_document(&state, &auth, &document_id).await?;

    let vectors_deleted = state.index.delete_document_vectors(&document_id).await;
    if !vectors_deleted {
        warn!(document_id, "vector cleanup failed, deleting record anyway");
    }
    let success = state
        .store
        .delete_document(&document_id)
        .await
        .map_err(internal)?;

    Ok(Json(DeleteResponse {
        success,
        document_id,
        vectors_deleted,
    }))
}

/// POST /documents/:document_id/reprocess - Synchronous single-document rerun.
async fn reprocess_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
) -> Result<Json<ReprocessResponse>, (StatusCode, String)> {
    let auth = authenticate(&state, &headers)?;
    let document = load_owned_document(&state, &auth, &document_id).await?;

    let count = state
        .limiter
        .increment(
            &format!("reprocess:{}", auth.user_id),
            std::time::Duration::from_secs(state.settings.limit_window_seconds),
        )
        .await;
    if count > state.settings.reprocess_per_window {
        return Err((
            StatusCode::TOO_MANY_REQUESTS,
            "Reprocess rate limit exceeded, try again later".to_string(),
        ));
    }

    // A document another worker is actively mid-flight on must not be
    // reset out from under it; only stuck `processing` may be retaken.
    if document.status == DocumentStatus::Processing
        && !document.is_stuck(state.settings.stuck_threshold(), chrono::Utc::now())
    {
        return Err((
            StatusCode::CONFLICT,
            "Document is already being processed".to_string(),
        ));
    }

    // Reset so even a completed document becomes claimable again.
    state
        .store
        .reset_for_reprocess(&document_id)
        .await
        .map_err(internal)?;
    let claimed = state
        .store
        .claim(&document_id, state.settings.stuck_threshold())
        .await
        .map_err(internal)?;
    if !claimed {
        return Err((
            StatusCode::CONFLICT,
            "Document is already being processed".to_string(),
        ));
    }

    info!(document_id, user_id = %auth.user_id, "manual reprocess");
    let chunk_count = match state.processor.process(&document).await {
        Ok(count) => count,
        Err(err) => {
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Reprocessing failed: {err}"),
            ));
        }
    };

    let document = state
        .store
        .get_document(&document_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Document not found".to_string()))?;

    Ok(Json(ReprocessResponse {
        document,
        chunk_count,
    }))
}

/// POST /documents/reprocess-batch - Queue many documents for reprocessing.
async fn reprocess_batch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<BatchReprocessRequest>,
) -> Result<Json<BatchReprocessResponse>, (StatusCode, String)> {
    let auth = authenticate(&state, &headers)?;
    if request.document_ids.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "documentIds must not be empty".to_string(),
        ));
    }

    // Silently drop ids the caller does not own, finished documents, and
    // anything in `processing`. Stuck documents are the reconciler's to
    // retake; accepting them here would race its conditional claim.
    let mut accepted = Vec::new();
    for document_id in &request.document_ids {
        let Ok(document) = load_owned_document(&state, &auth, document_id).await else {
            continue;
        };
        match document.status {
            DocumentStatus::Completed | DocumentStatus::Processing => continue,
            DocumentStatus::Uploaded | DocumentStatus::Error => {
                accepted.push(document_id.clone());
            }
        }
    }

    let queued = match state.dispatcher.mode() {
        DispatchMode::Queue => {
            // The worker claims on dequeue, so a duplicate or raced id is
            // dropped there rather than double-processed.
            let mut queued = 0;
            for document_id in &accepted {
                match state.dispatcher.document_eligible(document_id).await {
                    Ok(()) => queued += 1,
                    Err(err) => warn!(document_id, error = %err, "enqueue failed"),
                }
            }
            queued
        }
        DispatchMode::Scan => {
            let marked = state
                .store
                .mark_processing(&accepted)
                .await
                .map_err(internal)?;
            let queued = marked.len();
            let state = state.clone();
            tokio::spawn(async move {
                for document_id in marked {
                    let document = match state.store.get_document(&document_id).await {
                        Ok(Some(doc)) => doc,
                        Ok(None) => continue,
                        Err(err) => {
                            warn!(document_id, error = %err, "lookup failed during batch");
                            continue;
                        }
                    };
                    if let Err(err) = state.processor.process(&document).await {
                        warn!(document_id, error = %err, "batch reprocess failed");
                    }
                }
            });
            queued
        }
    };

    info!(
        requested = request.document_ids.len(),
        queued,
        mode = state.dispatcher.mode().as_str(),
        "batch reprocess accepted"
    );
    Ok(Json(BatchReprocessResponse { queued }))
}

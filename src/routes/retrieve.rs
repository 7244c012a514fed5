use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use std::sync::Arc;
use tracing::info;

use crate::app::AppState;
use crate::auth::extract_user;
use crate::models::api::{RetrieveRequest, RetrieveResponse, RetrievedChunk};

/// Retrieval routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/retrieve", post(retrieve))
}

/// POST /retrieve - Similarity search over one chatbot's chunks.
async fn retrieve(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RetrieveRequest>,
) -> Result<Json<RetrieveResponse>, (StatusCode, String)> {
    let auth = extract_user(
        &headers,
        &state.settings.jwt_secret_key,
        &state.settings.jwt_algorithm,
        state.settings.bypass_auth_mode,
        &state.settings.dev_user_id,
    )?;

    let owner = state
        .store
        .chatbot_owner(&request.chatbot_id)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {e}"),
            )
        })?;
    if owner.as_deref() != Some(auth.user_id.as_str()) {
        return Err((
            StatusCode::FORBIDDEN,
            "Chatbot belongs to another user".to_string(),
        ));
    }

    let query_vector = state
        .embedder
        .embed_for_query(&request.query)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Embedding error: {e}"),
            )
        })?;

    let matches = state
        .index
        .query_vectors(&query_vector, &request.chatbot_id, request.top_k)
        .await;

    info!(
        chatbot_id = %request.chatbot_id,
        matches = matches.len(),
        "retrieval query"
    );
    let matches = matches
        .into_iter()
        .map(|m| RetrievedChunk {
            document_id: m.document_id().map(str::to_string),
            text: m.text().map(str::to_string),
            id: m.id,
            score: m.score,
        })
        .collect();

    Ok(Json(RetrieveResponse { matches }))
}

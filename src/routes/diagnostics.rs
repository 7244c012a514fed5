use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use std::collections::HashMap;
use std::sync::Arc;

use crate::app::AppState;
use crate::auth::{extract_user, require_cron_secret};
use crate::models::api::{DiagnosticsResponse, StuckDocumentInfo};

/// Operational visibility routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/diagnostics/processing", get(processing_diagnostics))
}

/// GET /diagnostics/processing - Pipeline health snapshot. Accepts either the
/// cron secret or a user token, so both schedulers and operators can call it.
async fn processing_diagnostics(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<DiagnosticsResponse>, (StatusCode, String)> {
    if require_cron_secret(&headers, &state.settings.cron_secret).is_err() {
        extract_user(
            &headers,
            &state.settings.jwt_secret_key,
            &state.settings.jwt_algorithm,
            state.settings.bypass_auth_mode,
            &state.settings.dev_user_id,
        )?;
    }

    let status_counts = state.store.status_counts().await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Database error: {e}"),
        )
    })?;
    let stuck = state
        .store
        .stuck_documents(state.settings.stuck_threshold())
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {e}"),
            )
        })?;
    let queue_depth = state.dispatcher.queue_depth().await;

    let stuck_documents: Vec<StuckDocumentInfo> = stuck
        .into_iter()
        .map(|d| StuckDocumentInfo {
            document_id: d.id,
            file_name: d.file_name,
            processing_started_at: d.processing_started_at,
            retry_count: d.retry_count,
        })
        .collect();

    let recommendations =
        build_recommendations(&status_counts, stuck_documents.len(), queue_depth);

    Ok(Json(DiagnosticsResponse {
        status_counts,
        stuck_documents,
        dispatch_mode: state.dispatcher.mode().as_str().to_string(),
        queue_depth,
        recommendations,
    }))
}

/// Operator hints derived from the snapshot. Plain strings, ordered from
/// most to least urgent.
fn build_recommendations(
    status_counts: &HashMap<String, i64>,
    stuck_count: usize,
    queue_depth: Option<i64>,
) -> Vec<String> {
    let mut recs = Vec::new();
    if stuck_count > 0 {
        recs.push(format!(
            "{stuck_count} document(s) appear stuck in processing; they will be re-claimed on the next batch run"
        ));
    }
    if let Some(depth) = queue_depth {
        if depth > 100 {
            recs.push(format!(
                "queue depth is high ({depth}); consider raising worker throughput"
            ));
        }
    }
    let error_count = status_counts.get("error").copied().unwrap_or(0);
    if error_count > 0 {
        recs.push(format!(
            "{error_count} document(s) in error state; inspect errorMessage and reprocess if transient"
        ));
    }
    recs
}

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tracing::error;

use crate::app::AppState;
use crate::auth::require_cron_secret;
use crate::models::api::ProcessRunSummary;

/// Scheduled-trigger routes. GET and POST share a handler so both cron
/// runners and manual curls work.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/cron/process-documents",
        get(process_documents).post(process_documents),
    )
}

/// GET|POST /cron/process-documents - Run one reconciliation batch.
async fn process_documents(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ProcessRunSummary>, (StatusCode, String)> {
    require_cron_secret(&headers, &state.settings.cron_secret)?;

    let summary = state.reconciler.run().await.map_err(|e| {
        error!("Batch run failed: {e}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Batch run failed: {e}"),
        )
    })?;

    Ok(Json(summary))
}

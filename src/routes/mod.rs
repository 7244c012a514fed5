pub mod diagnostics;
pub mod documents;
pub mod process;
pub mod retrieve;

use axum::Router;
use std::sync::Arc;

use crate::app::AppState;

/// Build all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(process::routes())
        .merge(documents::routes())
        .merge(diagnostics::routes())
        .merge(retrieve::routes())
        .with_state(state)
}

use std::sync::Arc;

use crate::config::Settings;
use crate::db::DocumentStore;
use crate::dispatch::Dispatcher;
use crate::embedding::EmbeddingModel;
use crate::limiter::CounterStore;
use crate::processor::DocumentProcessor;
use crate::reconciler::BatchReconciler;
use crate::vector_store::VectorIndex;

/// Shared application state. Every seam is a trait object so routes can be
/// exercised against in-memory fakes.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn DocumentStore>,
    pub index: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn EmbeddingModel>,
    pub processor: Arc<DocumentProcessor>,
    pub reconciler: Arc<BatchReconciler>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub limiter: Arc<dyn CounterStore>,
}

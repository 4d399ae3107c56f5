pub mod ask;
pub mod health;
pub mod task;
pub mod visualization;

use std::sync::Arc;

use crate::services::estimator::EstimatorStrategy;
use crate::services::task_registry::TaskRegistry;

/// Shared application state, injected into every handler via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TaskRegistry>,
    pub estimator: Arc<dyn EstimatorStrategy>,
}

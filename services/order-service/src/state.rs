use orchestrator::OrderService;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<dyn OrderService>,
}

impl AppState {
    pub fn new(service: Arc<dyn OrderService>) -> Self {
        Self { service }
    }
}

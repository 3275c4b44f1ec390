use std::sync::Arc;

use crate::config::Config;
use crate::recommendation::orchestrator::Recommender;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Recommendation backend. The binary wires in the Gemini-backed engine;
    /// tests swap in a scripted one.
    pub recommender: Arc<dyn Recommender>,
    pub config: Config,
}

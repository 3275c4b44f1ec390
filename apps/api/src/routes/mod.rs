pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::recommendation::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Recommendation API
        .route(
            "/api/v1/recommendations",
            post(handlers::handle_recommend),
        )
        .route(
            "/api/v1/recommendations/keys",
            get(handlers::handle_key_status),
        )
        .route(
            "/api/v1/recommendations/keys/reset",
            post(handlers::handle_key_reset),
        )
        .with_state(state)
}

mod config;
mod errors;
mod llm_client;
mod models;
mod recommendation;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::llm_client::GeminiClient;
use crate::recommendation::orchestrator::RecommendationEngine;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing provider keys)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Influencer Match API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize the provider client and the key-rotating engine
    let gemini = GeminiClient::new()?;
    let mut engine = RecommendationEngine::new(
        config.gemini_api_keys.clone(),
        config.gemini_model.clone(),
        gemini,
    )?;
    if let Some(max_attempts) = config.max_attempts {
        engine = engine.with_max_attempts(max_attempts);
    }
    info!(
        "Recommendation engine initialized (model: {}, keys: {})",
        engine.model(),
        engine.rotator().pool_size()
    );

    // Build app state
    let state = AppState {
        recommender: Arc::new(engine),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict CORS to the marketplace frontend origin

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

//! Axum route handlers for the Recommendation API.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::models::campaign::{CampaignBrief, InfluencerProfile};
use crate::models::recommendation::RecommendationResult;
use crate::recommendation::key_rotator::KeyPoolStatus;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    pub campaign: CampaignBrief,
    #[serde(default)]
    pub influencers: Vec<InfluencerProfile>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendResponse {
    #[serde(flatten)]
    pub result: RecommendationResult,
    pub generated_at: DateTime<Utc>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/recommendations
///
/// Ranks the supplied influencers against the campaign brief.
pub async fn handle_recommend(
    State(state): State<AppState>,
    Json(request): Json<RecommendRequest>,
) -> Result<Json<RecommendResponse>, AppError> {
    validate_brief(&request.campaign)?;

    info!(
        "Recommendation request: niche={}, candidates={}",
        request.campaign.niche,
        request.influencers.len()
    );

    let result = state
        .recommender
        .recommend(&request.campaign, &request.influencers)
        .await?;

    Ok(Json(RecommendResponse {
        result,
        generated_at: Utc::now(),
    }))
}

/// GET /api/v1/recommendations/keys
///
/// Pool health only; key material is never returned.
pub async fn handle_key_status(State(state): State<AppState>) -> Json<KeyPoolStatus> {
    Json(state.recommender.key_status())
}

/// POST /api/v1/recommendations/keys/reset
///
/// Reactivates every key, including a single-key pool stuck after a rate limit.
pub async fn handle_key_reset(State(state): State<AppState>) -> Json<KeyPoolStatus> {
    state.recommender.reactivate_keys();
    Json(state.recommender.key_status())
}

fn validate_brief(brief: &CampaignBrief) -> Result<(), AppError> {
    if !brief.budget.is_finite() || brief.budget <= 0.0 {
        return Err(AppError::Validation(
            "budget must be a positive number".to_string(),
        ));
    }
    if brief.niche.trim().is_empty() {
        return Err(AppError::Validation("niche cannot be empty".to_string()));
    }
    if brief.campaign_type.trim().is_empty() {
        return Err(AppError::Validation(
            "campaignType cannot be empty".to_string(),
        ));
    }
    Ok(())
}

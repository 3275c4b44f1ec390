use serde::{Deserialize, Serialize};

/// One ranked influencer match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfluencerMatch {
    pub influencer_id: String,
    /// 0 – 100, clamped on the way in.
    pub match_score: u8,
    pub reasons: Vec<String>,
    pub content_strategy: String,
}

/// Output of one recommendation request. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub recommendations: Vec<InfluencerMatch>,
    pub summary: String,
}

impl RecommendationResult {
    pub fn empty(summary: impl Into<String>) -> Self {
        Self {
            recommendations: Vec::new(),
            summary: summary.into(),
        }
    }
}

/// Clamps a raw model score into `[0, 100]` and rounds to the nearest integer.
/// NaN maps to 0; infinities clamp like any other out-of-range value.
pub fn clamp_score(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.clamp(0.0, 100.0).round() as u8
}

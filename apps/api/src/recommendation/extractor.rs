//! Free-form JSON recovery for model output that is not clean JSON.
//!
//! The scan is a balanced-delimiter walk, not a tokenizer: it isolates the
//! first top-level `{ ... }` region (skipping braces inside quoted strings)
//! and leaves validation to `serde_json`. The isolated object is then
//! decoded into a [`RecommendationResult`], strictly first and with the
//! per-element drop policy if the strict decode fails.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::recommendation::{clamp_score, InfluencerMatch, RecommendationResult};

const REQUIRED_MATCH_FIELDS: [&str; 4] =
    ["influencerId", "matchScore", "reasons", "contentStrategy"];

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("No JSON object found in model output ({0} bytes scanned)")]
    NoJsonFound(usize),

    #[error("Extracted JSON is malformed: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("Invalid response shape: {0}")]
    InvalidResponseShape(String),
}

/// Returns the first balanced top-level JSON object in `text`, braces included.
pub fn extract_first_json_object(text: &str) -> Result<&str, ExtractionError> {
    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut start: Option<usize> = None;

    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }

        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => {
                if start.is_none() {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start {
                        return Ok(&text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }

    debug!(
        "No balanced JSON object in {} bytes (depth {} at end)",
        text.len(),
        depth
    );
    Err(ExtractionError::NoJsonFound(text.len()))
}

/// Extracts and parses the first JSON object in `text`.
pub fn parse_first_json_object(text: &str) -> Result<Value, ExtractionError> {
    let region = extract_first_json_object(text)?;
    Ok(serde_json::from_str(region)?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StrictMatch {
    influencer_id: String,
    match_score: f64,
    reasons: Vec<String>,
    content_strategy: String,
}

#[derive(Debug, Deserialize)]
struct StrictResponse {
    recommendations: Vec<StrictMatch>,
    summary: String,
}

/// Decodes a provider payload into a [`RecommendationResult`].
///
/// A strict decode is tried first. If the payload deviates, the top-level
/// shape (`recommendations` array, `summary` string) is still mandatory, but
/// individual matches missing a required field are dropped instead of
/// failing the batch. Scores are clamped to `[0, 100]` on both paths.
pub fn coerce_recommendations(value: Value) -> Result<RecommendationResult, ExtractionError> {
    if let Ok(strict) = StrictResponse::deserialize(&value) {
        return Ok(RecommendationResult {
            recommendations: strict
                .recommendations
                .into_iter()
                .map(|m| InfluencerMatch {
                    influencer_id: m.influencer_id,
                    match_score: clamp_score(m.match_score),
                    reasons: m.reasons,
                    content_strategy: m.content_strategy,
                })
                .collect(),
            summary: strict.summary,
        });
    }

    let items = value
        .get("recommendations")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ExtractionError::InvalidResponseShape("missing `recommendations` array".to_string())
        })?;
    let summary = value
        .get("summary")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ExtractionError::InvalidResponseShape("missing `summary` string".to_string())
        })?
        .to_string();

    let recommendations: Vec<InfluencerMatch> = items.iter().filter_map(coerce_match).collect();

    if recommendations.len() < items.len() {
        warn!(
            "Dropped {} of {} malformed recommendation(s)",
            items.len() - recommendations.len(),
            items.len()
        );
    }

    Ok(RecommendationResult {
        recommendations,
        summary,
    })
}

fn coerce_match(item: &Value) -> Option<InfluencerMatch> {
    let obj = item.as_object()?;
    if let Some(missing) = REQUIRED_MATCH_FIELDS
        .iter()
        .find(|field| obj.get(**field).map_or(true, Value::is_null))
    {
        debug!("Dropping recommendation missing `{missing}`");
        return None;
    }

    let influencer_id = match &obj["influencerId"] {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    let match_score = match &obj["matchScore"] {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    let reasons = match &obj["reasons"] {
        Value::Array(list) => list
            .iter()
            .map(|r| match r {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    };

    let content_strategy = match &obj["contentStrategy"] {
        Value::String(s) => s.clone(),
        _ => return None,
    };

    Some(InfluencerMatch {
        influencer_id,
        match_score: clamp_score(match_score),
        reasons,
        content_strategy,
    })
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::llm_client::LlmError;
use crate::recommendation::error::RecommendError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Upstream parse error: {0}")]
    UpstreamParse(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<RecommendError> for AppError {
    fn from(err: RecommendError) -> Self {
        match err {
            RecommendError::RateLimitExhausted { .. } => AppError::RateLimited(err.to_string()),
            RecommendError::AllKeysExhausted => AppError::Unavailable(err.to_string()),
            RecommendError::Extraction(e) => AppError::UpstreamParse(e.to_string()),
            RecommendError::Provider(LlmError::Extraction(e)) => {
                AppError::UpstreamParse(e.to_string())
            }
            RecommendError::Provider(e) => AppError::Llm(e.to_string()),
            RecommendError::GenerationFailed(msg) => AppError::Llm(msg),
            RecommendError::Configuration(msg) => {
                AppError::Internal(anyhow::anyhow!("configuration error: {msg}"))
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::RateLimited(msg) => {
                tracing::warn!("Rate limited: {msg}");
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "RATE_LIMITED",
                    "The AI service is busy right now, please try again later".to_string(),
                )
            }
            AppError::Unavailable(msg) => {
                tracing::error!("Service unavailable: {msg}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "The AI service is temporarily unavailable".to_string(),
                )
            }
            AppError::UpstreamParse(msg) => {
                tracing::error!("Upstream parse error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_PARSE_ERROR",
                    "Could not parse provider response".to_string(),
                )
            }
            AppError::Llm(msg) => {
                tracing::error!("LLM error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "LLM_ERROR",
                    "An AI processing error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

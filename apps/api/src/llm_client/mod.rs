//! LLM Client: the single point of entry for all generation-provider calls.
//!
//! ARCHITECTURAL RULE: No other module may call the provider API directly.
//! The recommendation core only sees the [`StructuredGenerator`] trait; the
//! Gemini REST implementation below is what the binary wires in.
//!
//! This client never retries HTTP 429 itself. A rate-limited key is reported
//! back to the caller so the key rotator can move to the next credential.
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::recommendation::extractor::{parse_first_json_object, ExtractionError};

pub mod prompts;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
/// Default model when `GEMINI_MODEL` is not set.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const MAX_OUTPUT_TOKENS: u32 = 4096;
const TEMPERATURE: f32 = 0.7;
/// Attempts per key for transient (5xx / transport) failures.
const MAX_TRANSIENT_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("Could not parse provider response: {0}")]
    Extraction(#[from] ExtractionError),
}

impl LlmError {
    /// HTTP status carried by the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::Api { status, .. } => Some(*status),
            LlmError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// How a failed generation attempt should be handled by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The key is throttled: rotate to another credential.
    RateLimited,
    /// Anything else: fatal, no retry under any key.
    Other,
}

/// The one place that decides whether a provider failure is a rate limit.
pub fn classify_failure(err: &LlmError) -> FailureClass {
    if err.status() == Some(429) {
        return FailureClass::RateLimited;
    }
    let message = err.to_string().to_lowercase();
    if message.contains("rate limit") || message.contains("too many requests") {
        FailureClass::RateLimited
    } else {
        FailureClass::Other
    }
}

/// Injected generation capability.
///
/// `build_handle` binds a credential and model into a provider handle;
/// `generate_structured` performs exactly one generation attempt with that
/// handle and returns a JSON payload conforming (loosely) to `output_shape`.
#[async_trait]
pub trait StructuredGenerator: Send + Sync {
    type Handle: Send + Sync;

    fn build_handle(&self, credential: &str, model: &str) -> Self::Handle;

    async fn generate_structured(
        &self,
        handle: &Self::Handle,
        system_prompt: &str,
        user_prompt: &str,
        output_shape: &Value,
    ) -> Result<Value, LlmError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Gemini wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    system_instruction: GeminiContent<'a>,
    contents: Vec<GeminiContent<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'a str,
    response_schema: &'a Value,
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
pub struct ResponsePart {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
}

impl GeminiResponse {
    /// Concatenated text of the first candidate.
    pub fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

/// A credential bound to a model. Cheap to build per attempt.
#[derive(Debug, Clone)]
pub struct GeminiHandle {
    api_key: String,
    model: String,
}

/// Gemini `generateContent` client with JSON response mode.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
}

impl GeminiClient {
    pub fn new() -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()?,
        })
    }

    /// One POST, retried only on 5xx and transport errors with exponential
    /// backoff. 429 and other 4xx are returned immediately.
    async fn call(
        &self,
        handle: &GeminiHandle,
        body: &GeminiRequest<'_>,
    ) -> Result<GeminiResponse, LlmError> {
        let url = format!("{}/{}:generateContent", GEMINI_API_BASE, handle.model);
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_TRANSIENT_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "Gemini call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(&url)
                .header("x-goog-api-key", &handle.api_key)
                .json(body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.is_server_error() {
                let error_body = response.text().await.unwrap_or_default();
                warn!("Gemini API returned {}: {}", status, error_body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: error_body,
                });
                continue;
            }

            if !status.is_success() {
                let error_body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<GeminiError>(&error_body)
                    .map(|e| e.error.message)
                    .unwrap_or(error_body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let gemini_response: GeminiResponse = response.json().await?;

            if let Some(usage) = &gemini_response.usage_metadata {
                debug!(
                    "Gemini call succeeded: prompt_tokens={}, output_tokens={}",
                    usage.prompt_token_count, usage.candidates_token_count
                );
            }

            return Ok(gemini_response);
        }

        Err(last_error.unwrap_or(LlmError::EmptyContent))
    }
}

#[async_trait]
impl StructuredGenerator for GeminiClient {
    type Handle = GeminiHandle;

    fn build_handle(&self, credential: &str, model: &str) -> GeminiHandle {
        GeminiHandle {
            api_key: credential.to_string(),
            model: model.to_string(),
        }
    }

    async fn generate_structured(
        &self,
        handle: &GeminiHandle,
        system_prompt: &str,
        user_prompt: &str,
        output_shape: &Value,
    ) -> Result<Value, LlmError> {
        let body = GeminiRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: system_prompt,
                }],
            },
            contents: vec![GeminiContent {
                role: Some("user"),
                parts: vec![GeminiPart { text: user_prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: output_shape,
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };

        let response = self.call(handle, &body).await?;
        let text = response.text().ok_or(LlmError::EmptyContent)?;
        parse_model_json(&text)
    }
}

/// Parses model text as JSON: clean output first, then the free-form
/// extractor for text that wraps the object in prose.
pub fn parse_model_json(text: &str) -> Result<Value, LlmError> {
    match serde_json::from_str(strip_json_fences(text)) {
        Ok(value) => Ok(value),
        Err(e) => {
            debug!("Direct JSON parse failed ({e}), falling back to extraction");
            Ok(parse_first_json_object(text)?)
        }
    }
}

/// Removes a surrounding markdown code fence, with or without a `json` tag.
fn strip_json_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = body.strip_prefix("json").unwrap_or(body).trim_start();
    body.strip_suffix("```").unwrap_or(body).trim()
}

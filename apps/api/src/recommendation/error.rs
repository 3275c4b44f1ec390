use thiserror::Error;

use crate::llm_client::LlmError;
use crate::recommendation::extractor::ExtractionError;

/// Terminal failures of the recommendation core.
///
/// Rate-limited attempts that were recovered by rotating keys never surface
/// here; only the outcome of the whole call does.
#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("All API keys are exhausted")]
    AllKeysExhausted,

    #[error("Rate limit exhausted after {attempts} attempt(s), try again later")]
    RateLimitExhausted { attempts: usize },

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Non-rate-limit provider failure, passed through untouched.
    #[error(transparent)]
    Provider(#[from] LlmError),
}

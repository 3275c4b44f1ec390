use anyhow::{bail, Context, Result};

use crate::llm_client::DEFAULT_MODEL;

/// Application configuration loaded from environment variables.
/// Fails at startup if no provider key is configured.
#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_keys: Vec<String>,
    pub gemini_model: String,
    /// Retry budget override; `None` means one attempt per pooled key.
    pub max_attempts: Option<usize>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let raw_keys = std::env::var("GEMINI_API_KEYS")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .context(
                "Required environment variable 'GEMINI_API_KEYS' (or 'GEMINI_API_KEY') is not set",
            )?;
        let gemini_api_keys = parse_key_list(&raw_keys);

        let max_attempts = match std::env::var("RECOMMENDATION_MAX_ATTEMPTS") {
            Ok(v) => Some(parse_max_attempts(&v)?),
            Err(_) => None,
        };

        Ok(Config {
            gemini_api_keys,
            gemini_model: std::env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            max_attempts,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// Splits a comma-separated key list. Entries are passed through as-is;
/// `KeyRotator::new` owns trimming, blank removal and deduplication.
pub fn parse_key_list(raw: &str) -> Vec<String> {
    raw.split(',').map(str::to_string).collect()
}

fn parse_max_attempts(raw: &str) -> Result<usize> {
    let attempts = raw
        .trim()
        .parse::<usize>()
        .context("RECOMMENDATION_MAX_ATTEMPTS must be a positive integer")?;
    if attempts == 0 {
        bail!("RECOMMENDATION_MAX_ATTEMPTS must be at least 1");
    }
    Ok(attempts)
}

use std::collections::HashMap;
use thiserror::Error;

/// History pages are served in fixed pages of 20; the size is part of the
/// indexer wire contract, not configuration.
pub const PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone)]
pub struct Config {
    pub indexer_api_url: String,
    pub request_timeout_ms: u64,
    pub retry_max_elapsed_ms: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let indexer_api_url = env_map
            .get("INDEXER_API_URL")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("INDEXER_API_URL".to_string()))?;

        let request_timeout_ms = env_map
            .get("REQUEST_TIMEOUT_MS")
            .map(|s| s.as_str())
            .unwrap_or("10000")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "REQUEST_TIMEOUT_MS".to_string(),
                    "must be a valid u64".to_string(),
                )
            })?;

        let retry_max_elapsed_ms = env_map
            .get("RETRY_MAX_ELAPSED_MS")
            .map(|s| s.as_str())
            .unwrap_or("30000")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "RETRY_MAX_ELAPSED_MS".to_string(),
                    "must be a valid u64".to_string(),
                )
            })?;

        Ok(Config {
            indexer_api_url,
            request_timeout_ms,
            retry_max_elapsed_ms,
        })
    }
}

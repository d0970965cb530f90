//! Pipeline configuration, loaded once from TOML and passed down explicitly.
//!
//! Every section and field is optional; an empty file yields the defaults.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use hedgeflow_core::data::{CachePolicy, CircuitBreaker, RetryPolicy};
use hedgeflow_core::signals::{SentimentWeights, WeightError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid sentiment weights: {0}")]
    Weights(#[from] WeightError),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Entries older than this are refetched. Absent: never expire.
    pub ttl_days: Option<u64>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self { ttl_days: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_jitter_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_jitter_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    pub timeout_secs: u64,
    pub breaker_cooldown_secs: u64,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            breaker_cooldown_secs: 30 * 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub model: String,
    /// Environment variable holding the API key. Unset variable: no chat model.
    pub api_key_env: String,
    pub base_url: String,
    pub max_retries: u32,
    pub initial_delay_ms: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: "google/gemini-2.0-flash-001".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            max_retries: 3,
            initial_delay_ms: 1000,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub cache_dir: PathBuf,
    /// Directory of saved news files (`{SUBJECT}_news.json`). Absent: news
    /// sentiment is neutral.
    pub news_dir: Option<PathBuf>,
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    pub cache: CacheSection,
    pub retry: RetrySection,
    pub sentiment_weights: SentimentWeights,
    pub provider: ProviderSection,
    pub llm: LlmSection,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("cache"),
            news_dir: None,
            log_filter: "info".to_string(),
            cache: CacheSection::default(),
            retry: RetrySection::default(),
            sentiment_weights: SentimentWeights::default(),
            provider: ProviderSection::default(),
            llm: LlmSection::default(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sentiment_weights.validate()?;
        if self.provider.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "provider.timeout_secs",
                reason: "must be positive".into(),
            });
        }
        if self.cache.ttl_days == Some(0) {
            return Err(ConfigError::Invalid {
                field: "cache.ttl_days",
                reason: "must be positive; omit it to disable expiry".into(),
            });
        }
        if self.cache_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "cache_dir",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_retries,
            Duration::from_millis(self.retry.base_delay_ms),
            Duration::from_millis(self.retry.max_jitter_ms),
        )
    }

    pub fn cache_policy(&self) -> CachePolicy {
        match self.cache.ttl_days {
            Some(days) => CachePolicy::with_ttl(Duration::from_secs(days * 24 * 60 * 60)),
            None => CachePolicy::never_expire(),
        }
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.timeout_secs)
    }

    pub fn circuit_breaker(&self) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(Duration::from_secs(
            self.provider.breaker_cooldown_secs,
        )))
    }
}

//! Pipeline configuration
//!
//! Every section has defaults, so a settings file only needs the keys it
//! overrides:
//!
//! ```toml
//! [extractor]
//! enable_llm = true
//! min_confidence = 0.6
//!
//! [llm]
//! provider = "ollama"
//! model = "llama3.2"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ExtractError, Result};

/// Environment variable consulted when the settings leave `api_key` unset
pub const API_KEY_ENV: &str = "TRACKING_LLM_API_KEY";

/// Per-run extraction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Allow the inference fallback
    pub enable_llm: bool,

    /// Results below this are dropped
    pub min_confidence: f64,

    /// Candidate cap per email
    pub max_candidates: usize,

    /// Cross-check inference results against carrier formats
    pub use_hybrid_validation: bool,

    /// Log stage summaries at info level
    pub debug_mode: bool,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            enable_llm: false,
            min_confidence: 0.5,
            max_candidates: 10,
            use_hybrid_validation: true,
            debug_mode: false,
        }
    }
}

/// Inference service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// `ollama`/`local`, `openai`/`cloud`, or anything else for disabled
    pub provider: String,
    pub model: String,
    /// Base URL of the service
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f64,
    pub max_tokens: u32,
    pub enabled: bool,
}

impl LlmConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: "llama3.2".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            api_key: None,
            timeout_secs: 30,
            temperature: 0.1,
            max_tokens: 1000,
            enabled: false,
        }
    }
}

/// Rate limiter settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_secs: u64,
    pub min_interval_ms: u64,
}

impl RateLimitConfig {
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_secs: 60,
            min_interval_ms: 1000,
        }
    }
}

/// All settings, as loaded from a TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub extractor: ExtractorConfig,
    pub llm: LlmConfig,
    pub rate_limit: RateLimitConfig,
}

impl Settings {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let settings: Self = toml::from_str(s).map_err(|e| ExtractError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read and validate a settings file, filling the API key from the environment
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let mut settings = Self::from_toml_str(&raw)?;
        settings.apply_env();
        Ok(settings)
    }

    /// Fill unset values from the environment
    pub fn apply_env(&mut self) {
        if self.llm.api_key.is_none()
            && let Ok(key) = std::env::var(API_KEY_ENV)
            && !key.trim().is_empty()
        {
            self.llm.api_key = Some(key.trim().to_string());
        }
    }

    pub fn validate(&self) -> Result<()> {
        let extractor = &self.extractor;
        if !(0.0..=1.0).contains(&extractor.min_confidence) {
            return Err(ExtractError::Config(format!(
                "min_confidence must be within [0, 1], got {}",
                extractor.min_confidence
            )));
        }
        if extractor.max_candidates == 0 {
            return Err(ExtractError::Config(
                "max_candidates must be at least 1".into(),
            ));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(ExtractError::Config(
                "rate_limit.max_requests must be at least 1".into(),
            ));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(ExtractError::Config(
                "rate_limit.window_secs must be at least 1".into(),
            ));
        }
        if self.llm.timeout_secs == 0 {
            return Err(ExtractError::Config("llm.timeout_secs must be at least 1".into()));
        }
        Ok(())
    }
}

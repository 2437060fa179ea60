//! Runtime configuration.
//!
//! Loaded from YAML or JSON. Durations are human-readable strings
//! (`"30s"`, `"2m"`, `"1h 30m"`).
//!
//! ```yaml
//! engine:
//!   per_lender_timeout: 30s
//!   match_threshold: 0.6
//!   max_concurrency: 8
//!   global_deadline: 2m
//!   fallback: deterministic
//! llm:
//!   model: gemini-2.5-flash
//!   retry_attempts: 3
//! cache:
//!   max_entries: 5000
//!   ttl: 1h
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use lendmatch_core::ValidationError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::providers::CompletionConfig;

/// Errors from loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    Invalid(#[from] ValidationError),
}

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| humantime::parse_duration(&raw).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

/// What to do when the reasoning service fails for a lender.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Record the lender as failed
    #[default]
    Fail,

    /// Judge the lender with the comparator instead
    Deterministic,
}

/// Settings for one evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on one lender's evaluation
    #[serde(with = "duration_str")]
    pub per_lender_timeout: Duration,

    /// Minimum confidence for a match (0.0 - 1.0)
    pub match_threshold: f64,

    /// Lender evaluations in flight at once, unbounded when `None`
    pub max_concurrency: Option<usize>,

    /// Run the comparator pre-check before calling the reasoning service
    pub enable_prefilter: bool,

    /// Wall-clock bound on the whole run
    #[serde(with = "duration_str::option", skip_serializing_if = "Option::is_none")]
    pub global_deadline: Option<Duration>,

    pub fallback: FallbackStrategy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            per_lender_timeout: Duration::from_secs(30),
            match_threshold: 0.6,
            max_concurrency: None,
            enable_prefilter: true,
            global_deadline: None,
            fallback: FallbackStrategy::Fail,
        }
    }
}

impl EngineConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.per_lender_timeout = timeout;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.match_threshold = threshold;
        self
    }

    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    pub fn with_global_deadline(mut self, deadline: Duration) -> Self {
        self.global_deadline = Some(deadline);
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackStrategy) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn without_prefilter(mut self) -> Self {
        self.enable_prefilter = false;
        self
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(ValidationError::InvalidConfig(format!(
                "match_threshold must be within [0, 1], got {}",
                self.match_threshold
            )));
        }
        if self.per_lender_timeout.is_zero() {
            return Err(ValidationError::InvalidConfig(
                "per_lender_timeout must be positive".to_string(),
            ));
        }
        if self.global_deadline.is_some_and(|d| d.is_zero()) {
            return Err(ValidationError::InvalidConfig(
                "global_deadline must be positive".to_string(),
            ));
        }
        if self.max_concurrency == Some(0) {
            return Err(ValidationError::InvalidConfig(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Model and transport settings for the LLM reasoning service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,

    /// HTTP timeout for one provider call
    #[serde(with = "duration_str")]
    pub request_timeout: Duration,

    /// Attempts after the first call, transient errors only
    pub retry_attempts: usize,

    /// First backoff delay, doubled on each retry
    #[serde(with = "duration_str")]
    pub retry_base_delay: Duration,
}

impl Default for LlmSettings {
    fn default() -> Self {
        let completion = CompletionConfig::default();
        Self {
            model: completion.model,
            max_tokens: completion.max_tokens,
            temperature: completion.temperature,
            top_p: completion.top_p,
            top_k: completion.top_k,
            request_timeout: completion.timeout,
            retry_attempts: 2,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

impl LlmSettings {
    pub fn completion_config(&self) -> CompletionConfig {
        CompletionConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            json_output: true,
            timeout: self.request_timeout,
        }
    }
}

/// Assessment cache sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub max_entries: u64,

    #[serde(with = "duration_str")]
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Complete runtime configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub engine: EngineConfig,
    pub llm: LlmSettings,
    pub cache: CacheSettings,
}

impl RuntimeConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.engine.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_json::from_str(json)?;
        config.engine.validate()?;
        Ok(config)
    }

    /// Load from a file, choosing the format by extension (`.json` or YAML).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.per_lender_timeout, Duration::from_secs(30));
        assert_eq!(config.match_threshold, 0.6);
        assert_eq!(config.max_concurrency, None);
        assert!(config.enable_prefilter);
        assert_eq!(config.fallback, FallbackStrategy::Fail);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_with_human_durations() {
        let config = RuntimeConfig::from_yaml(
            r#"
engine:
  per_lender_timeout: 45s
  match_threshold: 0.7
  max_concurrency: 4
  global_deadline: 2m
  fallback: deterministic
llm:
  retry_base_delay: 250ms
cache:
  ttl: 10m
"#,
        )
        .unwrap();

        assert_eq!(config.engine.per_lender_timeout, Duration::from_secs(45));
        assert_eq!(config.engine.global_deadline, Some(Duration::from_secs(120)));
        assert_eq!(config.engine.max_concurrency, Some(4));
        assert_eq!(config.engine.fallback, FallbackStrategy::Deterministic);
        assert_eq!(config.llm.retry_base_delay, Duration::from_millis(250));
        assert_eq!(config.llm.model, "gemini-2.5-flash");
        assert_eq!(config.cache.ttl, Duration::from_secs(600));
    }

    #[test]
    fn test_json_config() {
        let config =
            RuntimeConfig::from_json(r#"{"engine": {"enable_prefilter": false}}"#).unwrap();
        assert!(!config.engine.enable_prefilter);
        assert_eq!(config.engine.per_lender_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(EngineConfig::default().with_threshold(1.2).validate().is_err());
        assert!(EngineConfig::default().with_max_concurrency(0).validate().is_err());
        assert!(EngineConfig::default().with_timeout(Duration::ZERO).validate().is_err());

        let result = RuntimeConfig::from_yaml("engine:\n  match_threshold: -0.1\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bad_duration() {
        let result = RuntimeConfig::from_yaml("engine:\n  per_lender_timeout: soon\n");
        assert!(matches!(result, Err(ConfigError::YamlError(_))));
    }

    #[test]
    fn test_engine_config_roundtrips_through_yaml() {
        let config = EngineConfig::default().with_global_deadline(Duration::from_secs(90));
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("per_lender_timeout: 30s"));

        let parsed: EngineConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }
}

//! Immutable run configuration, loaded once at startup.
//!
//! Every component receives the slice of [`Settings`] it needs explicitly;
//! nothing in the crate reads ambient or global state.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::types::PipelineError;

/// Provider-side content-safety policy attached to every model request.
#[derive(Clone, Debug, Deserialize)]
pub struct GuardrailSettings {
    pub identifier: String,
    pub version: String,
    #[serde(default)]
    pub trace: bool,
}

/// Hosted model endpoint configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct ModelSettings {
    pub model_id: String,
    /// Hard ceiling for assembled prompt tokens.
    pub max_tokens: usize,
    /// Tokens held back from the prompt budget for the expected response.
    #[serde(default = "defaults::response_reserve_tokens")]
    pub response_reserve_tokens: usize,
    /// Base URL of the converse-style endpoint.
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,
    pub guardrail: GuardrailSettings,
}

impl ModelSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Embedding endpoint configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingSettings {
    /// Base URL of an embeddings endpoint (`{endpoint}/embeddings`).
    pub endpoint: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "defaults::request_timeout_secs")]
    pub timeout_secs: u64,
}

impl EmbeddingSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Vector store configuration.
///
/// The store is an embedded database; `database` is its file path and each
/// research target gets its own collection (table). Reusing a collection
/// across runs is an explicit caller decision: point at the same database and
/// collection name with a matching schema.
#[derive(Clone, Debug, Deserialize)]
pub struct StoreSettings {
    pub database: String,
    pub collection: String,
    pub dimension: usize,
    #[serde(default = "defaults::max_text_length")]
    pub max_text_length: usize,
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,
    /// Upper bound any search request is clamped to.
    #[serde(default = "defaults::top_k")]
    pub top_k: usize,
}

/// Source fetching configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct FetchSettings {
    #[serde(default = "defaults::fetch_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum number of URLs fetched concurrently.
    #[serde(default = "defaults::fetch_concurrency")]
    pub concurrency: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: defaults::fetch_timeout_secs(),
            concurrency: defaults::fetch_concurrency(),
        }
    }
}

impl FetchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retry policy knobs for transient failures.
#[derive(Clone, Debug, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "defaults::base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "defaults::multiplier")]
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_delay_ms: defaults::base_delay_ms(),
            multiplier: defaults::multiplier(),
        }
    }
}

/// Top-level immutable configuration for one run.
#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    pub model: ModelSettings,
    pub embedding: EmbeddingSettings,
    pub store: StoreSettings,
    #[serde(default)]
    pub fetch: FetchSettings,
    #[serde(default)]
    pub retry: RetrySettings,
}

impl Settings {
    /// Loads settings from a YAML file and validates cross-field invariants.
    pub async fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_yaml(&raw)
    }

    /// Parses settings from a YAML string.
    pub fn from_yaml(raw: &str) -> Result<Self, PipelineError> {
        let settings: Settings =
            serde_yaml::from_str(raw).map_err(|err| PipelineError::Config(err.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), PipelineError> {
        if self.store.dimension == 0 {
            return Err(PipelineError::Config(
                "store.dimension must be positive".into(),
            ));
        }
        if self.store.max_text_length == 0 {
            return Err(PipelineError::Config(
                "store.max_text_length must be positive".into(),
            ));
        }
        if self.store.batch_size == 0 {
            return Err(PipelineError::Config(
                "store.batch_size must be positive".into(),
            ));
        }
        if self.model.max_tokens <= self.model.response_reserve_tokens {
            return Err(PipelineError::Config(
                "model.max_tokens must exceed model.response_reserve_tokens".into(),
            ));
        }
        Ok(())
    }
}

mod defaults {
    pub fn response_reserve_tokens() -> usize {
        1024
    }
    pub fn request_timeout_secs() -> u64 {
        60
    }
    pub fn max_text_length() -> usize {
        4000
    }
    pub fn batch_size() -> usize {
        64
    }
    pub fn top_k() -> usize {
        10
    }
    pub fn fetch_timeout_secs() -> u64 {
        10
    }
    pub fn fetch_concurrency() -> usize {
        4
    }
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn base_delay_ms() -> u64 {
        500
    }
    pub fn multiplier() -> f64 {
        2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
model:
  model_id: anthropic.claude-3-sonnet
  max_tokens: 8000
  endpoint: https://bedrock.example.com
  guardrail:
    identifier: gr-abc123
    version: "1"
    trace: true
embedding:
  endpoint: https://embed.example.com/v1
  model: all-minilm-l6-v2
store:
  database: ./chunks.sqlite
  collection: acme_corp
  dimension: 384
  max_text_length: 2000
  batch_size: 32
  top_k: 8
"#;

    #[test]
    fn parses_sample_yaml() {
        let settings = Settings::from_yaml(SAMPLE).unwrap();
        assert_eq!(settings.model.model_id, "anthropic.claude-3-sonnet");
        assert_eq!(settings.store.dimension, 384);
        assert_eq!(settings.store.top_k, 8);
        assert!(settings.model.guardrail.trace);
        // Defaults fill in the omitted sections.
        assert_eq!(settings.fetch.concurrency, 4);
        assert_eq!(settings.retry.max_attempts, 3);
    }

    #[test]
    fn rejects_budget_smaller_than_reserve() {
        let raw = SAMPLE.replace("max_tokens: 8000", "max_tokens: 100");
        let err = Settings::from_yaml(&raw).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn rejects_zero_dimension() {
        let raw = SAMPLE.replace("dimension: 384", "dimension: 0");
        assert!(Settings::from_yaml(&raw).is_err());
    }
}

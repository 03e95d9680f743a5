//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Every section is `#[serde(default)]` so partial files merge cleanly.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::{network, pipeline, quality, retry, scan};
use crate::types::{DocKind, DocpilotError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Generation-service settings
    pub llm: LlmConfig,

    /// Orchestration settings
    pub pipeline: PipelineConfig,

    /// Repository scan settings
    pub scan: ScanConfig,

    /// Quality checker settings
    pub quality: QualityConfig,

    /// Output settings
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            llm: LlmConfig::default(),
            pipeline: PipelineConfig::default(),
            scan: ScanConfig::default(),
            quality: QualityConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `DocpilotError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(DocpilotError::Config(format!(
                "LLM temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(DocpilotError::Config(
                "LLM timeout_secs must be greater than 0".to_string(),
            ));
        }

        if let Some(base) = &self.llm.api_base {
            let url = url::Url::parse(base).map_err(|e| {
                DocpilotError::Config(format!("Invalid llm.api_base '{}': {}", base, e))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(DocpilotError::Config(format!(
                    "llm.api_base must use http or https, got: {}",
                    url.scheme()
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.quality.pass_threshold) {
            return Err(DocpilotError::Config(format!(
                "quality.pass_threshold must be between 0.0 and 1.0, got {}",
                self.quality.pass_threshold
            )));
        }

        if self.quality.stall_window < 2 {
            return Err(DocpilotError::Config(
                "quality.stall_window must be at least 2".to_string(),
            ));
        }

        if self.pipeline.max_concurrency == 0 {
            return Err(DocpilotError::Config(
                "pipeline.max_concurrency must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: openai, anthropic, ollama
    pub provider: String,

    /// Model name (provider-specific)
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Per-call timeout in seconds
    pub timeout_secs: u64,

    /// Maximum tokens to generate per call
    pub max_tokens: u32,

    /// Custom endpoint
    pub api_base: Option<String>,

    /// API key; falls back to the provider's environment variable.
    /// Never serialized.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            timeout_secs: network::DEFAULT_TIMEOUT_SECS,
            max_tokens: 4096,
            api_base: None,
            api_key: None,
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_tokens", &self.max_tokens)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// =============================================================================
// Pipeline Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bound on revise-loop iterations after the first draft
    pub max_revisions: u32,

    /// Retries of a transient service failure within one revision
    pub max_transient_retries: u8,

    /// Document tasks allowed to run at once
    pub max_concurrency: usize,

    /// Cap on component documents per run
    pub max_components: usize,

    /// Ask the generation service to enrich the structural analysis
    pub enrich: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_revisions: pipeline::DEFAULT_MAX_REVISIONS,
            max_transient_retries: retry::DEFAULT_MAX_RETRIES,
            max_concurrency: pipeline::DEFAULT_MAX_CONCURRENCY,
            max_components: pipeline::DEFAULT_MAX_COMPONENTS,
            enrich: true,
        }
    }
}

// =============================================================================
// Scan Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Fail the scan on the first unreadable entry instead of skipping it
    pub strict: bool,

    /// Directory names excluded by exact path-segment match
    pub excluded_dirs: Vec<String>,

    /// Files above this size are listed but never read
    pub max_content_bytes: u64,

    /// Also skip paths matched by `.gitignore` files
    pub respect_gitignore: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            strict: false,
            excluded_dirs: [
                ".git",
                "node_modules",
                "target",
                "__pycache__",
                "venv",
                ".venv",
                "dist",
                "build",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            max_content_bytes: scan::MAX_CONTENT_BYTES,
            respect_gitignore: false,
        }
    }
}

// =============================================================================
// Quality Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Minimum score for a draft to pass
    pub pass_threshold: f32,

    /// Identical consecutive drafts needed to declare the loop stalled
    pub stall_window: usize,

    /// Minimum word count per document kind
    pub min_words: MinWords,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MinWords {
    pub readme: usize,
    pub api: usize,
    pub component: usize,
}

impl Default for MinWords {
    fn default() -> Self {
        Self {
            readme: 150,
            api: 100,
            component: 60,
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            pass_threshold: quality::DEFAULT_PASS_THRESHOLD,
            stall_window: quality::DEFAULT_STALL_WINDOW,
            min_words: MinWords::default(),
        }
    }
}

impl QualityConfig {
    pub fn min_words_for(&self, kind: DocKind) -> usize {
        match kind {
            DocKind::Readme => self.min_words.readme,
            DocKind::Api => self.min_words.api,
            DocKind::Component => self.min_words.component,
        }
    }
}

// =============================================================================
// Output Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for documents, checkpoints and metrics
    pub output_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("docs"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.max_revisions, 3);
        assert!(!config.scan.strict);
    }

    #[test]
    fn test_rejects_bad_temperature() {
        let mut config = Config::default();
        config.llm.temperature = 3.5;
        assert!(matches!(config.validate(), Err(DocpilotError::Config(_))));
    }

    #[test]
    fn test_rejects_small_stall_window() {
        let mut config = Config::default();
        config.quality.stall_window = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_non_http_api_base() {
        let mut config = Config::default();
        config.llm.api_base = Some("ftp://example.com".to_string());
        assert!(config.validate().is_err());

        config.llm.api_base = Some("http://localhost:11434".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_api_key_redacted_and_not_serialized() {
        let mut config = Config::default();
        config.llm.api_key = Some("sk-secret".to_string());

        let debug = format!("{:?}", config.llm);
        assert!(!debug.contains("sk-secret"));

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }

    #[test]
    fn test_min_words_lookup() {
        let config = QualityConfig::default();
        assert_eq!(config.min_words_for(DocKind::Readme), 150);
    }
}

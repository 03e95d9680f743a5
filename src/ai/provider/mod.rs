//! Generation Service Abstraction
//!
//! Defines the `GenerationService` capability: prompt plus context in, text out.
//! Provider adapters are selected once from configuration; nothing downstream
//! branches on provider identity.
//!
//! ## Modules
//!
//! - `resilient`: retry with backoff, per-call timeout and the shared rate-limit gate
//! - `throttle`: rate-limit gate shared by concurrent callers

mod anthropic;
mod ollama;
mod openai;
mod resilient;
mod throttle;

pub use anthropic::AnthropicProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use resilient::{ResilientService, RetryPolicy};
pub use throttle::RateGate;

// Re-export error types from centralized location
pub use crate::types::{ErrorCategory, ErrorClassifier, ServiceError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::ai::MetricsCollector;
use crate::config::LlmConfig;
use crate::types::{DocpilotError, Result};

// =============================================================================
// Request / Response
// =============================================================================

/// One call into the generation service
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Task instructions
    pub prompt: String,
    /// Background facts (sent as the system message where the provider supports one)
    pub context: String,
    pub model: String,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, context: impl Into<String>, config: &LlmConfig) -> Self {
        Self {
            prompt: prompt.into(),
            context: context.into(),
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }

    /// Approximate request size in characters, for logging
    pub fn size(&self) -> usize {
        self.prompt.len() + self.context.len()
    }
}

/// Generated text with usage metrics
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
    pub timing: ResponseTiming,
    /// Model that actually served the call
    pub model: String,
}

/// Token usage metrics for cost tracking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens used (input + output)
    pub fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Add another usage record, saturating on overflow
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

impl std::ops::Add for TokenUsage {
    type Output = TokenUsage;

    fn add(mut self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage::add(&mut self, rhs);
        self
    }
}

/// Response timing metrics
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseTiming {
    /// Wall-clock time in milliseconds
    pub total_ms: u64,
}

impl ResponseTiming {
    pub fn from_duration(duration: Duration) -> Self {
        Self {
            total_ms: duration.as_millis() as u64,
        }
    }
}

// =============================================================================
// Capability Trait
// =============================================================================

/// Text-generation capability consumed by the analyzer and the document generators.
///
/// Implementations may be slow, rate-limited or return unusable text; callers
/// must not rely on any model's behavior.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;

    /// Provider name
    fn name(&self) -> &str;

    /// Default model
    fn model(&self) -> &str;
}

/// Shared service handle for concurrent document tasks.
pub type SharedService = Arc<dyn GenerationService>;

/// Build the provider adapter named in configuration, wrapped with retry and throttling.
///
/// Call statistics are recorded into `metrics`.
pub fn create_service(
    config: &LlmConfig,
    policy: RetryPolicy,
    metrics: Arc<MetricsCollector>,
) -> Result<SharedService> {
    let provider: SharedService = match config.provider.to_lowercase().as_str() {
        "openai" => Arc::new(OpenAiProvider::new(config)?),
        "anthropic" | "claude" => Arc::new(AnthropicProvider::new(config)?),
        "ollama" => Arc::new(OllamaProvider::new(config)?),
        other => {
            return Err(DocpilotError::Config(format!(
                "Unknown provider '{}'. Valid values: openai, anthropic, ollama",
                other
            )));
        }
    };

    Ok(Arc::new(
        ResilientService::new(provider, policy).with_metrics(metrics),
    ))
}

/// Reject blank model output before it reaches the checker
pub(crate) fn ensure_text(text: Option<String>, provider: &str) -> Result<String> {
    match text {
        Some(t) if !t.trim().is_empty() => Ok(t),
        _ => Err(DocpilotError::Generation(ServiceError::with_provider(
            ErrorCategory::ParseError,
            "empty response from generation service",
            provider,
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_usage_add() {
        let mut usage = TokenUsage::new(100, 50);
        usage.add(TokenUsage::new(10, 5));
        assert_eq!(usage.total(), 165);
        assert_eq!((usage + TokenUsage::new(1, 1)).total(), 167);
    }

    #[test]
    fn test_token_usage_saturates() {
        let mut usage = TokenUsage::new(u32::MAX, 0);
        usage.add(TokenUsage::new(1, 0));
        assert_eq!(usage.input_tokens, u32::MAX);
    }

    #[test]
    fn test_token_usage_total_saturates() {
        let usage = TokenUsage::new(u32::MAX, 1);
        assert_eq!(usage.total(), u32::MAX);
        assert!(!usage.is_empty());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = LlmConfig {
            provider: "carrier-pigeon".to_string(),
            ..LlmConfig::default()
        };
        let err = create_service(
            &config,
            RetryPolicy::default(),
            Arc::new(MetricsCollector::new()),
        )
        .err()
        .unwrap();
        assert!(matches!(err, DocpilotError::Config(_)));
    }

    #[test]
    fn test_ensure_text_rejects_blank() {
        let err = ensure_text(Some("  \n".to_string()), "openai").unwrap_err();
        assert!(err.is_transient());
        assert_eq!(ensure_text(Some("ok".into()), "openai").unwrap(), "ok");
        assert!(ensure_text(None, "openai").is_err());
    }
}

//! Unified Error Type System
//!
//! Centralized error types for the whole pipeline, with classification of
//! generation-service failures for retry decisions.
//!
//! ## Error Categories
//!
//! - **Transient**: temporary server issues (retry with backoff)
//! - **RateLimit**: the service asked us to slow down (wait, then retry)
//! - **Auth**: credentials rejected (never retried)
//! - **BadRequest**: the request itself is wrong (never retried)
//! - **Network**: connectivity issues (retry with backoff)
//! - **Unavailable**: model or endpoint not reachable right now (retry)
//! - **ParseError**: unusable response text (retry)

use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

/// Three-digit HTTP status mentioned as a whole word
static STATUS_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([1-5][0-9]{2})\b").expect("valid regex literal"));

// =============================================================================
// Error Categories
// =============================================================================

/// Categories for generation-service failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rate limited - pause every caller, then retry
    RateLimit,
    /// Authentication failed - fail fast
    Auth,
    /// Network/connectivity issues - retry with backoff
    Network,
    /// Model or endpoint not available - retry with backoff
    Unavailable,
    /// Invalid request - don't retry, fix request
    BadRequest,
    /// Response was empty or malformed
    ParseError,
    /// Temporary server issues (5xx, overloaded)
    Transient,
    /// Unknown error
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::Auth => write!(f, "AUTH"),
            Self::Network => write!(f, "NETWORK"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
            Self::BadRequest => write!(f, "BAD_REQUEST"),
            Self::ParseError => write!(f, "PARSE_ERROR"),
            Self::Transient => write!(f, "TRANSIENT"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl ErrorCategory {
    /// Check if a call failing with this category may be attempted again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::Network | Self::Unavailable | Self::Transient | Self::ParseError
        )
    }

    /// Recommended pause before the next attempt
    pub fn recommended_delay(&self) -> Duration {
        match self {
            Self::RateLimit => Duration::from_secs(30),
            Self::Network => Duration::from_secs(5),
            Self::Transient => Duration::from_secs(2),
            Self::ParseError => Duration::from_secs(1),
            _ => Duration::from_millis(500),
        }
    }
}

// =============================================================================
// Service Error
// =============================================================================

/// Generation-service failure with category, provider and retry hint
#[derive(Debug, Clone)]
pub struct ServiceError {
    pub category: ErrorCategory,
    pub message: String,
    pub provider: Option<String>,
    /// Wait advertised by the service (Retry-After) or implied by the category
    pub retry_after: Option<Duration>,
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}:{}] {}", provider, self.category, self.message)
        } else {
            write!(f, "[{}] {}", self.category, self.message)
        }
    }
}

impl std::error::Error for ServiceError {}

impl ServiceError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            provider: None,
            retry_after: None,
        }
    }

    pub fn with_provider(
        category: ErrorCategory,
        message: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            provider: Some(provider.into()),
            retry_after: None,
        }
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }

    pub fn is_rate_limited(&self) -> bool {
        self.category == ErrorCategory::RateLimit
    }

    /// Advertised wait, falling back to the category default
    pub fn recommended_delay(&self) -> Duration {
        self.retry_after
            .unwrap_or_else(|| self.category.recommended_delay())
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Maps provider responses to error categories
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify a free-form error message from any provider
    pub fn classify(message: &str, provider: &str) -> ServiceError {
        let lower = message.to_lowercase();

        if lower.contains("rate limit")
            || mentions_status(&lower, &[429])
            || lower.contains("too many requests")
            || lower.contains("quota exceeded")
        {
            return ServiceError::with_provider(ErrorCategory::RateLimit, message, provider)
                .retry_after(Duration::from_secs(30));
        }

        if mentions_status(&lower, &[401, 403])
            || lower.contains("api key")
            || lower.contains("invalid key")
            || lower.contains("unauthorized")
            || lower.contains("authentication")
        {
            return ServiceError::with_provider(ErrorCategory::Auth, message, provider);
        }

        if lower.contains("network")
            || lower.contains("connection")
            || lower.contains("dns")
            || lower.contains("timed out")
            || lower.contains("timeout")
            || lower.contains("unreachable")
        {
            return ServiceError::with_provider(ErrorCategory::Network, message, provider)
                .retry_after(Duration::from_secs(5));
        }

        if mentions_status(&lower, &[500, 502, 503, 504])
            || lower.contains("overloaded")
            || lower.contains("service unavailable")
            || lower.contains("server error")
            || lower.contains("temporary")
        {
            return ServiceError::with_provider(ErrorCategory::Transient, message, provider)
                .retry_after(Duration::from_secs(2));
        }

        if lower.contains("model not found") || lower.contains("no such model") {
            return ServiceError::with_provider(ErrorCategory::Unavailable, message, provider);
        }

        if mentions_status(&lower, &[400]) || lower.contains("bad request") || lower.contains("malformed") {
            return ServiceError::with_provider(ErrorCategory::BadRequest, message, provider);
        }

        if lower.contains("parse") || lower.contains("empty response") {
            return ServiceError::with_provider(ErrorCategory::ParseError, message, provider)
                .retry_after(Duration::from_secs(1));
        }

        ServiceError::with_provider(ErrorCategory::Unknown, message, provider)
    }

    /// Classify an HTTP status code directly (more accurate than string matching)
    pub fn classify_http_status(status: u16, message: &str, provider: &str) -> ServiceError {
        match status {
            429 => ServiceError::with_provider(ErrorCategory::RateLimit, message, provider)
                .retry_after(Duration::from_secs(30)),
            401 | 403 => ServiceError::with_provider(ErrorCategory::Auth, message, provider),
            400 | 422 => ServiceError::with_provider(ErrorCategory::BadRequest, message, provider),
            404 => ServiceError::with_provider(ErrorCategory::Unavailable, message, provider),
            408 | 500 | 502 | 503 | 504 | 529 => {
                ServiceError::with_provider(ErrorCategory::Transient, message, provider)
                    .retry_after(Duration::from_secs(5))
            }
            _ => ServiceError::with_provider(ErrorCategory::Unknown, message, provider),
        }
    }

    /// Parse a `Retry-After` header value given in seconds
    pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
        value
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
    }
}

fn mentions_status(text: &str, codes: &[u16]) -> bool {
    STATUS_CODE
        .captures_iter(text)
        .filter_map(|caps| caps[1].parse::<u16>().ok())
        .any(|code| codes.contains(&code))
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum DocpilotError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // -------------------------------------------------------------------------
    // Pipeline Errors
    // -------------------------------------------------------------------------
    #[error("Repository path not found or not a directory: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Stage '{stage}' requires '{requires}' to succeed first")]
    Sequence { stage: String, requires: String },

    #[error("Generation failed: {0}")]
    Generation(ServiceError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Permission denied for {}: {message}", path.display())]
    Permission { path: PathBuf, message: String },

    #[error("Cancelled during {stage}")]
    Cancelled { stage: String },

    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error("Config error: {0}")]
    Config(String),
}

impl From<ServiceError> for DocpilotError {
    fn from(err: ServiceError) -> Self {
        DocpilotError::Generation(err)
    }
}

pub type Result<T> = std::result::Result<T, DocpilotError>;

impl DocpilotError {
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    pub fn sequence(stage: impl Into<String>, requires: impl Into<String>) -> Self {
        Self::Sequence {
            stage: stage.into(),
            requires: requires.into(),
        }
    }

    pub fn cancelled(stage: impl Into<String>) -> Self {
        Self::Cancelled {
            stage: stage.into(),
        }
    }

    pub fn generation(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self::Generation(ServiceError::new(category, message))
    }

    /// Whether a generation call failing with this error may be attempted again
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Generation(e) => e.is_retryable(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Service error carried by this error, if any
    pub fn service_error(&self) -> Option<&ServiceError> {
        match self {
            Self::Generation(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Process exit code for the CLI
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::NotFound { .. } => 2,
            Self::Sequence { .. } => 3,
            Self::Generation(_) | Self::Timeout { .. } => 4,
            Self::Validation(_) => 5,
            Self::Permission { .. } => 6,
            Self::Config(_) => 7,
            Self::Cancelled { .. } => 130,
            _ => 1,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

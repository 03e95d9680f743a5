//! Generation-Service Layer
//!
//! The capability interface, provider adapters, retry/throttle policies,
//! timeouts and cost accounting.

pub mod json;
pub mod metrics;
pub mod provider;
pub mod timeout;

pub use json::parse_json;
pub use metrics::{CallStats, MetricsCollector, ModelPricing, estimate_cost};
pub use provider::{
    AnthropicProvider, Completion, CompletionRequest, GenerationService, OllamaProvider,
    OpenAiProvider, RateGate, ResilientService, ResponseTiming, RetryPolicy, SharedService,
    TokenUsage, create_service,
};
pub use timeout::with_timeout;

//! Generation-Service Metrics
//!
//! Thread-safe call counters shared by concurrent document tasks, and the
//! per-model price table used to estimate cost from token usage.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::ai::provider::{Completion, TokenUsage};

// =============================================================================
// Pricing
// =============================================================================

/// USD per 1K tokens
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

/// Longest prefix wins, so `gpt-4-turbo` is matched before `gpt-4`
const PRICING: &[(&str, ModelPricing)] = &[
    ("gpt-4o-mini", ModelPricing { input_per_1k: 0.00015, output_per_1k: 0.0006 }),
    ("gpt-4o", ModelPricing { input_per_1k: 0.0025, output_per_1k: 0.01 }),
    ("gpt-4-turbo", ModelPricing { input_per_1k: 0.01, output_per_1k: 0.03 }),
    ("gpt-4", ModelPricing { input_per_1k: 0.03, output_per_1k: 0.06 }),
    ("gpt-3.5-turbo", ModelPricing { input_per_1k: 0.0005, output_per_1k: 0.0015 }),
    ("claude-3-opus", ModelPricing { input_per_1k: 0.015, output_per_1k: 0.075 }),
    ("claude-3-sonnet", ModelPricing { input_per_1k: 0.003, output_per_1k: 0.015 }),
    ("claude-3-5-sonnet", ModelPricing { input_per_1k: 0.003, output_per_1k: 0.015 }),
    ("claude-3-haiku", ModelPricing { input_per_1k: 0.00025, output_per_1k: 0.00125 }),
];

const DEFAULT_PRICING: ModelPricing = ModelPricing {
    input_per_1k: 0.01,
    output_per_1k: 0.03,
};

impl ModelPricing {
    /// Price for a model name; local models (`provider == ollama`) are free
    pub fn for_model(model: &str) -> Self {
        let lower = model.to_lowercase();
        PRICING
            .iter()
            .filter(|(prefix, _)| lower.starts_with(prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, pricing)| *pricing)
            .unwrap_or(DEFAULT_PRICING)
    }

    pub fn free() -> Self {
        Self {
            input_per_1k: 0.0,
            output_per_1k: 0.0,
        }
    }

    pub fn cost(&self, usage: TokenUsage) -> f64 {
        (usage.input_tokens as f64 / 1000.0) * self.input_per_1k
            + (usage.output_tokens as f64 / 1000.0) * self.output_per_1k
    }
}

/// Estimated USD cost of `usage` on `model`
pub fn estimate_cost(provider: &str, model: &str, usage: TokenUsage) -> f64 {
    if provider.eq_ignore_ascii_case("ollama") {
        return ModelPricing::free().cost(usage);
    }
    ModelPricing::for_model(model).cost(usage)
}

// =============================================================================
// Metrics Collector
// =============================================================================

/// Call counters for one generation service.
///
/// Atomics only, so concurrent tasks never contend on a lock.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    api_calls: AtomicU32,
    failed_calls: AtomicU32,
    retries: AtomicU32,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    total_latency_ms: AtomicU64,
}

/// Point-in-time copy of the collector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallStats {
    /// Successful calls
    pub api_calls: u32,
    pub failed_calls: u32,
    pub retries: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub avg_latency_ms: f64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_completion(&self, completion: &Completion) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
        self.input_tokens
            .fetch_add(completion.usage.input_tokens as u64, Ordering::Relaxed);
        self.output_tokens
            .fetch_add(completion.usage.output_tokens as u64, Ordering::Relaxed);
        self.total_latency_ms
            .fetch_add(completion.timing.total_ms, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CallStats {
        let api_calls = self.api_calls.load(Ordering::Relaxed);
        let latency = self.total_latency_ms.load(Ordering::Relaxed);
        CallStats {
            api_calls,
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
            avg_latency_ms: if api_calls > 0 {
                latency as f64 / api_calls as f64
            } else {
                0.0
            },
        }
    }
}

//! Resilient Service Wrapper
//!
//! Wraps a provider adapter with the policies every caller needs:
//! per-call timeout, bounded exponential backoff for transient failures,
//! and the shared rate-limit gate. Auth and bad-request failures are
//! returned on the first attempt.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};

use super::{Completion, CompletionRequest, GenerationService, RateGate, SharedService};
use crate::ai::metrics::MetricsCollector;
use crate::ai::timeout::with_timeout;
use crate::config::Config;
use crate::constants::{network, retry, throttle};
use crate::types::{DocpilotError, Result};

/// Retry, timeout and concurrency limits for one service
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt
    pub max_retries: u8,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Timeout applied to each individual attempt
    pub call_timeout: Duration,
    /// Calls allowed in flight at once
    pub max_in_flight: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: retry::DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(retry::BASE_DELAY_MS),
            max_delay: Duration::from_secs(retry::MAX_DELAY_SECS),
            call_timeout: Duration::from_secs(network::DEFAULT_TIMEOUT_SECS),
            max_in_flight: crate::constants::pipeline::DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.pipeline.max_transient_retries,
            call_timeout: Duration::from_secs(config.llm.timeout_secs),
            max_in_flight: config.pipeline.max_concurrency,
            ..Self::default()
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_factor(retry::BACKOFF_FACTOR)
            .with_max_times(self.max_retries as usize)
            .with_jitter()
    }
}

/// Generation service with retry, timeout and rate-limit throttling
pub struct ResilientService {
    inner: SharedService,
    policy: RetryPolicy,
    gate: Arc<RateGate>,
    metrics: Arc<MetricsCollector>,
}

impl ResilientService {
    pub fn new(inner: SharedService, policy: RetryPolicy) -> Self {
        let gate = Arc::new(RateGate::new(policy.max_in_flight));
        Self {
            inner,
            policy,
            gate,
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    /// Record call statistics into a collector owned elsewhere
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn gate(&self) -> &RateGate {
        &self.gate
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.metrics)
    }

    async fn attempt(&self, request: &CompletionRequest) -> Result<Completion> {
        let _permit = self.gate.acquire().await?;

        let result = with_timeout(
            self.policy.call_timeout,
            self.inner.complete(request),
            "generation call",
        )
        .await;

        match &result {
            Ok(completion) => self.metrics.record_completion(completion),
            Err(err) => {
                self.metrics.record_failure();
                if let Some(service_err) = err.service_error()
                    && service_err.is_rate_limited()
                {
                    let pause = service_err
                        .retry_after
                        .unwrap_or(Duration::from_secs(throttle::DEFAULT_PAUSE_SECS));
                    self.gate.pause_for(pause);
                }
            }
        }

        result
    }
}

#[async_trait]
impl GenerationService for ResilientService {
    #[instrument(skip(self, request), fields(provider = %self.inner.name(), model = %request.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let attempt = move || self.attempt(request);

        attempt
            .retry(self.policy.backoff())
            .sleep(tokio::time::sleep)
            .when(|err: &DocpilotError| err.is_transient())
            .notify(|err: &DocpilotError, delay: Duration| {
                self.metrics.record_retry();
                warn!(
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "Transient generation failure, retrying"
                );
            })
            .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}

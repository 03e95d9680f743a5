//! Rate-Limit Gate
//!
//! Shared by every concurrent caller of one generation service. Limits
//! in-flight calls with a semaphore and, once the service signals rate
//! limiting, holds all callers until the advertised pause has elapsed.
//!
//! ```text
//! Open --[rate limit signal]--> Paused(until)
//! Paused --[until elapsed]--> Open
//! ```

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::constants::throttle as throttle_constants;
use crate::types::{DocpilotError, ErrorCategory, Result};

/// Gate that serializes or throttles calls while the service is rate limiting
pub struct RateGate {
    permits: Semaphore,
    paused_until: Mutex<Option<Instant>>,
    pauses: AtomicU64,
}

impl RateGate {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            permits: Semaphore::new(max_in_flight.max(1)),
            paused_until: Mutex::new(None),
            pauses: AtomicU64::new(0),
        }
    }

    /// Wait until the gate is open, then take an in-flight slot
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>> {
        loop {
            let wait = self.remaining_pause();
            if !wait.is_zero() {
                debug!(wait_ms = wait.as_millis() as u64, "Rate gate closed, waiting");
                tokio::time::sleep(wait + resume_jitter()).await;
                continue;
            }

            let permit = self.permits.acquire().await.map_err(|_| {
                DocpilotError::generation(ErrorCategory::Unknown, "rate gate closed")
            })?;

            // another caller may have hit the limit while we queued
            if self.remaining_pause().is_zero() {
                return Ok(permit);
            }
        }
    }

    /// Close the gate for `duration`, never shortening an existing pause
    pub fn pause_for(&self, duration: Duration) {
        let duration = duration.min(Duration::from_secs(throttle_constants::MAX_PAUSE_SECS));
        let until = Instant::now() + duration;

        let mut paused = self
            .paused_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if paused.is_none_or(|current| current < until) {
            *paused = Some(until);
        }
        self.pauses.fetch_add(1, Ordering::Relaxed);

        warn!(
            pause_ms = duration.as_millis() as u64,
            "Generation service signalled rate limiting; pausing all callers"
        );
    }

    /// Time left before the gate reopens
    pub fn remaining_pause(&self) -> Duration {
        let paused = self
            .paused_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        paused
            .map(|until| until.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    /// Number of rate-limit pauses so far
    pub fn pause_count(&self) -> u64 {
        self.pauses.load(Ordering::Relaxed)
    }
}

impl Default for RateGate {
    fn default() -> Self {
        Self::new(crate::constants::pipeline::DEFAULT_MAX_CONCURRENCY)
    }
}

fn resume_jitter() -> Duration {
    let max = throttle_constants::RESUME_JITTER_MS;
    Duration::from_millis(rand::rng().random_range(0..=max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_gate_acquires_immediately() {
        let gate = RateGate::new(2);
        let _a = gate.acquire().await.unwrap();
        let _b = gate.acquire().await.unwrap();
        assert_eq!(gate.pause_count(), 0);
    }

    #[test]
    fn test_pause_never_shortened() {
        let gate = RateGate::new(1);
        gate.pause_for(Duration::from_secs(10));
        gate.pause_for(Duration::from_secs(1));
        assert!(gate.remaining_pause() > Duration::from_secs(5));
        assert_eq!(gate.pause_count(), 2);
    }

    #[test]
    fn test_pause_is_capped() {
        let gate = RateGate::new(1);
        gate.pause_for(Duration::from_secs(3600));
        assert!(gate.remaining_pause() <= Duration::from_secs(throttle_constants::MAX_PAUSE_SECS));
    }

    #[tokio::test]
    async fn test_acquire_waits_for_pause() {
        let gate = RateGate::new(1);
        gate.pause_for(Duration::from_millis(50));

        let started = Instant::now();
        let _permit = gate.acquire().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}

//! Retry back-off and circuit breaking for sidecar calls
//!
//! Every sidecar request runs inside the retry loop, and every individual
//! attempt asks the breaker for permission first. While the circuit is open,
//! attempts are rejected without touching the network.

use std::time::Duration;

use log::{info, warn};
use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::{BreakerConfig, RetryPolicy};
use crate::error::SdkError;

impl RetryPolicy {
    /// Delay before retry `attempt` (1-based): `base * 2^attempt` plus up to
    /// `max_jitter` of random jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let backoff = self.base.saturating_mul(2u32.saturating_pow(attempt));
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        } else {
            Duration::ZERO
        };
        backoff + jitter
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    /// One trial call is in flight; everything else is rejected until it
    /// reports back or the trial is abandoned for a full break duration.
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    /// When the circuit opened, or when the current half-open trial started.
    since: Option<Instant>,
}

/// Consecutive-failure circuit breaker shared by all sidecar operations.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                since: None,
            }),
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    /// Asks permission for one attempt.
    ///
    /// A half-open trial whose caller was dropped before reporting back is
    /// given up after one break duration, and the next caller becomes the
    /// new trial.
    pub async fn acquire(&self) -> Result<(), SdkError> {
        let mut inner = self.inner.lock().await;
        if inner.state == CircuitState::Closed {
            return Ok(());
        }

        let elapsed = inner
            .since
            .map(|since| since.elapsed() >= self.config.break_duration)
            .unwrap_or(true);
        if !elapsed {
            return Err(SdkError::CircuitOpen);
        }

        if inner.state == CircuitState::HalfOpen {
            warn!("Circuit breaker trial request never reported back, starting a new trial");
        } else {
            info!("Circuit breaker half-open, allowing a trial request");
        }
        inner.state = CircuitState::HalfOpen;
        inner.since = Some(Instant::now());
        Ok(())
    }

    pub async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state != CircuitState::Closed {
            info!("Circuit breaker closed");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.since = None;
    }

    pub async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        let trip = inner.state == CircuitState::HalfOpen
            || inner.consecutive_failures >= self.config.failure_threshold;
        if trip {
            if inner.state != CircuitState::Open {
                warn!(
                    "Circuit breaker opened after {} consecutive failures, blocking for {:?}",
                    inner.consecutive_failures, self.config.break_duration
                );
            }
            inner.state = CircuitState::Open;
            inner.since = Some(Instant::now());
        }
    }
}

//! Periodic health pings to the sidecar
//!
//! The reporter runs as its own task for the life of the process. It stops
//! when health reporting is switched off (the UNHEALTHY command) or when the
//! process-wide cancellation token fires.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::config::HealthConfig;
use crate::error::ServerError;
use crate::sdk::SidecarApi;

/// Log every Nth ping at info level.
const PING_LOG_SAMPLE: u64 = 10;

/// State shared between the health reporter and the command dispatcher.
#[derive(Debug)]
pub struct ReporterState {
    health_enabled: AtomicBool,
    ping_count: AtomicU64,
}

impl ReporterState {
    pub fn new() -> Self {
        Self {
            health_enabled: AtomicBool::new(true),
            ping_count: AtomicU64::new(0),
        }
    }

    pub fn health_enabled(&self) -> bool {
        self.health_enabled.load(Ordering::Acquire)
    }

    pub fn disable_health(&self) {
        self.health_enabled.store(false, Ordering::Release);
    }

    pub fn ping_count(&self) -> u64 {
        self.ping_count.load(Ordering::Relaxed)
    }

    /// Returns the count before the increment.
    fn record_ping(&self) -> u64 {
        self.ping_count.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for ReporterState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct HealthReporter {
    sidecar: Arc<dyn SidecarApi>,
    state: Arc<ReporterState>,
    interval: Duration,
}

impl HealthReporter {
    pub fn new(sidecar: Arc<dyn SidecarApi>, state: Arc<ReporterState>, config: HealthConfig) -> Self {
        Self {
            sidecar,
            state,
            interval: config.interval,
        }
    }

    /// Pings until health is disabled (`Ok`) or `cancel` fires
    /// (`Err(ServerError::Cancelled)`). Failed pings are logged and retried
    /// on the next tick.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ServerError> {
        info!("Starting health pings every {:?}", self.interval);

        while self.state.health_enabled() {
            if cancel.is_cancelled() {
                info!("Health pings cancelled");
                return Err(ServerError::Cancelled);
            }

            let count = self.state.record_ping();
            if count % PING_LOG_SAMPLE == 0 {
                info!("Health ping #{}", count);
            }
            debug!("Sending health ping #{}", count);

            // A ping can sit in retry back-off for several seconds
            let ok = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Health pings cancelled during ping #{}", count);
                    return Err(ServerError::Cancelled);
                }
                ok = self.sidecar.health() => ok,
            };
            if !ok {
                warn!("Health ping #{} failed, will retry", count);
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Health pings cancelled");
                    return Err(ServerError::Cancelled);
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Health pings disabled, reporter stopped");
        Ok(())
    }
}

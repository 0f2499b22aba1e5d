//! Runtime configuration for the sidecar client, health reporter and UDP server.
//!
//! The binary fills these from command-line flags and environment variables;
//! tests build them directly.

use std::time::Duration;

use shared::{DEFAULT_PORT, DEFAULT_SDK_HTTP_PORT};

/// Where and how to reach the sidecar.
#[derive(Debug, Clone)]
pub struct SidecarConfig {
    /// Base URL of the sidecar's HTTP gateway, always on loopback.
    pub base_url: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub breaker: BreakerConfig,
}

impl SidecarConfig {
    pub fn for_port(port: u16) -> Self {
        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            ..Self::default()
        }
    }
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            base_url: format!("http://127.0.0.1:{}", DEFAULT_SDK_HTTP_PORT),
            request_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

/// Exponential back-off with jitter for transient sidecar failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Delay before retry `n` is `base * 2^n` plus jitter.
    pub base: Duration,
    pub max_jitter: Duration,
}

impl RetryPolicy {
    /// No retries at all; every call is a single attempt.
    pub fn none() -> Self {
        Self {
            retries: 0,
            base: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base: Duration::from_secs(1),
            max_jitter: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive transient failures that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial call.
    pub break_duration: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            break_duration: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub interval: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

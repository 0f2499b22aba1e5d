//! Error types for the sidecar client and the UDP server loop

use reqwest::StatusCode;
use thiserror::Error;

/// Why a sidecar call failed. Callers of the public operations only ever see
/// this as `success = false`; the detail goes to the debug log.
#[derive(Debug, Error)]
pub enum SdkError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sidecar responded with status {0}")]
    Status(StatusCode),

    #[error("failed to decode sidecar response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("circuit breaker is open")]
    CircuitOpen,

    #[error("sidecar client is closed")]
    Closed,

    #[error("metadata key must not be empty")]
    EmptyKey,
}

impl SdkError {
    /// Transport errors, timeouts, 5xx and 408 are worth retrying and count
    /// against the circuit breaker.
    pub fn is_transient(&self) -> bool {
        match self {
            SdkError::Http(_) => true,
            SdkError::Status(status) => is_transient_status(*status),
            _ => false,
        }
    }
}

pub fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The process-wide cancellation signal fired. Not a failure.
    #[error("cancelled")]
    Cancelled,
}

//! Error types for the location relay.

use thiserror::Error;

/// Main error type for relay operations.
///
/// Runtime failures of the location service never surface here; they are
/// reported through [`Status`](crate::Status) or logged. These errors cover
/// input validation, configuration and explicit synchronization calls.
#[derive(Debug, Error)]
pub enum LocationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid update policy: {0}")]
    InvalidPolicy(String),

    #[error("Unknown priority code: {0}")]
    InvalidPriority(i32),

    #[error("Unknown status code: {0}")]
    InvalidStatus(i32),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timed out waiting for the service context")]
    Timeout,

    #[error("Service context is closed")]
    Closed,
}

impl From<serde_json::Error> for LocationError {
    fn from(e: serde_json::Error) -> Self {
        LocationError::Config(e.to_string())
    }
}

/// Errors raised by a [`LocationService`](crate::LocationService) implementation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Service is not connected")]
    NotConnected,

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Other(String),
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, LocationError>;

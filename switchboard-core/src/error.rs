//! Error types for switchboard

use std::time::Duration;
use thiserror::Error;

/// The main error type for switchboard operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Channel communication errors
    #[error("Channel error: {0}")]
    Channel(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Delivery failure reported by a channel adapter
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for switchboard operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Failure raised by a channel adapter while delivering an outbound message.
///
/// The bus never retries or rewrites these: `send_direct` hands them back to
/// the caller exactly as the adapter produced them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The adapter exists but is not connected
    #[error("Channel not running: {0}")]
    NotRunning(String),

    /// The target chat does not exist or is not reachable
    #[error("Chat not found: {0}")]
    ChatNotFound(String),

    /// The platform refused the message (bad payload, permissions, size)
    #[error("Message rejected: {0}")]
    Rejected(String),

    /// The platform asked us to slow down
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Network or I/O failure talking to the platform
    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<std::io::Error> for DeliveryError {
    fn from(e: std::io::Error) -> Self {
        DeliveryError::Transport(e.to_string())
    }
}

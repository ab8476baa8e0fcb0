//! Error types for digestd

use p4ctl_device::DeviceError;
use p4ctl_types::ParseError;
use thiserror::Error;

/// Errors that can occur in digestd
#[derive(Debug, Error)]
pub enum DigestdError {
    /// Device session operation failed
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// A digest entry could not be decoded
    #[error("Digest decode error: {0}")]
    Decode(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Flow address parse error
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// The listener task ended abnormally
    #[error("Listener error: {0}")]
    Listener(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for digestd operations
pub type Result<T> = std::result::Result<T, DigestdError>;

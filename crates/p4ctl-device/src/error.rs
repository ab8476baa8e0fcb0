//! Device error types.
//!
//! Connection and table-resolution failures are fatal at startup. Write and
//! poll failures are recoverable and handled by the caller.

use thiserror::Error;

/// Error type for device session operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The control interface could not be reached.
    #[error("connection to {address} failed: {reason}")]
    Connection { address: String, reason: String },

    /// The loaded program has no table with this name.
    #[error("table not found: {table}")]
    NotFound { table: String },

    /// A table entry could not be written.
    #[error("write to {table} failed: {reason}")]
    Write { table: String, reason: String },

    /// Digest polling failed (no data ready is reported as an empty batch, not this).
    #[error("digest poll on {table} failed: {reason}")]
    Poll { table: String, reason: String },

    /// Digest delivery could not be enabled.
    #[error("sync on {table} failed: {reason}")]
    Sync { table: String, reason: String },
}

impl DeviceError {
    pub fn connection(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connection {
            address: address.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(table: impl Into<String>) -> Self {
        Self::NotFound {
            table: table.into(),
        }
    }

    pub fn write(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Write {
            table: table.into(),
            reason: reason.into(),
        }
    }

    pub fn poll(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Poll {
            table: table.into(),
            reason: reason.into(),
        }
    }

    pub fn sync(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Sync {
            table: table.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for errors the controller cannot run without.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::NotFound { .. })
    }
}

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

//! Common flow key types for the p4ctl control plane.
//!
//! This crate provides the value types shared between the device layer and
//! the digest controller:
//!
//! - [`FlowIdentity`]: 32-bit IPv4 source address keying all per-flow state,
//!   with the wire <-> dotted-quad codec
//! - [`EgressPort`]: device port number used as an action parameter

mod flow;
mod port;

pub use flow::FlowIdentity;
pub use port::EgressPort;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid flow address format: {0} (expected four dot-separated octets 0-255)")]
    InvalidFormat(String),

    #[error("invalid egress port: {0}")]
    InvalidPort(String),
}

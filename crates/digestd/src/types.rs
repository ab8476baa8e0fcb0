//! Core types for digest handling
//!
//! A raw digest from the device is decoded into a [`DigestRecord`]; the
//! policy turns records into [`RuleIntent`]s.

use crate::error::{DigestdError, Result};
use p4ctl_device::RawDigestEntry;
use p4ctl_device::types::be_uint;
use p4ctl_types::{EgressPort, FlowIdentity};
use std::fmt;

/// Field names of the digest emitted by the data plane
pub mod fields {
    pub const SRC_IP: &str = "src_ip";
    pub const DST_IP: &str = "dst_ip";
    pub const PASS_COUNT: &str = "pass_count";
}

/// A decoded digest: one observation of a flow by the data plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestRecord {
    pub src: FlowIdentity,
    pub dst: FlowIdentity,
    /// Number of recirculations the data plane has counted for this flow
    pub observed_count: u32,
}

impl DigestRecord {
    pub fn new(src: FlowIdentity, dst: FlowIdentity, observed_count: u32) -> Self {
        Self {
            src,
            dst,
            observed_count,
        }
    }

    /// Decodes a raw entry. Every field must be present and 1..=4 bytes wide.
    pub fn decode(entry: &RawDigestEntry) -> Result<Self> {
        Ok(Self {
            src: FlowIdentity::from_raw(read_u32(entry, fields::SRC_IP)?),
            dst: FlowIdentity::from_raw(read_u32(entry, fields::DST_IP)?),
            observed_count: read_u32(entry, fields::PASS_COUNT)?,
        })
    }
}

fn read_u32(entry: &RawDigestEntry, name: &str) -> Result<u32> {
    let bytes = entry
        .field(name)
        .ok_or_else(|| DigestdError::Decode(format!("missing field {}", name)))?;
    if bytes.len() > 4 {
        return Err(DigestdError::Decode(format!(
            "field {} is {} bytes wide, expected at most 4",
            name,
            bytes.len()
        )));
    }
    be_uint(bytes)
        .map(|v| v as u32)
        .ok_or_else(|| DigestdError::Decode(format!("field {} is empty", name)))
}

/// Per-flow state tracked by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlowState {
    /// Pass count of the latest digest (not assumed monotonic)
    pub last_observed_count: u32,
    /// A direct-forward rule has been issued for this flow
    pub rule_installed: bool,
}

/// Lifecycle of a flow: `Unseen -> Recirculating -> DirectForwardInstalled`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowPhase {
    Unseen,
    Recirculating,
    /// Terminal
    DirectForwardInstalled,
}

impl fmt::Display for FlowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlowPhase::Unseen => "unseen",
            FlowPhase::Recirculating => "recirculating",
            FlowPhase::DirectForwardInstalled => "direct-forward-installed",
        };
        f.write_str(s)
    }
}

/// Action of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    /// Send the flow through the slow path (emits digests)
    Recirculate,
    /// Forward the flow straight out of `port`
    DirectForward { port: EgressPort },
}

impl RuleAction {
    /// Metric label for this action kind
    pub fn kind(&self) -> &'static str {
        match self {
            RuleAction::Recirculate => "recirculate",
            RuleAction::DirectForward { .. } => "direct_forward",
        }
    }
}

/// A desired table mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleIntent {
    pub table: String,
    pub match_key: FlowIdentity,
    pub action: RuleAction,
}

impl RuleIntent {
    pub fn recirculate(table: impl Into<String>, match_key: FlowIdentity) -> Self {
        Self {
            table: table.into(),
            match_key,
            action: RuleAction::Recirculate,
        }
    }

    pub fn direct_forward(
        table: impl Into<String>,
        match_key: FlowIdentity,
        port: EgressPort,
    ) -> Self {
        Self {
            table: table.into(),
            match_key,
            action: RuleAction::DirectForward { port },
        }
    }
}

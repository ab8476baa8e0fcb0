//! Flow identity and the wire <-> dotted-quad codec.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Source address of a flow, as carried on the wire (host-order `u32` of the
/// big-endian address bytes).
///
/// This is the natural key for all per-flow state in the controller.
/// Serializes as its dotted-quad string so it can appear in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FlowIdentity(u32);

impl FlowIdentity {
    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        FlowIdentity(u32::from_be_bytes([a, b, c, d]))
    }

    pub const fn from_raw(raw: u32) -> Self {
        FlowIdentity(raw)
    }

    /// Returns the wire-level value.
    pub const fn raw(&self) -> u32 {
        self.0
    }

    /// Returns the address bytes in network order.
    pub const fn octets(&self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Parses a dotted-quad string.
    ///
    /// Only the canonical form is accepted: exactly four decimal octets in
    /// 0..=255, no leading zeros, signs or whitespace. Canonical input makes
    /// `decode(encode(s)) == s` hold for every accepted `s`.
    pub fn encode(s: &str) -> Result<Self, ParseError> {
        s.parse::<Ipv4Addr>()
            .map(Self::from)
            .map_err(|_| ParseError::InvalidFormat(s.to_string()))
    }

    /// Renders the four octets, most significant first.
    pub fn decode(&self) -> String {
        let v = self.0;
        format!(
            "{}.{}.{}.{}",
            (v >> 24) & 0xff,
            (v >> 16) & 0xff,
            (v >> 8) & 0xff,
            v & 0xff
        )
    }
}

impl fmt::Display for FlowIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.decode())
    }
}

impl FromStr for FlowIdentity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::encode(s)
    }
}

impl TryFrom<String> for FlowIdentity {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::encode(&s)
    }
}

impl From<FlowIdentity> for String {
    fn from(id: FlowIdentity) -> Self {
        id.decode()
    }
}

impl From<u32> for FlowIdentity {
    fn from(raw: u32) -> Self {
        FlowIdentity(raw)
    }
}

impl From<FlowIdentity> for u32 {
    fn from(id: FlowIdentity) -> Self {
        id.0
    }
}

impl From<Ipv4Addr> for FlowIdentity {
    fn from(addr: Ipv4Addr) -> Self {
        FlowIdentity(u32::from(addr))
    }
}

impl From<FlowIdentity> for Ipv4Addr {
    fn from(id: FlowIdentity) -> Self {
        Ipv4Addr::from(id.0)
    }
}

//! Device egress port numbers.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Device port number used as the `port` parameter of forwarding actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EgressPort(u16);

impl EgressPort {
    pub const fn new(port: u16) -> Self {
        EgressPort(port)
    }

    pub const fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for EgressPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EgressPort {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u16>()
            .map(EgressPort)
            .map_err(|_| ParseError::InvalidPort(s.to_string()))
    }
}

impl From<u16> for EgressPort {
    fn from(port: u16) -> Self {
        EgressPort(port)
    }
}

//! Wire-level types exchanged with the device.
//!
//! Match keys, action data and digest fields all travel as big-endian byte
//! strings, the way the device runtime encodes them. Helpers convert to and
//! from integers.

use byteorder::{BigEndian, ByteOrder};
use std::collections::BTreeMap;
use std::fmt;

/// Reads a big-endian unsigned integer of 1..=8 bytes.
///
/// Returns `None` for an empty or oversized value.
pub fn be_uint(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() || bytes.len() > 8 {
        return None;
    }
    Some(BigEndian::read_uint(bytes, bytes.len()))
}

fn be_bytes(value: u64, width: usize) -> Vec<u8> {
    let mut buf = vec![0u8; width];
    BigEndian::write_uint(&mut buf, value, width);
    buf
}

/// A table resolved against the program loaded on the device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableHandle {
    name: String,
    id: u32,
}

impl TableHandle {
    pub fn new(name: impl Into<String>, id: u32) -> Self {
        Self {
            name: name.into(),
            id,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u32 {
        self.id
    }
}

impl fmt::Display for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:#x})", self.name, self.id)
    }
}

/// Exact-match key field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyField {
    pub name: String,
    pub value: Vec<u8>,
}

impl KeyField {
    pub fn exact(name: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// 32-bit exact match (e.g. an IPv4 address).
    pub fn exact_u32(name: impl Into<String>, value: u32) -> Self {
        Self::exact(name, be_bytes(value.into(), 4))
    }

    pub fn value_u64(&self) -> Option<u64> {
        be_uint(&self.value)
    }
}

/// Action data field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataField {
    pub name: String,
    pub value: Vec<u8>,
}

impl DataField {
    pub fn new(name: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn u16(name: impl Into<String>, value: u16) -> Self {
        Self::new(name, be_bytes(value.into(), 2))
    }

    pub fn value_u64(&self) -> Option<u64> {
        be_uint(&self.value)
    }
}

/// Digest poll flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollFlags {
    /// Read from hardware rather than the runtime's software shadow.
    pub from_hw: bool,
}

impl Default for PollFlags {
    fn default() -> Self {
        Self { from_hw: true }
    }
}

/// Identity the controller presents when opening a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientIdentity {
    pub client_id: u32,
    pub device_id: u32,
    /// Pipe scope for table operations (`0xffff` = all pipes).
    pub pipe_id: u16,
}

/// One digest as delivered by the device: named big-endian fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawDigestEntry {
    fields: BTreeMap<String, Vec<u8>>,
}

impl RawDigestEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Vec<u8>) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn with_u32(self, name: impl Into<String>, value: u32) -> Self {
        self.with_field(name, be_bytes(value.into(), 4))
    }

    pub fn field(&self, name: &str) -> Option<&[u8]> {
        self.fields.get(name).map(Vec::as_slice)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

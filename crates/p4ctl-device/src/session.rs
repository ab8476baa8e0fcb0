//! Device session traits.
//!
//! A [`Connector`] opens sessions; a [`DeviceSession`] resolves tables, writes
//! entries and drains digests. Components receive the session as
//! `Arc<dyn DeviceSession>` so tests can substitute the simulator.

use crate::error::DeviceResult;
use crate::types::{ClientIdentity, DataField, KeyField, PollFlags, RawDigestEntry, TableHandle};
use async_trait::async_trait;
use std::sync::Arc;

/// Opens sessions to a device's control interface.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connects to `address` (`host:port`) as `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Connection`](crate::DeviceError::Connection) when
    /// the interface cannot be reached.
    async fn connect(
        &self,
        address: &str,
        identity: ClientIdentity,
    ) -> DeviceResult<Arc<dyn DeviceSession>>;
}

/// Operations the controller needs from an open session.
///
/// Writes are assumed safe for sequential use from one task; concurrent
/// writers need external synchronization.
#[async_trait]
pub trait DeviceSession: Send + Sync {
    /// Looks up a table in the loaded program.
    async fn resolve_table(&self, name: &str) -> DeviceResult<TableHandle>;

    /// Writes the entry `key -> action(params)` to `table`, replacing any
    /// entry with the same key.
    async fn table_write(
        &self,
        table: &TableHandle,
        key: &[KeyField],
        action: &str,
        params: &[DataField],
    ) -> DeviceResult<()>;

    /// Returns the digests pending on `table`.
    ///
    /// Does not block for long; an empty batch means nothing is pending.
    async fn poll_digests(
        &self,
        table: &TableHandle,
        flags: PollFlags,
    ) -> DeviceResult<Vec<RawDigestEntry>>;

    /// Enables digest delivery for `table`. Called once at startup.
    async fn trigger_sync(&self, table: &TableHandle) -> DeviceResult<()>;
}

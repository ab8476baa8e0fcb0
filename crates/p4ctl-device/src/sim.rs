//! In-process simulated device.
//!
//! [`SimDevice`] implements [`DeviceSession`] over in-memory tables and a
//! digest queue. It is the backend `digestd` runs against when no hardware
//! is attached, and the fake session used throughout the tests.
//!
//! When built with a [`SimPipeline`], [`SimDevice::inject_packet`] models the
//! recirculation program: a source matching a recirculate entry is
//! recirculated and reported through a digest carrying its pass count; a
//! source matching a forward entry is sent straight out of the configured port.

use crate::error::{DeviceError, DeviceResult};
use crate::session::{Connector, DeviceSession};
use crate::types::{ClientIdentity, DataField, KeyField, PollFlags, RawDigestEntry, TableHandle};
use async_trait::async_trait;
use p4ctl_types::{EgressPort, FlowIdentity};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace};

/// Table and field names of the simulated forwarding program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimPipeline {
    pub match_table: String,
    pub match_field: String,
    pub recirculate_action: String,
    pub forward_action: String,
    pub port_field: String,
    pub digest_table: String,
}

impl Default for SimPipeline {
    fn default() -> Self {
        Self {
            match_table: "Ingress.my_table".to_string(),
            match_field: "hdr.ipv4.src_addr".to_string(),
            recirculate_action: "Ingress.recirculate".to_string(),
            forward_action: "Ingress.forward".to_string(),
            port_field: "port".to_string(),
            digest_table: "pipe.Ingress.digest".to_string(),
        }
    }
}

/// What the simulated data plane did with an injected packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketFate {
    /// Sent around the slow path; a digest was emitted if sync is enabled.
    Recirculated { pass_count: u32 },
    /// Matched a direct-forward entry.
    Forwarded { port: EgressPort },
    /// No matching entry.
    Dropped,
}

/// A table entry as the device received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenEntry {
    pub table: String,
    pub key: Vec<KeyField>,
    pub action: String,
    pub params: Vec<DataField>,
}

#[derive(Debug, Default)]
struct SimState {
    tables: BTreeMap<String, u32>,
    entries: Vec<WrittenEntry>,
    accepted: Vec<WrittenEntry>,
    attempts: Vec<WrittenEntry>,
    synced: HashSet<String>,
    digest_queue: VecDeque<Vec<RawDigestEntry>>,
    write_faults: Vec<KeyField>,
    failing_polls: u32,
    recirculations: HashMap<FlowIdentity, u32>,
    forwarded: HashMap<FlowIdentity, u64>,
    dropped_digests: u64,
    session_identity: Option<ClientIdentity>,
}

impl SimState {
    fn lookup(&self, table: &str, field: &str, value: &[u8]) -> Option<&WrittenEntry> {
        self.entries.iter().find(|e| {
            e.table == table && e.key.iter().any(|k| k.name == field && k.value == value)
        })
    }
}

/// Builder for [`SimDevice`].
#[derive(Debug, Default)]
pub struct SimDeviceBuilder {
    tables: Vec<String>,
    pipeline: Option<SimPipeline>,
}

impl SimDeviceBuilder {
    /// Declares a table in the loaded program.
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.tables.push(name.into());
        self
    }

    /// Installs the recirculation program; declares its match and digest tables.
    pub fn pipeline(mut self, pipeline: SimPipeline) -> Self {
        self.tables.push(pipeline.match_table.clone());
        self.tables.push(pipeline.digest_table.clone());
        self.pipeline = Some(pipeline);
        self
    }

    pub fn build(self) -> SimDevice {
        let mut state = SimState::default();
        for name in self.tables {
            let next_id = 0x100 + state.tables.len() as u32;
            state.tables.entry(name).or_insert(next_id);
        }
        SimDevice {
            state: Arc::new(Mutex::new(state)),
            pipeline: self.pipeline.map(Arc::new),
        }
    }
}

/// Simulated device. Clones share the same state.
#[derive(Debug, Clone)]
pub struct SimDevice {
    state: Arc<Mutex<SimState>>,
    pipeline: Option<Arc<SimPipeline>>,
}

impl SimDevice {
    pub fn builder() -> SimDeviceBuilder {
        SimDeviceBuilder::default()
    }

    /// A device running the default recirculation program.
    pub fn with_default_pipeline() -> Self {
        Self::builder().pipeline(SimPipeline::default()).build()
    }

    /// Queues one digest batch for the next poll.
    pub fn push_digests(&self, batch: Vec<RawDigestEntry>) {
        self.state.lock().digest_queue.push_back(batch);
    }

    pub fn pending_batches(&self) -> usize {
        self.state.lock().digest_queue.len()
    }

    /// Makes every write whose key contains `field` fail.
    pub fn fail_writes_for(&self, field: KeyField) {
        self.state.lock().write_faults.push(field);
    }

    pub fn clear_write_faults(&self) {
        self.state.lock().write_faults.clear();
    }

    /// Makes the next `count` polls fail.
    pub fn fail_next_polls(&self, count: u32) {
        self.state.lock().failing_polls = count;
    }

    /// Writes accepted by the device, in order.
    pub fn writes(&self) -> Vec<WrittenEntry> {
        self.state.lock().accepted.clone()
    }

    /// Current contents of `table`.
    pub fn entries(&self, table: &str) -> Vec<WrittenEntry> {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|e| e.table == table)
            .cloned()
            .collect()
    }

    /// Every write the device received, accepted or not.
    pub fn write_attempts(&self) -> Vec<WrittenEntry> {
        self.state.lock().attempts.clone()
    }

    pub fn is_synced(&self, table: &str) -> bool {
        self.state.lock().synced.contains(table)
    }

    pub fn forwarded_count(&self, src: FlowIdentity) -> u64 {
        self.state.lock().forwarded.get(&src).copied().unwrap_or(0)
    }

    /// Digests lost because sync was not enabled.
    pub fn dropped_digests(&self) -> u64 {
        self.state.lock().dropped_digests
    }

    /// Identity presented by the most recent session.
    pub fn session_identity(&self) -> Option<ClientIdentity> {
        self.state.lock().session_identity
    }

    /// Runs one packet through the simulated program.
    ///
    /// Without a pipeline every packet is dropped.
    pub fn inject_packet(&self, src: FlowIdentity, dst: FlowIdentity) -> PacketFate {
        let Some(pipeline) = self.pipeline.as_deref() else {
            return PacketFate::Dropped;
        };

        let mut state = self.state.lock();
        let src_bytes = src.octets();
        let (action, port_value) = match state.lookup(
            &pipeline.match_table,
            &pipeline.match_field,
            &src_bytes,
        ) {
            Some(entry) => (
                entry.action.clone(),
                entry
                    .params
                    .iter()
                    .find(|p| p.name == pipeline.port_field)
                    .and_then(DataField::value_u64),
            ),
            None => return PacketFate::Dropped,
        };

        if action == pipeline.recirculate_action {
            let pass_count = {
                let count = state.recirculations.entry(src).or_insert(0);
                *count += 1;
                *count
            };
            if state.synced.contains(&pipeline.digest_table) {
                state.digest_queue.push_back(vec![RawDigestEntry::new()
                    .with_u32("src_ip", src.raw())
                    .with_u32("dst_ip", dst.raw())
                    .with_u32("pass_count", pass_count)]);
            } else {
                state.dropped_digests += 1;
            }
            trace!(%src, %dst, pass_count, "sim: packet recirculated");
            PacketFate::Recirculated { pass_count }
        } else if action == pipeline.forward_action {
            let Some(port) = port_value.and_then(|v| u16::try_from(v).ok()) else {
                trace!(%src, %dst, "sim: forward entry without a valid port, dropped");
                return PacketFate::Dropped;
            };
            let port = EgressPort::new(port);
            *state.forwarded.entry(src).or_insert(0) += 1;
            trace!(%src, %dst, %port, "sim: packet forwarded");
            PacketFate::Forwarded { port }
        } else {
            PacketFate::Dropped
        }
    }
}

#[async_trait]
impl DeviceSession for SimDevice {
    async fn resolve_table(&self, name: &str) -> DeviceResult<TableHandle> {
        let state = self.state.lock();
        state
            .tables
            .get(name)
            .map(|id| TableHandle::new(name, *id))
            .ok_or_else(|| DeviceError::not_found(name))
    }

    async fn table_write(
        &self,
        table: &TableHandle,
        key: &[KeyField],
        action: &str,
        params: &[DataField],
    ) -> DeviceResult<()> {
        let mut state = self.state.lock();
        let entry = WrittenEntry {
            table: table.name().to_string(),
            key: key.to_vec(),
            action: action.to_string(),
            params: params.to_vec(),
        };
        state.attempts.push(entry.clone());

        if !state.tables.contains_key(table.name()) {
            return Err(DeviceError::write(table.name(), "unknown table"));
        }
        if key.iter().any(|k| state.write_faults.contains(k)) {
            return Err(DeviceError::write(table.name(), "injected fault"));
        }

        state.accepted.push(entry.clone());
        let existing = state
            .entries
            .iter()
            .position(|e| e.table == entry.table && e.key == entry.key);
        match existing {
            Some(idx) => {
                debug!(table = %table, action, "sim: entry modified");
                state.entries[idx] = entry;
            }
            None => {
                debug!(table = %table, action, "sim: entry added");
                state.entries.push(entry);
            }
        }
        Ok(())
    }

    async fn poll_digests(
        &self,
        table: &TableHandle,
        _flags: PollFlags,
    ) -> DeviceResult<Vec<RawDigestEntry>> {
        let mut state = self.state.lock();
        if !state.tables.contains_key(table.name()) {
            return Err(DeviceError::poll(table.name(), "unknown table"));
        }
        if state.failing_polls > 0 {
            state.failing_polls -= 1;
            return Err(DeviceError::poll(table.name(), "injected fault"));
        }
        if !state.synced.contains(table.name()) {
            return Err(DeviceError::poll(table.name(), "digest sync not enabled"));
        }
        Ok(state.digest_queue.pop_front().unwrap_or_default())
    }

    async fn trigger_sync(&self, table: &TableHandle) -> DeviceResult<()> {
        let mut state = self.state.lock();
        if !state.tables.contains_key(table.name()) {
            return Err(DeviceError::sync(table.name(), "unknown table"));
        }
        state.synced.insert(table.name().to_string());
        debug!(table = %table, "sim: digest sync enabled");
        Ok(())
    }
}

/// Hands out sessions to a [`SimDevice`].
#[derive(Debug, Clone)]
pub struct SimConnector {
    device: SimDevice,
    reachable: bool,
}

impl SimConnector {
    pub fn new(device: SimDevice) -> Self {
        Self {
            device,
            reachable: true,
        }
    }

    /// A connector whose device never answers.
    pub fn unreachable(device: SimDevice) -> Self {
        Self {
            device,
            reachable: false,
        }
    }
}

#[async_trait]
impl Connector for SimConnector {
    async fn connect(
        &self,
        address: &str,
        identity: ClientIdentity,
    ) -> DeviceResult<Arc<dyn DeviceSession>> {
        let valid = address
            .rsplit_once(':')
            .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
        if !valid {
            return Err(DeviceError::connection(address, "expected host:port"));
        }
        if !self.reachable {
            return Err(DeviceError::connection(address, "connection refused"));
        }

        debug!(
            address,
            client_id = identity.client_id,
            device_id = identity.device_id,
            pipe_id = identity.pipe_id,
            "sim: session opened"
        );
        self.device.state.lock().session_identity = Some(identity);
        Ok(Arc::new(self.device.clone()))
    }
}

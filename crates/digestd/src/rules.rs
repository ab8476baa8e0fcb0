//! Translation of rule intents into device table writes.

use crate::config::TableConfig;
use crate::types::{RuleAction, RuleIntent};
use p4ctl_device::{DataField, DeviceResult, DeviceSession, KeyField, TableHandle};
use p4ctl_types::{EgressPort, FlowIdentity};
use std::sync::Arc;

/// Writes [`RuleIntent`]s to the forwarding table.
///
/// Holds the session and the resolved table handle; clones share both.
#[derive(Clone)]
pub struct RuleWriter {
    session: Arc<dyn DeviceSession>,
    table: TableHandle,
    layout: TableConfig,
}

impl RuleWriter {
    pub fn new(session: Arc<dyn DeviceSession>, table: TableHandle, layout: TableConfig) -> Self {
        Self {
            session,
            table,
            layout,
        }
    }

    pub fn table(&self) -> &TableHandle {
        &self.table
    }

    pub fn recirculate(&self, id: FlowIdentity) -> RuleIntent {
        RuleIntent::recirculate(self.table.name(), id)
    }

    pub fn direct_forward(&self, id: FlowIdentity, port: EgressPort) -> RuleIntent {
        RuleIntent::direct_forward(self.table.name(), id, port)
    }

    /// Issues the table write for `intent`.
    pub async fn apply(&self, intent: &RuleIntent) -> DeviceResult<()> {
        let key = [KeyField::exact_u32(
            self.layout.match_field.as_str(),
            intent.match_key.raw(),
        )];
        let (action, params) = match intent.action {
            RuleAction::Recirculate => (self.layout.recirculate_action.as_str(), Vec::new()),
            RuleAction::DirectForward { port } => (
                self.layout.forward_action.as_str(),
                vec![DataField::u16(self.layout.port_field.as_str(), port.as_u16())],
            ),
        };

        self.session
            .table_write(&self.table, &key, action, &params)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p4ctl_device::SimDevice;
    use pretty_assertions::assert_eq;

    async fn writer(device: &SimDevice) -> RuleWriter {
        let layout = TableConfig::default();
        let table = device.resolve_table(&layout.forward_table).await.unwrap();
        RuleWriter::new(Arc::new(device.clone()), table, layout)
    }

    #[tokio::test]
    async fn test_apply_recirculate() {
        let device = SimDevice::with_default_pipeline();
        let writer = writer(&device).await;

        let intent = writer.recirculate(FlowIdentity::new(10, 0, 0, 1));
        writer.apply(&intent).await.unwrap();

        let writes = device.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].table, "Ingress.my_table");
        assert_eq!(writes[0].action, "Ingress.recirculate");
        assert_eq!(writes[0].key, vec![KeyField::exact_u32("hdr.ipv4.src_addr", 0x0a00_0001)]);
        assert!(writes[0].params.is_empty());
    }

    #[tokio::test]
    async fn test_apply_direct_forward() {
        let device = SimDevice::with_default_pipeline();
        let writer = writer(&device).await;

        let intent = writer.direct_forward(FlowIdentity::new(10, 0, 0, 1), EgressPort::new(2));
        writer.apply(&intent).await.unwrap();

        let writes = device.writes();
        assert_eq!(writes[0].action, "Ingress.forward");
        assert_eq!(writes[0].params, vec![DataField::u16("port", 2)]);
    }
}

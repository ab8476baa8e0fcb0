//! Reactive promotion policy
//!
//! A flow that has recirculated at least `threshold` times is promoted from
//! the slow path to a direct-forward rule. Promotion is admitted by
//! [`FlowStateStore::try_mark_installed`], so at most one direct-forward write
//! is ever issued per flow.

use crate::config::PolicyConfig;
use crate::flow_state::FlowStateStore;
use crate::metrics::MetricsCollector;
use crate::rules::RuleWriter;
use crate::types::{DigestRecord, RuleIntent};
use std::sync::Arc;
use tracing::{error, info};

/// What the policy did with a digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyOutcome {
    /// Pass count below the threshold
    BelowThreshold,
    /// A direct-forward rule was already issued for the flow
    AlreadyInstalled,
    Installed(RuleIntent),
    /// The write was rejected; the flow stays marked and is not retried
    InstallFailed(RuleIntent),
}

pub struct PolicyEngine {
    store: Arc<FlowStateStore>,
    writer: RuleWriter,
    config: PolicyConfig,
    metrics: MetricsCollector,
}

impl PolicyEngine {
    pub fn new(
        store: Arc<FlowStateStore>,
        writer: RuleWriter,
        config: PolicyConfig,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            store,
            writer,
            config,
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<FlowStateStore> {
        &self.store
    }

    pub async fn on_digest(&self, record: &DigestRecord) -> PolicyOutcome {
        let observation = self.store.record_observation(record.src, record.observed_count);
        if observation.evicted.is_some() {
            self.metrics.record_eviction();
        }
        if observation.created || observation.evicted.is_some() {
            self.metrics.set_flows_tracked(self.store.len());
        }

        if record.observed_count < self.config.threshold {
            return PolicyOutcome::BelowThreshold;
        }
        if !self.store.try_mark_installed(record.src) {
            return PolicyOutcome::AlreadyInstalled;
        }

        let intent = self.writer.direct_forward(record.src, self.config.forward_port);
        info!(
            src = %record.src,
            pass_count = record.observed_count,
            port = %self.config.forward_port,
            "digestd: Installing direct rule"
        );

        match self.writer.apply(&intent).await {
            Ok(()) => {
                info!(src = %record.src, "digestd: Rule installed");
                self.metrics.record_rule_installed(intent.action.kind());
                PolicyOutcome::Installed(intent)
            }
            Err(e) => {
                error!(src = %record.src, error = %e, "digestd: Error installing rule");
                self.metrics.record_rule_failure(intent.action.kind());
                PolicyOutcome::InstallFailed(intent)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableConfig;
    use crate::types::FlowPhase;
    use p4ctl_device::{DeviceSession, KeyField, SimDevice};
    use p4ctl_types::{EgressPort, FlowIdentity};
    use pretty_assertions::assert_eq;

    const SRC: FlowIdentity = FlowIdentity::new(10, 0, 0, 1);
    const DST: FlowIdentity = FlowIdentity::new(8, 8, 8, 8);

    async fn engine(device: &SimDevice, threshold: u32) -> PolicyEngine {
        let layout = TableConfig::default();
        let table = device.resolve_table(&layout.forward_table).await.unwrap();
        let writer = RuleWriter::new(Arc::new(device.clone()), table, layout);
        let config = PolicyConfig {
            threshold,
            forward_port: EgressPort::new(2),
        };
        PolicyEngine::new(
            Arc::new(FlowStateStore::unbounded()),
            writer,
            config,
            MetricsCollector::new().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_below_threshold_issues_nothing() {
        let device = SimDevice::with_default_pipeline();
        let policy = engine(&device, 1).await;

        let outcome = policy.on_digest(&DigestRecord::new(SRC, DST, 0)).await;
        assert_eq!(outcome, PolicyOutcome::BelowThreshold);
        assert!(device.writes().is_empty());
        assert_eq!(policy.store().phase(SRC), FlowPhase::Recirculating);
    }

    #[tokio::test]
    async fn test_promotes_once() {
        let device = SimDevice::with_default_pipeline();
        let policy = engine(&device, 1).await;

        let outcome = policy.on_digest(&DigestRecord::new(SRC, DST, 1)).await;
        assert_eq!(
            outcome,
            PolicyOutcome::Installed(RuleIntent::direct_forward(
                "Ingress.my_table",
                SRC,
                EgressPort::new(2)
            ))
        );

        let outcome = policy.on_digest(&DigestRecord::new(SRC, DST, 2)).await;
        assert_eq!(outcome, PolicyOutcome::AlreadyInstalled);

        let writes = device.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].action, "Ingress.forward");
        assert_eq!(policy.store().get(SRC).unwrap().last_observed_count, 2);
        assert_eq!(policy.metrics.rules_installed("direct_forward"), 1);
    }

    #[tokio::test]
    async fn test_threshold_zero_promotes_on_first_digest() {
        let device = SimDevice::with_default_pipeline();
        let policy = engine(&device, 0).await;

        let outcome = policy.on_digest(&DigestRecord::new(SRC, DST, 0)).await;
        assert!(matches!(outcome, PolicyOutcome::Installed(_)));
    }

    #[tokio::test]
    async fn test_higher_threshold_waits() {
        let device = SimDevice::with_default_pipeline();
        let policy = engine(&device, 2).await;

        assert_eq!(
            policy.on_digest(&DigestRecord::new(SRC, DST, 1)).await,
            PolicyOutcome::BelowThreshold
        );
        assert!(matches!(
            policy.on_digest(&DigestRecord::new(SRC, DST, 2)).await,
            PolicyOutcome::Installed(_)
        ));
        assert_eq!(device.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_is_not_retried() {
        let device = SimDevice::with_default_pipeline();
        device.fail_writes_for(KeyField::exact_u32("hdr.ipv4.src_addr", SRC.raw()));
        let policy = engine(&device, 1).await;

        let outcome = policy.on_digest(&DigestRecord::new(SRC, DST, 1)).await;
        assert!(matches!(outcome, PolicyOutcome::InstallFailed(_)));
        assert_eq!(policy.store().phase(SRC), FlowPhase::DirectForwardInstalled);

        device.clear_write_faults();
        let outcome = policy.on_digest(&DigestRecord::new(SRC, DST, 3)).await;
        assert_eq!(outcome, PolicyOutcome::AlreadyInstalled);
        assert_eq!(device.write_attempts().len(), 1);
        assert_eq!(policy.metrics.rule_failures("direct_forward"), 1);
    }
}

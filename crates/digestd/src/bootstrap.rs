//! Startup recirculate rules

use crate::metrics::MetricsCollector;
use crate::rules::RuleWriter;
use p4ctl_device::DeviceError;
use p4ctl_types::FlowIdentity;
use tracing::{error, info};

/// Outcome of a bootstrap run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub installed: Vec<FlowIdentity>,
    pub failed: Vec<(FlowIdentity, DeviceError)>,
}

impl BootstrapReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Installs a recirculate rule for each configured flow so the data plane
/// starts reporting digests for it.
pub struct BootstrapInstaller {
    writer: RuleWriter,
    metrics: MetricsCollector,
}

impl BootstrapInstaller {
    pub fn new(writer: RuleWriter, metrics: MetricsCollector) -> Self {
        Self { writer, metrics }
    }

    /// Attempts every flow in order; a failure does not stop the rest.
    pub async fn install(&self, flows: &[FlowIdentity]) -> BootstrapReport {
        let mut report = BootstrapReport::default();

        for &id in flows {
            let intent = self.writer.recirculate(id);
            match self.writer.apply(&intent).await {
                Ok(()) => {
                    info!(
                        src = %id,
                        table = %self.writer.table(),
                        "digestd: Installed recirculate rule"
                    );
                    self.metrics.record_rule_installed(intent.action.kind());
                    report.installed.push(id);
                }
                Err(e) => {
                    error!(src = %id, error = %e, "digestd: Failed to install recirculate rule");
                    self.metrics.record_rule_failure(intent.action.kind());
                    report.failed.push((id, e));
                }
            }
        }

        info!(
            installed = report.installed.len(),
            failed = report.failed.len(),
            "digestd: Bootstrap complete"
        );
        report
    }
}

//! Controller startup and lifecycle
//!
//! [`Controller::start`] runs the startup sequence in order: bind the metrics
//! endpoint, connect, resolve both tables, enable digest delivery, install the
//! bootstrap rules and spawn the listener task. Any failure before the
//! listener is spawned is fatal and returned to the caller.

use crate::bootstrap::{BootstrapInstaller, BootstrapReport};
use crate::config::DigestdConfig;
use crate::error::{DigestdError, Result};
use crate::flow_state::FlowStateStore;
use crate::listener::DigestListener;
use crate::metrics::MetricsCollector;
use crate::metrics_server::MetricsServer;
use crate::policy::PolicyEngine;
use crate::rules::RuleWriter;
use p4ctl_device::Connector;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct Controller;

impl Controller {
    pub async fn start(
        config: &DigestdConfig,
        connector: &dyn Connector,
    ) -> Result<ControllerHandle> {
        let metrics = MetricsCollector::new()?;
        let metrics_server = if config.metrics.enabled {
            Some(MetricsServer::bind(config.metrics.listen_addr, metrics.clone()).await?)
        } else {
            None
        };

        info!(
            address = %config.device.address,
            client_id = config.device.client_id,
            device_id = config.device.device_id,
            pipe_id = config.device.pipe_id,
            "digestd: Connecting to device"
        );
        let session = connector
            .connect(&config.device.address, config.device.identity())
            .await?;

        let forward_table = session.resolve_table(&config.tables.forward_table).await?;
        let digest_table = session.resolve_table(&config.tables.digest_table).await?;
        info!(
            forward = %forward_table,
            digest = %digest_table,
            "digestd: Resolved tables"
        );

        session.trigger_sync(&digest_table).await?;

        let flow_state = Arc::new(FlowStateStore::new(config.flow_state.capacity()));
        let writer = RuleWriter::new(session.clone(), forward_table, config.tables.clone());

        let bootstrap = BootstrapInstaller::new(writer.clone(), metrics.clone())
            .install(&config.bootstrap.flows)
            .await;

        let policy = PolicyEngine::new(
            flow_state.clone(),
            writer,
            config.policy.clone(),
            metrics.clone(),
        );
        let listener = DigestListener::new(
            session,
            digest_table,
            policy,
            config.listener.clone(),
            metrics.clone(),
        );

        let shutdown = CancellationToken::new();
        let (metrics_addr, metrics_task) = match metrics_server {
            Some(server) => {
                let addr = server.local_addr()?;
                (Some(addr), Some(tokio::spawn(server.serve(shutdown.clone()))))
            }
            None => (None, None),
        };
        let task = tokio::spawn(listener.run(shutdown.clone()));

        Ok(ControllerHandle {
            flow_state,
            metrics,
            metrics_addr,
            bootstrap,
            shutdown,
            task,
            metrics_task,
        })
    }
}

/// Handle to a running controller
pub struct ControllerHandle {
    flow_state: Arc<FlowStateStore>,
    metrics: MetricsCollector,
    metrics_addr: Option<SocketAddr>,
    bootstrap: BootstrapReport,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
    metrics_task: Option<JoinHandle<Result<()>>>,
}

impl ControllerHandle {
    pub fn flow_state(&self) -> &Arc<FlowStateStore> {
        &self.flow_state
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Bound address of the `/metrics` endpoint, if enabled
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_addr
    }

    pub fn bootstrap_report(&self) -> &BootstrapReport {
        &self.bootstrap
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Cancels the listener and the metrics endpoint and waits for both.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown.cancel();
        self.task
            .await
            .map_err(|e| DigestdError::Listener(e.to_string()))?;

        if let Some(task) = self.metrics_task {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "digestd: Metrics server failed"),
                Err(e) => warn!(error = %e, "digestd: Metrics server task aborted"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p4ctl_device::{SimConnector, SimDevice};

    fn local_config() -> DigestdConfig {
        let mut config = DigestdConfig::default();
        config.metrics.listen_addr = "127.0.0.1:0".parse().unwrap();
        config
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let device = SimDevice::with_default_pipeline();
        let connector = SimConnector::new(device.clone());

        let handle = Controller::start(&local_config(), &connector)
            .await
            .unwrap();
        assert!(handle.is_running());
        assert!(handle.metrics_addr().is_some());
        assert!(handle.bootstrap_report().is_complete());
        assert!(device.is_synced("pipe.Ingress.digest"));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_fails_on_unknown_table() {
        let device = SimDevice::builder().table("Ingress.my_table").build();
        let connector = SimConnector::new(device);

        let result = Controller::start(&local_config(), &connector).await;
        assert!(matches!(result, Err(DigestdError::Device(_))));
    }

    #[tokio::test]
    async fn test_metrics_endpoint_disabled() {
        let mut config = local_config();
        config.metrics.enabled = false;
        let connector = SimConnector::new(SimDevice::with_default_pipeline());

        let handle = Controller::start(&config, &connector).await.unwrap();
        assert_eq!(handle.metrics_addr(), None);
        handle.shutdown().await.unwrap();
    }
}

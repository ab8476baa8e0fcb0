//! Configuration file support for digestd
//!
//! Loads and validates digestd configuration from TOML files.
//! Default location: /etc/p4ctl/digestd.toml

use crate::error::{DigestdError, Result};
use p4ctl_device::ClientIdentity;
use p4ctl_types::{EgressPort, FlowIdentity};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};
use std::path::Path;
use std::time::Duration;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/p4ctl/digestd.toml";

/// Device connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Control interface address (host:port)
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default)]
    pub client_id: u32,

    #[serde(default)]
    pub device_id: u32,

    /// Pipe scope for table operations (0xffff = all pipes)
    #[serde(default = "default_pipe_id")]
    pub pipe_id: u16,
}

/// Names of the tables, actions and fields of the loaded program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Exact-match table keyed on the flow source address
    #[serde(default = "default_forward_table")]
    pub forward_table: String,

    /// Digest table the data plane reports flows on
    #[serde(default = "default_digest_table")]
    pub digest_table: String,

    #[serde(default = "default_match_field")]
    pub match_field: String,

    #[serde(default = "default_recirculate_action")]
    pub recirculate_action: String,

    #[serde(default = "default_forward_action")]
    pub forward_action: String,

    /// Action data field carrying the egress port
    #[serde(default = "default_port_field")]
    pub port_field: String,
}

/// Reactive policy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Minimum reported pass count before a flow is promoted
    #[serde(default = "default_threshold")]
    pub threshold: u32,

    /// Egress port of the direct-forward rule
    #[serde(default = "default_forward_port")]
    pub forward_port: EgressPort,
}

/// Digest listener configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Pause after an empty poll, in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Pause after a failed poll, in milliseconds
    #[serde(default = "default_backoff")]
    pub backoff_ms: u64,

    /// Consecutive poll failures before the listener escalates
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Pause between polls while escalated, in milliseconds
    #[serde(default = "default_escalated_backoff")]
    pub escalated_backoff_ms: u64,
}

/// Flow state store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStateConfig {
    /// Maximum tracked flows before eviction (0 = unbounded)
    #[serde(default = "default_max_flows")]
    pub max_flows: usize,
}

/// Startup rule configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Flows that get a recirculate rule at startup
    #[serde(default = "default_bootstrap_flows")]
    pub flows: Vec<FlowIdentity>,
}

/// Prometheus endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Serve `GET /metrics` over HTTP
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    #[serde(default = "default_metrics_listen_addr")]
    pub listen_addr: SocketAddr,
}

/// Complete digestd configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestdConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub tables: TableConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub listener: ListenerConfig,

    #[serde(default)]
    pub flow_state: FlowStateConfig,

    #[serde(default)]
    pub bootstrap: BootstrapConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

// Default functions
fn default_address() -> String {
    "localhost:50052".to_string()
}

fn default_pipe_id() -> u16 {
    0xffff
}

fn default_forward_table() -> String {
    "Ingress.my_table".to_string()
}

fn default_digest_table() -> String {
    "pipe.Ingress.digest".to_string()
}

fn default_match_field() -> String {
    "hdr.ipv4.src_addr".to_string()
}

fn default_recirculate_action() -> String {
    "Ingress.recirculate".to_string()
}

fn default_forward_action() -> String {
    "Ingress.forward".to_string()
}

fn default_port_field() -> String {
    "port".to_string()
}

fn default_threshold() -> u32 {
    1
}

fn default_forward_port() -> EgressPort {
    EgressPort::new(2)
}

fn default_poll_interval() -> u64 {
    100
}

fn default_backoff() -> u64 {
    100
}

fn default_max_consecutive_failures() -> u32 {
    10
}

fn default_escalated_backoff() -> u64 {
    5000
}

fn default_max_flows() -> usize {
    65536
}

fn default_bootstrap_flows() -> Vec<FlowIdentity> {
    vec![
        FlowIdentity::new(10, 0, 0, 1),
        FlowIdentity::new(10, 0, 0, 2),
        FlowIdentity::new(192, 168, 1, 1),
    ]
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen_addr() -> SocketAddr {
    SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::LOCALHOST, 9090, 0, 0))
}

// Default implementations
impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            client_id: 0,
            device_id: 0,
            pipe_id: default_pipe_id(),
        }
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            forward_table: default_forward_table(),
            digest_table: default_digest_table(),
            match_field: default_match_field(),
            recirculate_action: default_recirculate_action(),
            forward_action: default_forward_action(),
            port_field: default_port_field(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            forward_port: default_forward_port(),
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            backoff_ms: default_backoff(),
            max_consecutive_failures: default_max_consecutive_failures(),
            escalated_backoff_ms: default_escalated_backoff(),
        }
    }
}

impl Default for FlowStateConfig {
    fn default() -> Self {
        Self {
            max_flows: default_max_flows(),
        }
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            flows: default_bootstrap_flows(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen_addr: default_metrics_listen_addr(),
        }
    }
}

impl DeviceConfig {
    pub fn identity(&self) -> ClientIdentity {
        ClientIdentity {
            client_id: self.client_id,
            device_id: self.device_id,
            pipe_id: self.pipe_id,
        }
    }
}

impl ListenerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn escalated_backoff(&self) -> Duration {
        Duration::from_millis(self.escalated_backoff_ms)
    }
}

impl FlowStateConfig {
    /// Capacity of the flow state store, `None` when unbounded
    pub fn capacity(&self) -> Option<usize> {
        (self.max_flows > 0).then_some(self.max_flows)
    }
}

impl DigestdConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content).map_err(|e| {
                DigestdError::Config(format!("Failed to parse config file {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %path.display(),
                    "digestd: Config file not found, using defaults"
                );
                Ok(Self::default())
            }
            Err(e) => Err(DigestdError::Io(e)),
        }
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| DigestdError::Config(e.to_string()))
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DigestdError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, content)?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.device.address.is_empty() {
            return Err(DigestdError::Config(
                "device.address must not be empty".to_string(),
            ));
        }

        let names = [
            ("tables.forward_table", &self.tables.forward_table),
            ("tables.digest_table", &self.tables.digest_table),
            ("tables.match_field", &self.tables.match_field),
            ("tables.recirculate_action", &self.tables.recirculate_action),
            ("tables.forward_action", &self.tables.forward_action),
            ("tables.port_field", &self.tables.port_field),
        ];
        for (key, value) in names {
            if value.is_empty() {
                return Err(DigestdError::Config(format!("{} must not be empty", key)));
            }
        }

        if self.tables.recirculate_action == self.tables.forward_action {
            return Err(DigestdError::Config(
                "recirculate_action and forward_action must differ".to_string(),
            ));
        }

        if self.listener.max_consecutive_failures == 0 {
            return Err(DigestdError::Config(
                "listener.max_consecutive_failures must be > 0".to_string(),
            ));
        }

        if self.listener.backoff_ms == 0 || self.listener.escalated_backoff_ms == 0 {
            return Err(DigestdError::Config(
                "listener backoff intervals must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = DigestdConfig::default();
        assert_eq!(config.device.address, "localhost:50052");
        assert_eq!(config.device.pipe_id, 0xffff);
        assert_eq!(config.tables.forward_table, "Ingress.my_table");
        assert_eq!(config.tables.digest_table, "pipe.Ingress.digest");
        assert_eq!(config.policy.threshold, 1);
        assert_eq!(config.policy.forward_port, EgressPort::new(2));
        assert_eq!(config.bootstrap.flows.len(), 3);
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.listen_addr.to_string(), "[::1]:9090");
    }

    #[test]
    fn test_metrics_section() {
        let toml_str = r#"
[metrics]
enabled = false
listen_addr = "127.0.0.1:9100"
"#;
        let config = DigestdConfig::from_toml(toml_str).unwrap();
        assert!(!config.metrics.enabled);
        assert_eq!(config.metrics.listen_addr, "127.0.0.1:9100".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_listener_durations() {
        let config = ListenerConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.backoff(), Duration::from_millis(100));
        assert_eq!(config.escalated_backoff(), Duration::from_secs(5));
    }

    #[test]
    fn test_flow_state_capacity() {
        assert_eq!(FlowStateConfig::default().capacity(), Some(65536));
        assert_eq!(FlowStateConfig { max_flows: 0 }.capacity(), None);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(DigestdConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_failure_bound() {
        let mut config = DigestdConfig::default();
        config.listener.max_consecutive_failures = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_same_actions() {
        let mut config = DigestdConfig::default();
        config.tables.forward_action = config.tables.recirculate_action.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_table_name() {
        let mut config = DigestdConfig::default();
        config.tables.digest_table.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[device]
address = "10.1.1.1:50052"
device_id = 1

[policy]
forward_port = 7

[bootstrap]
flows = ["172.16.0.1"]
"#;
        let config = DigestdConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.device.address, "10.1.1.1:50052");
        assert_eq!(config.device.device_id, 1);
        assert_eq!(config.policy.forward_port, EgressPort::new(7));
        assert_eq!(config.bootstrap.flows, vec![FlowIdentity::new(172, 16, 0, 1)]);
        // Unspecified values should use defaults
        assert_eq!(config.policy.threshold, 1);
        assert_eq!(config.listener.backoff_ms, 100);
    }

    #[test]
    fn test_toml_rejects_bad_flow() {
        let toml_str = r#"
[bootstrap]
flows = ["999.1.1.1"]
"#;
        assert!(matches!(
            DigestdConfig::from_toml(toml_str),
            Err(DigestdError::Config(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("digestd.toml");

        let mut config = DigestdConfig::default();
        config.flow_state.max_flows = 128;
        config.save(&path).unwrap();

        let loaded = DigestdConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = DigestdConfig::load_or_default("/nonexistent/digestd.toml").unwrap();
        assert_eq!(config, DigestdConfig::default());
    }
}

//! Reactive digest controller
//!
//! digestd programs a forwarding table on a programmable switch so that a set
//! of configured flows starts on the slow path (recirculation). The data plane
//! reports each recirculated packet as a digest; once a flow has been reported
//! with a pass count at or above the threshold, digestd installs a
//! direct-forward rule for it, exactly once.
//!
//! # Architecture
//!
//! ```text
//!   startup                         steady state
//!
//!   BootstrapInstaller              DigestListener (tokio task)
//!          |                               | poll digest table
//!          | recirculate                   v
//!          |                         DigestRecord::decode
//!          |                               |
//!          |                               v
//!          |                         PolicyEngine --> FlowStateStore
//!          |                               |          (try_mark_installed)
//!          v                               v direct forward
//!      RuleWriter  ------------------> RuleWriter
//!          |                               |
//!          +-------> forward table <-------+
//! ```

pub mod bootstrap;
pub mod config;
pub mod controller;
pub mod error;
pub mod flow_state;
pub mod listener;
pub mod metrics;
pub mod metrics_server;
pub mod policy;
pub mod rules;
pub mod types;

pub use bootstrap::{BootstrapInstaller, BootstrapReport};
pub use config::{DigestdConfig, DEFAULT_CONFIG_PATH};
pub use controller::{Controller, ControllerHandle};
pub use error::{DigestdError, Result};
pub use flow_state::{FlowStateStore, Observation};
pub use listener::{DigestListener, ListenerHealth, PollStep};
pub use metrics::MetricsCollector;
pub use metrics_server::MetricsServer;
pub use policy::{PolicyEngine, PolicyOutcome};
pub use rules::RuleWriter;
pub use types::{DigestRecord, FlowPhase, FlowState, RuleAction, RuleIntent};

//! Prometheus metrics collection for digestd
//!
//! This is the observability channel for the control loop: digest and
//! decode-failure counts, rule install outcomes per action, poll failures and
//! the listener health state.

use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Health gauge values
pub const HEALTH_HEALTHY: f64 = 1.0;
pub const HEALTH_DEGRADED: f64 = 0.5;
pub const HEALTH_ESCALATED: f64 = 0.0;

/// Prometheus metrics collector for digestd
#[derive(Clone)]
pub struct MetricsCollector {
    digests_received: IntCounter,
    digests_undecodable: IntCounter,
    polls_failed: IntCounter,
    rules_installed: IntCounterVec,
    rule_install_failures: IntCounterVec,
    flows_tracked: IntGauge,
    flows_evicted: IntCounter,
    listener_health: Gauge,

    registry: Arc<Registry>,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let digests_received = IntCounter::new(
            "digestd_digests_received_total",
            "Digests decoded and handed to the policy",
        )?;
        registry.register(Box::new(digests_received.clone()))?;

        let digests_undecodable = IntCounter::new(
            "digestd_digests_undecodable_total",
            "Digest entries dropped because they could not be decoded",
        )?;
        registry.register(Box::new(digests_undecodable.clone()))?;

        let polls_failed = IntCounter::new(
            "digestd_polls_failed_total",
            "Digest polls that returned an error",
        )?;
        registry.register(Box::new(polls_failed.clone()))?;

        let rules_installed = IntCounterVec::new(
            Opts::new("digestd_rules_installed_total", "Rules accepted by the device"),
            &["action"],
        )?;
        registry.register(Box::new(rules_installed.clone()))?;

        let rule_install_failures = IntCounterVec::new(
            Opts::new(
                "digestd_rule_install_failures_total",
                "Rule writes rejected by the device",
            ),
            &["action"],
        )?;
        registry.register(Box::new(rule_install_failures.clone()))?;

        let flows_tracked = IntGauge::new("digestd_flows_tracked", "Flows in the flow state store")?;
        registry.register(Box::new(flows_tracked.clone()))?;

        let flows_evicted = IntCounter::new(
            "digestd_flows_evicted_total",
            "Flows evicted from the flow state store",
        )?;
        registry.register(Box::new(flows_evicted.clone()))?;

        let listener_health = Gauge::new(
            "digestd_listener_health",
            "Digest listener health (1=healthy, 0.5=degraded, 0=escalated)",
        )?;
        listener_health.set(HEALTH_HEALTHY);
        registry.register(Box::new(listener_health.clone()))?;

        Ok(Self {
            digests_received,
            digests_undecodable,
            polls_failed,
            rules_installed,
            rule_install_failures,
            flows_tracked,
            flows_evicted,
            listener_health,
            registry: Arc::new(registry),
        })
    }

    pub fn record_digest(&self) {
        self.digests_received.inc();
    }

    pub fn record_undecodable_digest(&self) {
        self.digests_undecodable.inc();
    }

    pub fn record_poll_failure(&self) {
        self.polls_failed.inc();
    }

    pub fn record_rule_installed(&self, action: &str) {
        self.rules_installed.with_label_values(&[action]).inc();
    }

    pub fn record_rule_failure(&self, action: &str) {
        self.rule_install_failures.with_label_values(&[action]).inc();
    }

    pub fn record_eviction(&self) {
        self.flows_evicted.inc();
    }

    pub fn set_flows_tracked(&self, count: usize) {
        self.flows_tracked.set(count as i64);
    }

    pub fn set_listener_health(&self, value: f64) {
        self.listener_health.set(value);
    }

    pub fn digests_received(&self) -> u64 {
        self.digests_received.get()
    }

    pub fn digests_undecodable(&self) -> u64 {
        self.digests_undecodable.get()
    }

    pub fn polls_failed(&self) -> u64 {
        self.polls_failed.get()
    }

    pub fn rules_installed(&self, action: &str) -> u64 {
        self.rules_installed.with_label_values(&[action]).get()
    }

    pub fn rule_failures(&self, action: &str) -> u64 {
        self.rule_install_failures.with_label_values(&[action]).get()
    }

    pub fn listener_health(&self) -> f64 {
        self.listener_health.get()
    }

    /// Gather metrics in Prometheus text format
    pub fn gather_metrics(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buf = vec![];
        encoder.encode(&self.registry.gather(), &mut buf).ok();
        String::from_utf8(buf).unwrap_or_else(|_| String::from("# Error encoding metrics\n"))
    }
}

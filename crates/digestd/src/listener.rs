//! Digest listener
//!
//! Polls the digest table and feeds each decoded record to the
//! [`PolicyEngine`], strictly in batch order. Poll failures move the listener
//! through an explicit health state machine:
//!
//! ```text
//! Healthy --fail--> Degraded{n} --n reaches max--> Escalated{n}
//!    ^                  |                              |
//!    +------ok----------+-------------ok---------------+
//! ```
//!
//! The loop never exits on its own; only cancellation stops it.

use crate::config::ListenerConfig;
use crate::metrics::{MetricsCollector, HEALTH_DEGRADED, HEALTH_ESCALATED, HEALTH_HEALTHY};
use crate::policy::PolicyEngine;
use crate::types::DigestRecord;
use p4ctl_device::{DeviceError, DeviceSession, PollFlags, TableHandle};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Health of the digest poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenerHealth {
    #[default]
    Healthy,
    Degraded { consecutive_failures: u32 },
    Escalated { consecutive_failures: u32 },
}

impl ListenerHealth {
    pub fn consecutive_failures(&self) -> u32 {
        match self {
            ListenerHealth::Healthy => 0,
            ListenerHealth::Degraded {
                consecutive_failures,
            }
            | ListenerHealth::Escalated {
                consecutive_failures,
            } => *consecutive_failures,
        }
    }

    pub fn is_escalated(&self) -> bool {
        matches!(self, ListenerHealth::Escalated { .. })
    }

    fn gauge_value(&self) -> f64 {
        match self {
            ListenerHealth::Healthy => HEALTH_HEALTHY,
            ListenerHealth::Degraded { .. } => HEALTH_DEGRADED,
            ListenerHealth::Escalated { .. } => HEALTH_ESCALATED,
        }
    }
}

impl fmt::Display for ListenerHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerHealth::Healthy => write!(f, "healthy"),
            ListenerHealth::Degraded {
                consecutive_failures,
            } => write!(f, "degraded ({} failures)", consecutive_failures),
            ListenerHealth::Escalated {
                consecutive_failures,
            } => write!(f, "escalated ({} failures)", consecutive_failures),
        }
    }
}

/// Result of a single poll iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStep {
    /// Empty batch
    Idle,
    /// A batch was handed to the policy
    Dispatched {
        records: usize,
        decode_failures: usize,
    },
    /// The poll failed; wait `backoff` before the next one
    Failed {
        health: ListenerHealth,
        backoff: Duration,
    },
}

pub struct DigestListener {
    session: Arc<dyn DeviceSession>,
    table: TableHandle,
    policy: PolicyEngine,
    config: ListenerConfig,
    metrics: MetricsCollector,
    health: ListenerHealth,
}

impl DigestListener {
    pub fn new(
        session: Arc<dyn DeviceSession>,
        table: TableHandle,
        policy: PolicyEngine,
        config: ListenerConfig,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            session,
            table,
            policy,
            config,
            metrics,
            health: ListenerHealth::Healthy,
        }
    }

    pub fn health(&self) -> ListenerHealth {
        self.health
    }

    /// Polls once and dispatches whatever came back.
    pub async fn poll_once(&mut self) -> PollStep {
        let batch = match self
            .session
            .poll_digests(&self.table, PollFlags::default())
            .await
        {
            Ok(batch) => batch,
            Err(e) => return self.on_poll_failure(&e),
        };
        self.on_poll_success();

        if batch.is_empty() {
            return PollStep::Idle;
        }

        let mut records = 0;
        let mut decode_failures = 0;
        for entry in &batch {
            let record = match DigestRecord::decode(entry) {
                Ok(record) => record,
                Err(e) => {
                    let names: Vec<&str> = entry.field_names().collect();
                    warn!(
                        table = %self.table,
                        fields = ?names,
                        error = %e,
                        "digestd: Dropping undecodable digest"
                    );
                    self.metrics.record_undecodable_digest();
                    decode_failures += 1;
                    continue;
                }
            };

            info!(
                src = %record.src,
                dst = %record.dst,
                pass_count = record.observed_count,
                "digestd: Received digest"
            );
            self.metrics.record_digest();
            self.policy.on_digest(&record).await;
            records += 1;
        }

        PollStep::Dispatched {
            records,
            decode_failures,
        }
    }

    fn on_poll_success(&mut self) {
        let failures = self.health.consecutive_failures();
        if failures > 0 {
            info!(
                table = %self.table,
                failures,
                "digestd: Digest polling recovered"
            );
            self.health = ListenerHealth::Healthy;
            self.metrics.set_listener_health(self.health.gauge_value());
        }
    }

    fn on_poll_failure(&mut self, err: &DeviceError) -> PollStep {
        self.metrics.record_poll_failure();
        let consecutive_failures = self.health.consecutive_failures().saturating_add(1);
        let was_escalated = self.health.is_escalated();

        let (health, backoff) = if consecutive_failures >= self.config.max_consecutive_failures {
            if !was_escalated {
                error!(
                    table = %self.table,
                    failures = consecutive_failures,
                    error = %err,
                    "digestd: Digest polling keeps failing, backing off"
                );
            } else {
                debug!(
                    table = %self.table,
                    failures = consecutive_failures,
                    error = %err,
                    "digestd: Digest poll failed"
                );
            }
            (
                ListenerHealth::Escalated {
                    consecutive_failures,
                },
                self.config.escalated_backoff(),
            )
        } else {
            warn!(
                table = %self.table,
                failures = consecutive_failures,
                error = %err,
                "digestd: Digest poll failed"
            );
            (
                ListenerHealth::Degraded {
                    consecutive_failures,
                },
                self.config.backoff(),
            )
        };

        self.health = health;
        self.metrics.set_listener_health(health.gauge_value());
        PollStep::Failed { health, backoff }
    }

    /// Runs the poll loop until `shutdown` is cancelled.
    ///
    /// A poll that never returns is abandoned on cancellation.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(table = %self.table, "digestd: Digest listener started");

        loop {
            let step = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                step = self.poll_once() => step,
            };

            let pause = match step {
                PollStep::Idle => Some(self.config.poll_interval()),
                PollStep::Dispatched { .. } => None,
                PollStep::Failed { backoff, .. } => Some(backoff),
            };

            match pause {
                Some(pause) => {
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(pause) => {}
                    }
                }
                None => tokio::task::yield_now().await,
            }
        }

        info!(table = %self.table, health = %self.health, "digestd: Digest listener stopped");
    }
}

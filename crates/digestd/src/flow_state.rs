//! Per-flow state store
//!
//! Tracks, per [`FlowIdentity`], the latest reported pass count and whether a
//! direct-forward rule has been issued. [`FlowStateStore::try_mark_installed`]
//! is the only admission point for direct-forward installs.
//!
//! The store is bounded: once `capacity` flows are tracked, inserting a new
//! flow evicts the least-recently-observed flow that has no rule installed.
//! Installed flows are never evicted, so a flow can never be admitted twice.

use crate::types::{FlowPhase, FlowState};
use p4ctl_types::FlowIdentity;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Result of [`FlowStateStore::record_observation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// The flow was not tracked before this call
    pub created: bool,
    /// Flow evicted to make room, if any
    pub evicted: Option<FlowIdentity>,
}

#[derive(Debug)]
struct Slot {
    state: FlowState,
    stamp: u64,
}

#[derive(Debug, Default)]
struct Inner {
    flows: HashMap<FlowIdentity, Slot>,
    /// Recency index over flows without an installed rule
    evictable: BTreeMap<u64, FlowIdentity>,
    clock: u64,
    installed: usize,
}

impl Inner {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn insert(
        &mut self,
        id: FlowIdentity,
        state: FlowState,
        capacity: Option<usize>,
    ) -> Option<FlowIdentity> {
        let mut evicted = None;
        if let Some(cap) = capacity {
            if self.flows.len() >= cap {
                evicted = self.evict_oldest();
                if evicted.is_none() {
                    warn!(
                        capacity = cap,
                        tracked = self.flows.len(),
                        "digestd: flow state full of installed flows, growing past capacity"
                    );
                }
            }
        }

        let stamp = self.tick();
        if state.rule_installed {
            self.installed += 1;
        } else {
            self.evictable.insert(stamp, id);
        }
        self.flows.insert(id, Slot { state, stamp });
        evicted
    }

    fn evict_oldest(&mut self) -> Option<FlowIdentity> {
        let (_, id) = self.evictable.pop_first()?;
        self.flows.remove(&id);
        debug!(src = %id, "digestd: evicted least recently observed flow");
        Some(id)
    }
}

/// Shared flow state, guarded by a single mutex
#[derive(Debug)]
pub struct FlowStateStore {
    inner: Mutex<Inner>,
    capacity: Option<usize>,
}

impl FlowStateStore {
    /// Creates a store; `None` means unbounded.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Records the latest pass count reported for `id`.
    ///
    /// Creates the flow if absent; otherwise overwrites the count (reports
    /// are trusted as-is, not assumed monotonic).
    pub fn record_observation(&self, id: FlowIdentity, count: u32) -> Observation {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let stamp = inner.tick();

        match inner.flows.get_mut(&id) {
            Some(slot) => {
                let previous = slot.stamp;
                slot.state.last_observed_count = count;
                slot.stamp = stamp;
                let installed = slot.state.rule_installed;
                if !installed {
                    inner.evictable.remove(&previous);
                    inner.evictable.insert(stamp, id);
                }
                Observation {
                    created: false,
                    evicted: None,
                }
            }
            None => {
                let state = FlowState {
                    last_observed_count: count,
                    rule_installed: false,
                };
                let evicted = inner.insert(id, state, self.capacity);
                Observation {
                    created: true,
                    evicted,
                }
            }
        }
    }

    /// Claims the direct-forward install for `id`.
    ///
    /// Returns `true` exactly once per flow; every later call, from any
    /// thread, returns `false`.
    pub fn try_mark_installed(&self, id: FlowIdentity) -> bool {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        match inner.flows.get_mut(&id) {
            Some(slot) if slot.state.rule_installed => false,
            Some(slot) => {
                slot.state.rule_installed = true;
                let stamp = slot.stamp;
                inner.evictable.remove(&stamp);
                inner.installed += 1;
                true
            }
            None => {
                let state = FlowState {
                    last_observed_count: 0,
                    rule_installed: true,
                };
                inner.insert(id, state, self.capacity);
                true
            }
        }
    }

    pub fn get(&self, id: FlowIdentity) -> Option<FlowState> {
        self.inner.lock().flows.get(&id).map(|slot| slot.state)
    }

    pub fn phase(&self, id: FlowIdentity) -> FlowPhase {
        match self.get(id) {
            None => FlowPhase::Unseen,
            Some(state) if state.rule_installed => FlowPhase::DirectForwardInstalled,
            Some(_) => FlowPhase::Recirculating,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().flows.is_empty()
    }

    pub fn installed_count(&self) -> usize {
        self.inner.lock().installed
    }
}

impl Default for FlowStateStore {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::thread;

    fn flow(last: u8) -> FlowIdentity {
        FlowIdentity::new(10, 0, 0, last)
    }

    #[test]
    fn test_record_creates_then_updates() {
        let store = FlowStateStore::unbounded();

        let first = store.record_observation(flow(1), 3);
        assert!(first.created);
        assert_eq!(
            store.get(flow(1)),
            Some(FlowState {
                last_observed_count: 3,
                rule_installed: false
            })
        );

        let second = store.record_observation(flow(1), 1);
        assert!(!second.created);
        // Counts are not assumed monotonic
        assert_eq!(store.get(flow(1)).unwrap().last_observed_count, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_try_mark_installed_once() {
        let store = FlowStateStore::unbounded();
        assert!(store.try_mark_installed(flow(1)));
        assert!(!store.try_mark_installed(flow(1)));
        assert!(!store.try_mark_installed(flow(1)));
        assert_eq!(store.installed_count(), 1);
    }

    #[test]
    fn test_try_mark_installed_after_observation() {
        let store = FlowStateStore::unbounded();
        store.record_observation(flow(1), 1);
        assert!(store.try_mark_installed(flow(1)));
        assert!(!store.try_mark_installed(flow(1)));

        let state = store.get(flow(1)).unwrap();
        assert_eq!(state.last_observed_count, 1);
        assert!(state.rule_installed);
    }

    #[test]
    fn test_concurrent_try_mark_installed_single_winner() {
        let store = Arc::new(FlowStateStore::unbounded());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    (0..100)
                        .filter(|_| store.try_mark_installed(flow(7)))
                        .count()
                })
            })
            .collect();

        let winners: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(winners, 1);
        assert_eq!(store.installed_count(), 1);
    }

    #[test]
    fn test_phase_transitions() {
        let store = FlowStateStore::unbounded();
        assert_eq!(store.phase(flow(1)), FlowPhase::Unseen);

        store.record_observation(flow(1), 0);
        assert_eq!(store.phase(flow(1)), FlowPhase::Recirculating);

        store.try_mark_installed(flow(1));
        assert_eq!(store.phase(flow(1)), FlowPhase::DirectForwardInstalled);

        // Terminal
        store.record_observation(flow(1), 0);
        assert_eq!(store.phase(flow(1)), FlowPhase::DirectForwardInstalled);
    }

    #[test]
    fn test_evicts_least_recently_observed() {
        let store = FlowStateStore::new(Some(2));
        store.record_observation(flow(1), 0);
        store.record_observation(flow(2), 0);
        // Refresh flow 1 so flow 2 becomes the oldest
        store.record_observation(flow(1), 0);

        let obs = store.record_observation(flow(3), 0);
        assert_eq!(obs.evicted, Some(flow(2)));
        assert_eq!(store.len(), 2);
        assert_eq!(store.phase(flow(2)), FlowPhase::Unseen);
        assert_eq!(store.phase(flow(1)), FlowPhase::Recirculating);
    }

    #[test]
    fn test_installed_flows_are_pinned() {
        let store = FlowStateStore::new(Some(2));
        store.record_observation(flow(1), 1);
        store.try_mark_installed(flow(1));
        store.record_observation(flow(2), 0);

        let obs = store.record_observation(flow(3), 0);
        assert_eq!(obs.evicted, Some(flow(2)));
        assert_eq!(store.phase(flow(1)), FlowPhase::DirectForwardInstalled);

        // Still admitted only once after churn
        assert!(!store.try_mark_installed(flow(1)));
    }

    #[test]
    fn test_grows_past_capacity_when_all_installed() {
        let store = FlowStateStore::new(Some(1));
        assert!(store.try_mark_installed(flow(1)));

        let obs = store.record_observation(flow(2), 0);
        assert_eq!(obs.evicted, None);
        assert_eq!(store.len(), 2);
    }
}

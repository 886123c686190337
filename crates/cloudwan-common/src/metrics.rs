//! Reconcile counters
//!
//! Lock-free counters bumped by the route reconciler and read by whoever
//! reports on a deployment.

use crate::AtomicCounter;
use serde::{Deserialize, Serialize};

/// Counters for route reconciliation
#[derive(Debug, Default)]
pub struct ReconcileMetrics {
    /// Routes created
    pub routes_created: AtomicCounter,
    /// Routes whose target was replaced
    pub routes_replaced: AtomicCounter,
    /// Routes already pointing at the right target
    pub routes_unchanged: AtomicCounter,
    /// Subnets waiting on a route table or endpoint
    pub subnets_deferred: AtomicCounter,
    /// Subnets in a zone the engine has not placed
    pub subnets_unrouted: AtomicCounter,
    /// Reconcile passes run
    pub passes: AtomicCounter,
}

impl ReconcileMetrics {
    /// Create zeroed counters
    pub const fn new() -> Self {
        Self {
            routes_created: AtomicCounter::new(0),
            routes_replaced: AtomicCounter::new(0),
            routes_unchanged: AtomicCounter::new(0),
            subnets_deferred: AtomicCounter::new(0),
            subnets_unrouted: AtomicCounter::new(0),
            passes: AtomicCounter::new(0),
        }
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> ReconcileSnapshot {
        ReconcileSnapshot {
            routes_created: self.routes_created.get(),
            routes_replaced: self.routes_replaced.get(),
            routes_unchanged: self.routes_unchanged.get(),
            subnets_deferred: self.subnets_deferred.get(),
            subnets_unrouted: self.subnets_unrouted.get(),
            passes: self.passes.get(),
        }
    }
}

/// Counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSnapshot {
    pub routes_created: u64,
    pub routes_replaced: u64,
    pub routes_unchanged: u64,
    pub subnets_deferred: u64,
    pub subnets_unrouted: u64,
    pub passes: u64,
}

impl ReconcileSnapshot {
    /// Routes written by the provider, created or replaced
    pub fn routes_applied(&self) -> u64 {
        self.routes_created + self.routes_replaced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let metrics = ReconcileMetrics::new();
        metrics.routes_created.add(3);
        metrics.routes_replaced.inc();
        metrics.subnets_deferred.inc();

        let snap = metrics.snapshot();
        assert_eq!(snap.routes_applied(), 4);
        assert_eq!(snap.subnets_deferred, 1);
        assert_eq!(snap.subnets_unrouted, 0);
    }
}

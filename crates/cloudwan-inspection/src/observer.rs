//! Reconcile observation

use crate::routing::{RouteOutcome, SkippedSubnet};
use cloudwan_common::RouteBinding;
use tracing::{debug, info, warn};

/// Receives reconciliation events for one or more networks
pub trait ReconcileObserver: Send + Sync {
    /// A route was created, replaced or found already correct
    fn route_applied(&self, _network: &str, _binding: &RouteBinding, _outcome: &RouteOutcome) {}

    /// A subnet was skipped this pass and will be retried on the next input change
    fn subnet_deferred(&self, _network: &str, _skipped: &SkippedSubnet) {}

    /// A subnet was still skipped when reconciliation stopped
    fn subnet_unrouted(&self, _network: &str, _skipped: &SkippedSubnet) {}
}

/// Observer that logs through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ReconcileObserver for TracingObserver {
    fn route_applied(&self, network: &str, binding: &RouteBinding, outcome: &RouteOutcome) {
        match outcome {
            RouteOutcome::Unchanged => debug!(
                network,
                subnet = %binding.subnet,
                destination = %binding.destination,
                "route already in place"
            ),
            RouteOutcome::Created => info!(
                network,
                subnet = %binding.subnet,
                zone = %binding.zone,
                destination = %binding.destination,
                target = %binding.target,
                "route created"
            ),
            RouteOutcome::Replaced { previous } => info!(
                network,
                subnet = %binding.subnet,
                zone = %binding.zone,
                destination = %binding.destination,
                target = %binding.target,
                previous = %previous,
                "route replaced"
            ),
        }
    }

    fn subnet_deferred(&self, network: &str, skipped: &SkippedSubnet) {
        debug!(
            network,
            subnet = %skipped.subnet,
            zone = %skipped.zone,
            reason = skipped.reason.as_str(),
            "subnet deferred"
        );
    }

    fn subnet_unrouted(&self, network: &str, skipped: &SkippedSubnet) {
        warn!(
            network,
            subnet = %skipped.subnet,
            zone = %skipped.zone,
            reason = skipped.reason.as_str(),
            "subnet left without inspected egress"
        );
    }
}

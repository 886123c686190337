//! CloudWAN Common - Shared model for the hub-and-spoke control plane
//!
//! This crate provides the pieces every component agrees on:
//! - Domain primitives (identifiers, references, subnets, route bindings)
//! - The validated topology (hub, segments, member networks, sharing rules)
//! - Error classes
//! - Reconcile counters
//!
//! Nothing here talks to a provider.

#![warn(clippy::all)]

pub mod domain;
pub mod error;
pub mod metrics;
pub mod topology;

pub use domain::*;
pub use error::*;
pub use topology::{
    AttachmentPolicyRule, Hub, MemberNetwork, NetworkKind, RouteInjection, Segment, ShareRule,
    ShareTarget, SubnetLayout, TagCondition, Topology, SEGMENT_TAG_VALUE,
};

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counter
#[derive(Debug, Default)]
pub struct AtomicCounter(AtomicU64);

impl AtomicCounter {
    /// Create new counter
    pub const fn new(value: u64) -> Self {
        Self(AtomicU64::new(value))
    }

    /// Increment and return previous value
    #[inline(always)]
    pub fn inc(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// Add value and return previous
    #[inline(always)]
    pub fn add(&self, val: u64) -> u64 {
        self.0.fetch_add(val, Ordering::Relaxed)
    }

    /// Get current value
    #[inline(always)]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_counter() {
        let counter = AtomicCounter::new(0);
        assert_eq!(counter.inc(), 0);
        assert_eq!(counter.inc(), 1);
        assert_eq!(counter.get(), 2);
    }
}

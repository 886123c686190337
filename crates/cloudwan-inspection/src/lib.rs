//! CloudWAN Inspection - Zone-aware egress through the inspection engine
//!
//! The inspection engine places one enforcement endpoint per availability
//! zone, asynchronously and in no particular order. This crate turns the
//! engine's status into a zone map and keeps every subnet's egress route
//! pointed at the endpoint in its own zone.
//!
//! # Flow
//!
//! ```text
//!  engine status ──► resolve_zone_endpoints ──► NextHops ─┐
//!                                                         ├─► plan ─► RouteTableApi
//!  partitioner ──────────────► subnets ───────────────────┘
//! ```
//!
//! Both inputs arrive on `watch` feeds; [`RouteReconciler::converge`] re-plans
//! on every change until each subnet is routed or the inputs stop changing.

pub mod observer;
pub mod provider;
pub mod routing;
pub mod status;

pub use observer::{ReconcileObserver, TracingObserver};
pub use provider::{InspectionEngine, RouteTableApi};
pub use routing::{
    plan, AppliedRoute, EgressPolicy, NextHops, ReconcileReport, RouteOutcome, RoutePlan,
    RouteReconciler, SkipReason, SkippedSubnet,
};
pub use status::{resolve_zone_endpoints, EngineStatus, SyncAttachment, SyncState, ZoneEndpoints};

//! CloudWAN Orchestrator
//!
//! Deploys a hub-and-spoke WAN from a declarative topology:
//! - Partitions each member network into zone-scoped subnets
//! - Attaches networks to the hub and waits for admission
//! - Converges per-zone egress routes through the inspection engine
//! - Synthesizes and publishes the hub policy once attachments resolve
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                           ORCHESTRATOR                               │
//! │                                                                      │
//! │   Topology ──► one task per member network (JoinSet)                 │
//! │                                                                      │
//! │   ┌────────────┐   ┌──────────────┐   ┌────────────────────────┐     │
//! │   │ Partition  │──►│  Attachment  │──►│ attachment id channel  │──┐  │
//! │   │  network   │   │ coordinator  │   └────────────────────────┘  │  │
//! │   └─────┬──────┘   └──────────────┘                               │  │
//! │         │ subnets (watch)                                         ▼  │
//! │         ▼                                           ┌────────────────┐│
//! │   ┌────────────┐   next hops (watch)                │    Policy      ││
//! │   │   Route    │◄── engine status / hub ARN         │ synthesis and  ││
//! │   │ reconciler │                                    │   publishing   ││
//! │   └────────────┘                                    └────────────────┘│
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

#![warn(clippy::all)]

pub mod attachment;
pub mod config;
pub mod orchestrator;
pub mod policy;
pub mod provider;
pub mod simulated;

pub use attachment::{Attachment, AttachmentCoordinator};
pub use config::{load_topology, parse_topology, OrchestratorConfig, TopologyFormat};
pub use orchestrator::{DeploymentReport, Failure, NetworkReport, Orchestrator, PolicyReport};
pub use policy::{synthesize, PolicyDocument, PolicyPublisher, PublishedPolicy, ResolvedAttachments};
pub use provider::{
    AdmissionState, AttachmentApi, AttachmentRequest, CloudApis, HubIdentity, HubPolicyApi,
    NetworkPartitioner, PartitionRequest, PartitionedNetwork, PolicyVerdict,
};
pub use simulated::{SimulatedCloud, SimulationSettings};

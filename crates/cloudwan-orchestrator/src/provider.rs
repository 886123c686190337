//! Cloud collaborator interfaces
//!
//! Everything the orchestrator needs from a provider, reduced to the calls
//! the control plane actually makes. A real backend implements these against
//! provider APIs; [`crate::simulated::SimulatedCloud`] implements them in memory.

use async_trait::async_trait;
use cloudwan_common::{
    AccountId, AttachmentId, HubId, ProvisionResult, Region, ResourceArn, Subnet, SubnetLayout,
    VpcId,
};
use cloudwan_inspection::{InspectionEngine, RouteTableApi};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Account and hub every member network attaches to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubIdentity {
    pub account: AccountId,
    pub hub: HubId,
}

impl HubIdentity {
    /// Reference to the hub itself
    pub fn core_network_arn(&self) -> ResourceArn {
        ResourceArn::core_network(&self.account, &self.hub)
    }
}

/// Request to carve a member network into subnets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRequest {
    pub network: String,
    pub region: Region,
    pub cidr: Ipv4Net,
    pub availability_zones: u8,
    pub layout: Vec<SubnetLayout>,
}

/// A partitioned network
///
/// Subnets arrive on the feed as soon as they exist; their route tables fill
/// in as the network converges. The feed closes once nothing more will change.
#[derive(Debug)]
pub struct PartitionedNetwork {
    pub vpc: VpcId,
    pub subnets: watch::Receiver<Vec<Subnet>>,
}

/// Network partitioning primitive
#[async_trait]
pub trait NetworkPartitioner: Send + Sync {
    async fn partition(&self, request: &PartitionRequest) -> ProvisionResult<PartitionedNetwork>;
}

/// Attachment submitted to the hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRequest {
    pub network: String,
    pub core_network: ResourceArn,
    pub vpc: ResourceArn,
    pub subnets: Vec<ResourceArn>,
    pub tags: BTreeMap<String, String>,
}

/// Admission state of a submitted attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum AdmissionState {
    Pending,
    Admitted { id: AttachmentId },
    Rejected { reason: String },
}

/// Attachment primitive
#[async_trait]
pub trait AttachmentApi: Send + Sync {
    /// Submit an attachment, returning a token to poll admission with
    async fn create_attachment(&self, request: &AttachmentRequest) -> ProvisionResult<Uuid>;

    async fn admission_state(&self, submission: Uuid) -> ProvisionResult<AdmissionState>;
}

/// Hub answer to a policy submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "kebab-case")]
pub enum PolicyVerdict {
    Accepted,
    Rejected { reason: String },
}

/// Hub policy submission
#[async_trait]
pub trait HubPolicyApi: Send + Sync {
    /// Atomically replace the hub's active policy with `document`
    async fn put_policy(&self, hub: &HubId, document: &str) -> ProvisionResult<PolicyVerdict>;
}

/// Every collaborator the orchestrator drives
#[derive(Clone)]
pub struct CloudApis {
    pub partitioner: Arc<dyn NetworkPartitioner>,
    pub engine: Arc<dyn InspectionEngine>,
    pub routes: Arc<dyn RouteTableApi>,
    pub attachments: Arc<dyn AttachmentApi>,
    pub policy: Arc<dyn HubPolicyApi>,
}

impl CloudApis {
    /// All collaborators served by one backend
    pub fn from_backend<T>(backend: Arc<T>) -> Self
    where
        T: NetworkPartitioner + InspectionEngine + RouteTableApi + AttachmentApi + HubPolicyApi + 'static,
    {
        Self {
            partitioner: backend.clone(),
            engine: backend.clone(),
            routes: backend.clone(),
            attachments: backend.clone(),
            policy: backend,
        }
    }
}

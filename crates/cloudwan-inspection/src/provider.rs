//! Collaborator interfaces
//!
//! Implemented by a real cloud backend or by the simulated cloud.

use crate::status::EngineStatus;
use async_trait::async_trait;
use cloudwan_common::{ProvisionResult, RouteBinding, RouteKey, RouteTarget, VpcId};

/// Inspection engine status query
#[async_trait]
pub trait InspectionEngine: Send + Sync {
    /// Current status snapshot of the engine deployed in `network`
    async fn status(&self, network: &VpcId) -> ProvisionResult<Vec<EngineStatus>>;
}

/// Route table operations
#[async_trait]
pub trait RouteTableApi: Send + Sync {
    /// Target currently installed for `key`, if any
    async fn current_route(&self, key: &RouteKey) -> ProvisionResult<Option<RouteTarget>>;

    /// Install a route that does not exist yet
    async fn create_route(&self, binding: &RouteBinding) -> ProvisionResult<()>;

    /// Point an existing route at a new target
    async fn replace_route(&self, binding: &RouteBinding) -> ProvisionResult<()>;
}

//! Subnets and route bindings

use super::references::ResourceArn;
use super::value_objects::{AvailabilityZone, EndpointId, RouteTableId, SubnetId, SubnetRole};
use ipnet::{IpNet, Ipv4Net};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Zone-scoped slice of a member network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: SubnetId,
    pub name: String,
    pub zone: AvailabilityZone,
    pub cidr: Ipv4Net,
    pub role: SubnetRole,
    /// Absent until the underlying network finishes converging
    #[serde(default)]
    pub route_table: Option<RouteTableId>,
}

/// Next hop of a route
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "kebab-case")]
pub enum RouteTarget {
    /// Inspection engine endpoint in the subnet's zone
    Endpoint(EndpointId),
    /// The hub itself
    CoreNetwork(ResourceArn),
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Endpoint(id) => write!(f, "endpoint {}", id),
            Self::CoreNetwork(arn) => write!(f, "core network {}", arn),
        }
    }
}

/// Identity of a route: one destination per route table
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RouteKey {
    pub route_table: RouteTableId,
    pub destination: IpNet,
}

/// A desired route for one subnet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteBinding {
    pub subnet: SubnetId,
    pub zone: AvailabilityZone,
    pub route_table: RouteTableId,
    pub destination: IpNet,
    pub target: RouteTarget,
}

impl RouteBinding {
    /// Key the binding is idempotent on
    pub fn key(&self) -> RouteKey {
        RouteKey {
            route_table: self.route_table.clone(),
            destination: self.destination,
        }
    }
}

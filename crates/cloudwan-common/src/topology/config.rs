//! Topology configuration as written by operators
//!
//! Plain serde structures; every string is validated when the topology is
//! built so errors can name the entity that carries them.

use super::{NetworkKind, ShareTarget};
use crate::domain::SubnetRole;
use serde::{Deserialize, Serialize};

/// Root of a topology file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopologyConfig {
    pub hub: HubConfig,
    /// Address range of the whole organisation; public subnets route only this through inspection
    pub organisation_cidr: String,
    pub segments: Vec<SegmentConfig>,
    #[serde(default)]
    pub networks: Vec<NetworkConfig>,
    /// Empty means one tag-exists rule per segment, numbered 100, 200, ...
    #[serde(default)]
    pub attachment_policies: Vec<AttachmentPolicyConfig>,
    #[serde(default)]
    pub share: Vec<ShareConfig>,
    #[serde(default)]
    pub routes: Vec<RouteInjectionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HubConfig {
    pub name: String,
    pub regions: Vec<String>,
    #[serde(default = "default_asn_ranges")]
    pub asn_ranges: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SegmentConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub isolate_attachments: bool,
    #[serde(default)]
    pub require_attachment_acceptance: bool,
    /// Empty means every hub region
    #[serde(default)]
    pub edge_locations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    pub name: String,
    pub kind: NetworkKind,
    pub region: String,
    pub cidr: String,
    #[serde(default = "default_zone_count")]
    pub availability_zones: u8,
    pub segment: String,
    /// Empty means the default layout for `kind`
    #[serde(default)]
    pub subnets: Vec<SubnetLayoutConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubnetLayoutConfig {
    pub name: String,
    pub role: SubnetRole,
    pub cidr_mask: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttachmentPolicyConfig {
    pub rule_number: u32,
    pub segment: String,
    /// Tag key to test, defaults to the segment name
    #[serde(default)]
    pub tag: Option<String>,
    /// When set the rule matches on tag value instead of tag presence
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShareConfig {
    pub segment: String,
    #[serde(default)]
    pub share_with: ShareTarget,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteInjectionConfig {
    pub segment: String,
    #[serde(default = "default_destinations")]
    pub destination_cidr_blocks: Vec<String>,
    /// Member networks whose attachments receive the traffic, in order
    pub via: Vec<String>,
}

fn default_asn_ranges() -> Vec<String> {
    vec!["65412-65534".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_zone_count() -> u8 {
    2
}

fn default_destinations() -> Vec<String> {
    vec!["0.0.0.0/0".to_string()]
}

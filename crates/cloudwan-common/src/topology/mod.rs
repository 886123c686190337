//! Topology Model
//!
//! Read-only description of the global network: hub regions, segments,
//! member networks and the segmentation rules between them. Built once from
//! configuration and shared by every other component. No network calls.

pub mod config;

use crate::domain::{AsnRange, Region, SegmentName, SubnetRole};
use crate::error::ConfigError;
use config::{NetworkConfig, TopologyConfig};
use ipnet::{IpNet, Ipv4Net};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

/// Tag value placed on every attachment, the key being the segment name
pub const SEGMENT_TAG_VALUE: &str = "cloudwan-segment";

/// Kind of member network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    /// Hosts the inspection engine for its region
    Inspection,
    /// Hosts workloads; egress goes through the hub
    Workload,
}

impl NetworkKind {
    /// Subnet layout used when the configuration does not give one
    pub fn default_layout(&self) -> Vec<SubnetLayout> {
        match self {
            Self::Inspection => vec![
                SubnetLayout::new("CloudWanAttachments", SubnetRole::Isolated, 24),
                SubnetLayout::new("Firewall", SubnetRole::Private, 24),
                SubnetLayout::new("Public", SubnetRole::Public, 24),
            ],
            Self::Workload => vec![SubnetLayout::new("Workload", SubnetRole::Isolated, 24)],
        }
    }
}

/// The central transit fabric
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hub {
    pub name: String,
    pub edge_locations: Vec<Region>,
    pub asn_ranges: Vec<AsnRange>,
}

/// Routing/isolation domain within the hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub name: SegmentName,
    pub isolate_attachments: bool,
    pub require_attachment_acceptance: bool,
    pub edge_locations: Vec<Region>,
}

/// One subnet tier, repeated in every availability zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetLayout {
    pub name: String,
    pub role: SubnetRole,
    pub cidr_mask: u8,
}

impl SubnetLayout {
    pub fn new(name: impl Into<String>, role: SubnetRole, cidr_mask: u8) -> Self {
        Self {
            name: name.into(),
            role,
            cidr_mask,
        }
    }
}

/// Network attaching to the hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberNetwork {
    pub name: String,
    pub kind: NetworkKind,
    pub region: Region,
    pub cidr: Ipv4Net,
    pub availability_zones: u8,
    /// Fixed once attached
    pub segment: SegmentName,
    pub layout: Vec<SubnetLayout>,
}

impl MemberNetwork {
    /// Tags carried by this network's attachment
    pub fn attachment_tags(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(self.segment.to_string(), SEGMENT_TAG_VALUE.to_string())])
    }
}

/// Tag predicate of an attachment policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagCondition {
    /// Tag key present, any value
    Exists { key: String },
    /// Tag key present with exactly this value
    Equals { key: String, value: String },
}

/// Tag-based segment assignment, evaluated first match by rule number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentPolicyRule {
    pub rule_number: u32,
    pub condition: TagCondition,
    pub segment: SegmentName,
}

/// Share target of a segment
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ShareTarget {
    /// Every other segment (`"*"`)
    #[default]
    All,
    /// Listed segments only
    Segments(Vec<SegmentName>),
}

impl Serialize for ShareTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::All => serializer.serialize_str("*"),
            Self::Segments(segments) => segments.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ShareTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Wildcard(String),
            List(Vec<SegmentName>),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Wildcard(s) if s == "*" => Ok(Self::All),
            Raw::Wildcard(s) => Err(serde::de::Error::custom(format!(
                "share-with must be \"*\" or a list of segments, got \"{}\"",
                s
            ))),
            Raw::List(segments) => Ok(Self::Segments(segments)),
        }
    }
}

/// Attachment routes of `segment` shared with other segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareRule {
    pub segment: SegmentName,
    pub share_with: ShareTarget,
}

/// Static routes injected into a segment, pointing at member network attachments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInjection {
    pub segment: SegmentName,
    pub destination_cidr_blocks: Vec<IpNet>,
    /// Member network names, in the order their attachments become destinations
    pub via: Vec<String>,
}

/// Validated topology
#[derive(Debug, Clone)]
pub struct Topology {
    hub: Hub,
    organisation_cidr: IpNet,
    segments: Vec<Segment>,
    networks: Vec<MemberNetwork>,
    attachment_policies: Vec<AttachmentPolicyRule>,
    share_rules: Vec<ShareRule>,
    route_injections: Vec<RouteInjection>,
}

impl Topology {
    /// Validate configuration and build the topology
    pub fn build(config: TopologyConfig) -> Result<Self, ConfigError> {
        let hub = build_hub(&config)?;
        let organisation_cidr = parse_cidr("organisation", &config.organisation_cidr)?;

        let mut segments = Vec::with_capacity(config.segments.len());
        let mut seen = HashSet::new();
        for seg in &config.segments {
            let name = SegmentName::new(seg.name.clone())?;
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateSegment(seg.name.clone()));
            }
            let edge_locations = if seg.edge_locations.is_empty() {
                hub.edge_locations.clone()
            } else {
                hub_regions(&hub, &format!("segment {}", seg.name), &seg.edge_locations)?
            };
            segments.push(Segment {
                name,
                isolate_attachments: seg.isolate_attachments,
                require_attachment_acceptance: seg.require_attachment_acceptance,
                edge_locations,
            });
        }

        let mut networks: Vec<MemberNetwork> = Vec::with_capacity(config.networks.len());
        for net in &config.networks {
            if networks.iter().any(|n| n.name == net.name) {
                return Err(ConfigError::DuplicateNetwork(net.name.clone()));
            }
            let network = build_network(&hub, net)?;
            if let Some(other) = networks
                .iter()
                .find(|n| n.region == network.region && overlaps(&n.cidr, &network.cidr))
            {
                return Err(ConfigError::OverlappingCidr {
                    region: network.region.to_string(),
                    first: other.name.clone(),
                    second: network.name.clone(),
                });
            }
            if !seen.contains(&network.segment) {
                // The hub is the authority on segments; admission rejects this attachment.
                warn!(
                    network = %network.name,
                    segment = %network.segment,
                    "member network targets a segment this topology does not declare"
                );
            }
            networks.push(network);
        }

        let attachment_policies = if config.attachment_policies.is_empty() {
            segments
                .iter()
                .zip(1u32..)
                .map(|(seg, i)| AttachmentPolicyRule {
                    rule_number: i * 100,
                    condition: TagCondition::Exists {
                        key: seg.name.to_string(),
                    },
                    segment: seg.name.clone(),
                })
                .collect()
        } else {
            let mut rules = Vec::with_capacity(config.attachment_policies.len());
            let mut previous: Option<u32> = None;
            for rule in &config.attachment_policies {
                if let Some(previous) = previous.filter(|p| rule.rule_number <= *p) {
                    return Err(ConfigError::RuleOrder {
                        previous,
                        current: rule.rule_number,
                    });
                }
                previous = Some(rule.rule_number);
                let segment = declared_segment(
                    &seen,
                    &format!("attachment policy {}", rule.rule_number),
                    &rule.segment,
                )?;
                let key = rule.tag.clone().unwrap_or_else(|| segment.to_string());
                let condition = match &rule.value {
                    Some(value) => TagCondition::Equals {
                        key,
                        value: value.clone(),
                    },
                    None => TagCondition::Exists { key },
                };
                rules.push(AttachmentPolicyRule {
                    rule_number: rule.rule_number,
                    condition,
                    segment,
                });
            }
            rules
        };

        let mut share_rules = Vec::with_capacity(config.share.len());
        for share in &config.share {
            let owner = format!("share rule of {}", share.segment);
            let segment = declared_segment(&seen, &owner, &share.segment)?;
            if let ShareTarget::Segments(targets) = &share.share_with {
                for target in targets {
                    declared_segment(&seen, &owner, target.as_str())?;
                }
            }
            share_rules.push(ShareRule {
                segment,
                share_with: share.share_with.clone(),
            });
        }

        let mut route_injections = Vec::with_capacity(config.routes.len());
        for route in &config.routes {
            let owner = format!("route injection into {}", route.segment);
            let segment = declared_segment(&seen, &owner, &route.segment)?;
            let destination_cidr_blocks = route
                .destination_cidr_blocks
                .iter()
                .map(|c| parse_cidr(&owner, c))
                .collect::<Result<Vec<_>, _>>()?;
            for via in &route.via {
                if !networks.iter().any(|n| &n.name == via) {
                    return Err(ConfigError::UnknownNetwork {
                        owner: owner.clone(),
                        network: via.clone(),
                    });
                }
            }
            route_injections.push(RouteInjection {
                segment,
                destination_cidr_blocks,
                via: route.via.clone(),
            });
        }

        Ok(Self {
            hub,
            organisation_cidr,
            segments,
            networks,
            attachment_policies,
            share_rules,
            route_injections,
        })
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Hub edge locations
    pub fn regions(&self) -> &[Region] {
        &self.hub.edge_locations
    }

    pub fn organisation_cidr(&self) -> IpNet {
        self.organisation_cidr
    }

    /// Segments in declaration order
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment(&self, name: &SegmentName) -> Option<&Segment> {
        self.segments.iter().find(|s| &s.name == name)
    }

    /// Member networks in declaration order
    pub fn networks(&self) -> &[MemberNetwork] {
        &self.networks
    }

    pub fn network(&self, name: &str) -> Option<&MemberNetwork> {
        self.networks.iter().find(|n| n.name == name)
    }

    /// Attachment policies, rule numbers strictly increasing
    pub fn attachment_policies(&self) -> &[AttachmentPolicyRule] {
        &self.attachment_policies
    }

    pub fn share_rules(&self) -> &[ShareRule] {
        &self.share_rules
    }

    pub fn route_injections(&self) -> &[RouteInjection] {
        &self.route_injections
    }

    /// Networks whose attachment ids the policy document needs
    pub fn referenced_networks(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self.route_injections.iter().flat_map(|r| r.via.iter()) {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }
}

fn build_hub(config: &TopologyConfig) -> Result<Hub, ConfigError> {
    if config.hub.regions.is_empty() {
        return Err(ConfigError::EmptyRegions);
    }

    let mut edge_locations: Vec<Region> = Vec::with_capacity(config.hub.regions.len());
    for raw in &config.hub.regions {
        let region = Region::new(raw.clone())?;
        if edge_locations.contains(&region) {
            return Err(ConfigError::DuplicateRegion(raw.clone()));
        }
        edge_locations.push(region);
    }

    let asn_ranges = config
        .hub
        .asn_ranges
        .iter()
        .map(|r| AsnRange::parse(r))
        .collect::<Result<Vec<_>, _>>()?;
    if asn_ranges.is_empty() {
        return Err(ConfigError::InvalidAsnRange(String::new()));
    }

    Ok(Hub {
        name: config.hub.name.clone(),
        edge_locations,
        asn_ranges,
    })
}

fn build_network(hub: &Hub, config: &NetworkConfig) -> Result<MemberNetwork, ConfigError> {
    let owner = format!("network {}", config.name);
    let region = hub_regions(hub, &owner, std::slice::from_ref(&config.region))?
        .remove(0);
    let cidr: Ipv4Net = config.cidr.parse().map_err(|_| ConfigError::InvalidCidr {
        owner: owner.clone(),
        value: config.cidr.clone(),
    })?;

    if !(1..=6).contains(&config.availability_zones) {
        return Err(ConfigError::InvalidZoneCount {
            network: config.name.clone(),
            count: config.availability_zones,
        });
    }

    let layout = if config.subnets.is_empty() {
        config.kind.default_layout()
    } else {
        config
            .subnets
            .iter()
            .map(|s| SubnetLayout::new(s.name.clone(), s.role, s.cidr_mask))
            .collect()
    };

    // Every tier is carved once per zone out of the network CIDR.
    let available = 1u64 << (32 - u32::from(cidr.prefix_len()));
    let mut required = 0u64;
    for tier in &layout {
        if tier.cidr_mask < cidr.prefix_len() || tier.cidr_mask > 28 {
            return Err(ConfigError::LayoutOverflow {
                network: config.name.clone(),
                cidr: cidr.to_string(),
            });
        }
        required += (1u64 << (32 - u32::from(tier.cidr_mask))) * u64::from(config.availability_zones);
    }
    if required > available {
        return Err(ConfigError::LayoutOverflow {
            network: config.name.clone(),
            cidr: cidr.to_string(),
        });
    }

    Ok(MemberNetwork {
        name: config.name.clone(),
        kind: config.kind,
        region,
        cidr: cidr.trunc(),
        availability_zones: config.availability_zones,
        segment: SegmentName::new(config.segment.clone())?,
        layout,
    })
}

fn hub_regions(hub: &Hub, owner: &str, raw: &[String]) -> Result<Vec<Region>, ConfigError> {
    raw.iter()
        .map(|r| {
            let region = Region::new(r.clone())?;
            if hub.edge_locations.contains(&region) {
                Ok(region)
            } else {
                Err(ConfigError::UnknownRegion {
                    owner: owner.to_string(),
                    region: r.clone(),
                })
            }
        })
        .collect()
}

fn declared_segment(
    declared: &HashSet<SegmentName>,
    owner: &str,
    raw: &str,
) -> Result<SegmentName, ConfigError> {
    let name = SegmentName::new(raw)?;
    if declared.contains(&name) {
        Ok(name)
    } else {
        Err(ConfigError::UnknownSegment {
            owner: owner.to_string(),
            segment: raw.to_string(),
        })
    }
}

fn parse_cidr(owner: &str, value: &str) -> Result<IpNet, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidCidr {
        owner: owner.to_string(),
        value: value.to_string(),
    })
}

fn overlaps(a: &Ipv4Net, b: &Ipv4Net) -> bool {
    a.contains(&b.network()) || b.contains(&a.network())
}

//! In-memory cloud
//!
//! Implements every collaborator interface against local state so a whole
//! deployment can run without a provider: dry runs from the CLI and the
//! end-to-end tests. Convergence is modelled with delays and poll counts, and
//! a few knobs inject the partial states a real provider produces (a zone the
//! engine never places itself in, route tables that never appear, a segment
//! the hub refuses).

use crate::policy::{PolicyDocument, SegmentAction};
use crate::provider::{
    AdmissionState, AttachmentApi, AttachmentRequest, HubIdentity, HubPolicyApi,
    NetworkPartitioner, PartitionRequest, PartitionedNetwork, PolicyVerdict,
};
use async_trait::async_trait;
use cloudwan_common::{
    AccountId, AttachmentId, AvailabilityZone, EndpointId, HubId, ProvisionError, ProvisionResult,
    RouteBinding, RouteKey, RouteTableId, RouteTarget, Subnet, SubnetId, Topology, VpcId,
};
use cloudwan_inspection::{EngineStatus, InspectionEngine, RouteTableApi, SyncAttachment, SyncState};
use dashmap::DashMap;
use ipnet::Ipv4Net;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

/// Timing of the simulated convergence
#[derive(Debug, Clone)]
pub struct SimulationSettings {
    /// Delay before route tables are assigned to new subnets
    pub route_table_delay: Duration,
    /// Status polls before the engine reports endpoints
    pub endpoint_ready_after: u32,
    /// Admission polls before the hub decides on an attachment
    pub admission_after: u32,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            route_table_delay: Duration::from_millis(50),
            endpoint_ready_after: 2,
            admission_after: 2,
        }
    }
}

struct SimVpc {
    network: String,
    zones: Vec<AvailabilityZone>,
    status_polls: u32,
}

struct SimSubmission {
    network: String,
    polls: u32,
    decision: Result<AttachmentId, String>,
}

/// In-memory implementation of every cloud collaborator
pub struct SimulatedCloud {
    identity: HubIdentity,
    settings: SimulationSettings,
    segments: HashSet<String>,
    withheld_zones: HashSet<AvailabilityZone>,
    deferred_route_tables: HashSet<String>,
    rejected_segments: HashSet<String>,
    vpcs: DashMap<VpcId, SimVpc>,
    routes: DashMap<RouteKey, RouteTarget>,
    submissions: DashMap<Uuid, SimSubmission>,
    attachments: DashMap<AttachmentId, String>,
    policies: Mutex<Vec<String>>,
}

impl SimulatedCloud {
    pub fn new(identity: HubIdentity, segments: impl IntoIterator<Item = String>) -> Self {
        Self {
            identity,
            settings: SimulationSettings::default(),
            segments: segments.into_iter().collect(),
            withheld_zones: HashSet::new(),
            deferred_route_tables: HashSet::new(),
            rejected_segments: HashSet::new(),
            vpcs: DashMap::new(),
            routes: DashMap::new(),
            submissions: DashMap::new(),
            attachments: DashMap::new(),
            policies: Mutex::new(Vec::new()),
        }
    }

    /// Hub that knows the segments `topology` declares
    pub fn for_topology(topology: &Topology) -> ProvisionResult<Self> {
        let identity = HubIdentity {
            account: AccountId::new("123456789012")?,
            hub: HubId::new(format!("core-network-{}", short_id()))?,
        };
        let segments = topology.segments().iter().map(|s| s.name.to_string());
        Ok(Self::new(identity, segments))
    }

    pub fn with_settings(mut self, settings: SimulationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// The engine never places an endpoint in `zone`
    pub fn withhold_zone(mut self, zone: AvailabilityZone) -> Self {
        self.withheld_zones.insert(zone);
        self
    }

    /// Subnets of `network` never get route tables
    pub fn defer_route_tables(mut self, network: impl Into<String>) -> Self {
        self.deferred_route_tables.insert(network.into());
        self
    }

    /// The hub refuses attachments to `segment`
    pub fn reject_segment(mut self, segment: impl Into<String>) -> Self {
        self.rejected_segments.insert(segment.into());
        self
    }

    pub fn identity(&self) -> &HubIdentity {
        &self.identity
    }

    /// Every installed route
    pub fn routes(&self) -> BTreeMap<RouteKey, RouteTarget> {
        self.routes
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Policy documents accepted so far, oldest first
    pub fn policies(&self) -> Vec<String> {
        self.policies.lock().clone()
    }

    /// Admitted attachments by network name
    pub fn attachments(&self) -> BTreeMap<String, AttachmentId> {
        self.attachments
            .iter()
            .map(|entry| (entry.value().clone(), entry.key().clone()))
            .collect()
    }

    /// Hub-side admission check; the segment comes from the attachment tags
    fn admit(&self, request: &AttachmentRequest) -> Result<(), String> {
        if request.core_network != self.identity.core_network_arn() {
            return Err(format!("unknown core network {}", request.core_network));
        }
        let vpc = VpcId::new(request.vpc.resource_id()).map_err(|e| e.to_string())?;
        if !self.vpcs.contains_key(&vpc) {
            return Err(format!("unknown vpc {}", request.vpc));
        }

        let segment = request
            .tags
            .keys()
            .find(|key| self.segments.contains(*key))
            .ok_or_else(|| {
                format!(
                    "no segment matches attachment tags [{}]",
                    request.tags.keys().cloned().collect::<Vec<_>>().join(", ")
                )
            })?;
        if self.rejected_segments.contains(segment) {
            return Err(format!("segment {} does not accept attachments", segment));
        }
        Ok(())
    }
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

/// Carve `request.cidr` into one subnet per layout tier and zone, largest
/// blocks first so every block stays aligned
fn carve(request: &PartitionRequest, zones: &[AvailabilityZone], tag: &str) -> ProvisionResult<Vec<Subnet>> {
    let overflow = || {
        ProvisionError::provider(
            "partition",
            format!("layout of {} does not fit {}", request.network, request.cidr),
        )
    };

    let mut tiers: Vec<_> = request.layout.iter().collect();
    tiers.sort_by_key(|t| t.cidr_mask);

    let end = u64::from(u32::from(request.cidr.broadcast()));
    let mut cursor = u64::from(u32::from(request.cidr.network()));
    let mut subnets = Vec::new();

    for tier in tiers {
        let size = 1u64 << (32 - u32::from(tier.cidr_mask));
        for zone in zones {
            cursor = cursor.div_ceil(size) * size;
            if cursor + size - 1 > end {
                return Err(overflow());
            }
            let addr = Ipv4Addr::from(u32::try_from(cursor).map_err(|_| overflow())?);
            let cidr = Ipv4Net::new(addr, tier.cidr_mask).map_err(|_| overflow())?;
            cursor += size;

            subnets.push(Subnet {
                id: SubnetId::new(format!("subnet-{}{:02}", tag, subnets.len()))?,
                name: format!("{}-{}", tier.name, zone),
                zone: zone.clone(),
                cidr,
                role: tier.role,
                route_table: None,
            });
        }
    }

    Ok(subnets)
}

#[async_trait]
impl NetworkPartitioner for SimulatedCloud {
    async fn partition(&self, request: &PartitionRequest) -> ProvisionResult<PartitionedNetwork> {
        let tag = short_id();
        let vpc = VpcId::new(format!("vpc-{}", tag))?;
        let zones = (0..request.availability_zones)
            .map(|i| AvailabilityZone::new(format!("{}{}", request.region, char::from(b'a' + i))))
            .collect::<Result<Vec<_>, _>>()?;

        let subnets = carve(request, &zones, &tag)?;
        let (tx, rx) = watch::channel(subnets.clone());
        self.vpcs.insert(
            vpc.clone(),
            SimVpc {
                network: request.network.clone(),
                zones,
                status_polls: 0,
            },
        );

        let deferred = self.deferred_route_tables.contains(&request.network);
        let delay = self.settings.route_table_delay;
        let network = request.network.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if deferred {
                debug!(%network, "route tables withheld");
            } else {
                let converged = subnets
                    .into_iter()
                    .map(|mut s| {
                        s.route_table = RouteTableId::new(s.id.as_str().replacen("subnet-", "rtb-", 1)).ok();
                        s
                    })
                    .collect();
                let _ = tx.send(converged);
                debug!(%network, "route tables assigned");
            }
        });

        Ok(PartitionedNetwork { vpc, subnets: rx })
    }
}

#[async_trait]
impl InspectionEngine for SimulatedCloud {
    async fn status(&self, network: &VpcId) -> ProvisionResult<Vec<EngineStatus>> {
        let mut vpc = self
            .vpcs
            .get_mut(network)
            .ok_or_else(|| ProvisionError::provider("engine status", format!("unknown vpc {}", network)))?;
        vpc.status_polls += 1;
        let ready = vpc.status_polls >= self.settings.endpoint_ready_after;

        let sync_states = vpc
            .zones
            .iter()
            .filter(|zone| !self.withheld_zones.contains(*zone))
            .map(|zone| {
                let attachment = if ready {
                    EndpointId::new(format!("vpce-{}-{}", network.as_str().trim_start_matches("vpc-"), zone))
                        .map(SyncAttachment::ready)
                        .unwrap_or_else(|_| SyncAttachment::creating())
                } else {
                    SyncAttachment::creating()
                };
                SyncState {
                    availability_zone: zone.clone(),
                    attachments: vec![attachment],
                }
            })
            .collect();

        debug!(network = %vpc.network, polls = vpc.status_polls, ready, "engine status served");
        Ok(vec![EngineStatus { sync_states }])
    }
}

#[async_trait]
impl RouteTableApi for SimulatedCloud {
    async fn current_route(&self, key: &RouteKey) -> ProvisionResult<Option<RouteTarget>> {
        Ok(self.routes.get(key).map(|r| r.value().clone()))
    }

    async fn create_route(&self, binding: &RouteBinding) -> ProvisionResult<()> {
        let key = binding.key();
        if self.routes.contains_key(&key) {
            return Err(ProvisionError::provider(
                "create route",
                format!("route {} already exists in {}", key.destination, key.route_table),
            ));
        }
        self.routes.insert(key, binding.target.clone());
        Ok(())
    }

    async fn replace_route(&self, binding: &RouteBinding) -> ProvisionResult<()> {
        match self.routes.get_mut(&binding.key()) {
            Some(mut route) => {
                *route = binding.target.clone();
                Ok(())
            }
            None => Err(ProvisionError::provider(
                "replace route",
                format!("no route {} in {}", binding.destination, binding.route_table),
            )),
        }
    }
}

#[async_trait]
impl AttachmentApi for SimulatedCloud {
    async fn create_attachment(&self, request: &AttachmentRequest) -> ProvisionResult<Uuid> {
        let submission = Uuid::new_v4();
        let decision = self
            .admit(request)
            .and_then(|()| AttachmentId::new(format!("attachment-{}", short_id())).map_err(|e| e.to_string()));

        self.submissions.insert(
            submission,
            SimSubmission {
                network: request.network.clone(),
                polls: 0,
                decision,
            },
        );
        Ok(submission)
    }

    async fn admission_state(&self, submission: Uuid) -> ProvisionResult<AdmissionState> {
        let mut entry = self.submissions.get_mut(&submission).ok_or_else(|| {
            ProvisionError::provider("admission state", format!("unknown submission {}", submission))
        })?;
        entry.polls += 1;
        if entry.polls < self.settings.admission_after {
            return Ok(AdmissionState::Pending);
        }

        match &entry.decision {
            Ok(id) => {
                self.attachments.insert(id.clone(), entry.network.clone());
                Ok(AdmissionState::Admitted { id: id.clone() })
            }
            Err(reason) => Ok(AdmissionState::Rejected {
                reason: reason.clone(),
            }),
        }
    }
}

#[async_trait]
impl HubPolicyApi for SimulatedCloud {
    async fn put_policy(&self, hub: &HubId, document: &str) -> ProvisionResult<PolicyVerdict> {
        if hub != &self.identity.hub {
            return Ok(PolicyVerdict::Rejected {
                reason: format!("unknown core network {}", hub),
            });
        }

        let parsed: PolicyDocument = match serde_json::from_str(document) {
            Ok(parsed) => parsed,
            Err(e) => {
                return Ok(PolicyVerdict::Rejected {
                    reason: format!("malformed policy document: {}", e),
                })
            }
        };

        for action in &parsed.segment_actions {
            if let SegmentAction::CreateRoute { destinations, .. } = action {
                if let Some(unknown) = destinations.iter().find(|d| !self.attachments.contains_key(*d)) {
                    return Ok(PolicyVerdict::Rejected {
                        reason: format!("destination {} is not an attachment of this core network", unknown),
                    });
                }
            }
        }

        self.policies.lock().push(document.to_string());
        Ok(PolicyVerdict::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudwan_common::{NetworkKind, Region, SubnetRole};

    fn request(cidr: &str, kind: NetworkKind) -> PartitionRequest {
        PartitionRequest {
            network: "inspection-us".into(),
            region: Region::new("us-east-1").unwrap(),
            cidr: cidr.parse().unwrap(),
            availability_zones: 2,
            layout: kind.default_layout(),
        }
    }

    #[test]
    fn test_carve_inspection_layout() {
        let zones = vec![
            AvailabilityZone::new("us-east-1a").unwrap(),
            AvailabilityZone::new("us-east-1b").unwrap(),
        ];
        let subnets = carve(&request("10.200.0.0/16", NetworkKind::Inspection), &zones, "t").unwrap();

        assert_eq!(subnets.len(), 6);
        assert_eq!(subnets[0].cidr.to_string(), "10.200.0.0/24");
        assert_eq!(subnets[5].cidr.to_string(), "10.200.5.0/24");
        assert_eq!(subnets.iter().filter(|s| s.role == SubnetRole::Isolated).count(), 2);
        assert!(subnets.iter().all(|s| s.route_table.is_none()));
    }

    #[test]
    fn test_carve_overflow() {
        let zones = vec![
            AvailabilityZone::new("us-east-1a").unwrap(),
            AvailabilityZone::new("us-east-1b").unwrap(),
        ];
        assert!(carve(&request("10.0.0.0/24", NetworkKind::Workload), &zones, "t").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_route_tables_arrive_later() {
        let cloud = SimulatedCloud::new(
            HubIdentity {
                account: AccountId::new("123456789012").unwrap(),
                hub: HubId::new("core-network-0f").unwrap(),
            },
            ["sharedservices".to_string()],
        );

        let partitioned = cloud
            .partition(&request("10.200.0.0/16", NetworkKind::Inspection))
            .await
            .unwrap();
        let mut subnets = partitioned.subnets;
        assert!(subnets.borrow().iter().all(|s| s.route_table.is_none()));

        let converged = subnets
            .wait_for(|s| s.iter().all(|s| s.route_table.is_some()))
            .await
            .unwrap()
            .clone();
        assert_eq!(converged.len(), 6);
        assert!(subnets.changed().await.is_err());
    }
}

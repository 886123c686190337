//! Hub policy synthesis and publication
//!
//! The policy document is the hub's whole routing and segmentation state:
//! segments, attachment policies mapping tags to segments, and segment
//! actions (sharing and injected routes). It is built once every attachment
//! a route injection points at has been admitted, and replaces the active
//! document in a single submission.

use crate::provider::{HubPolicyApi, PolicyVerdict};
use chrono::{DateTime, Utc};
use cloudwan_common::{
    AsnRange, AttachmentId, HubId, ProvisionError, ProvisionResult, Region, SegmentName,
    ShareTarget, TagCondition, Topology,
};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Policy document format version
pub const POLICY_VERSION: &str = "2021.12";

/// Hub policy document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PolicyDocument {
    pub version: String,
    pub segments: Vec<PolicySegment>,
    pub core_network_configuration: CoreNetworkConfiguration,
    pub attachment_policies: Vec<AttachmentPolicy>,
    pub segment_actions: Vec<SegmentAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PolicySegment {
    pub name: SegmentName,
    pub isolate_attachments: bool,
    pub require_attachment_acceptance: bool,
    pub edge_locations: Vec<Region>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CoreNetworkConfiguration {
    pub asn_ranges: Vec<AsnRange>,
    pub edge_locations: Vec<EdgeLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeLocation {
    pub location: Region,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AttachmentPolicy {
    pub rule_number: u32,
    pub conditions: Vec<PolicyCondition>,
    pub action: AttachmentAction,
}

/// Tag predicate, all conditions of a rule must hold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PolicyCondition {
    TagExists {
        key: String,
    },
    TagValue {
        operator: ConditionOperator,
        key: String,
        value: String,
    },
}

impl PolicyCondition {
    fn matches(&self, tags: &BTreeMap<String, String>) -> bool {
        match self {
            Self::TagExists { key } => tags.contains_key(key),
            Self::TagValue { operator: ConditionOperator::Equals, key, value } => {
                tags.get(key) == Some(value)
            }
            Self::TagValue { operator: ConditionOperator::NotEquals, key, value } => {
                tags.get(key).is_some_and(|v| v != value)
            }
        }
    }
}

impl From<&TagCondition> for PolicyCondition {
    fn from(condition: &TagCondition) -> Self {
        match condition {
            TagCondition::Exists { key } => Self::TagExists { key: key.clone() },
            TagCondition::Equals { key, value } => Self::TagValue {
                operator: ConditionOperator::Equals,
                key: key.clone(),
                value: value.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AttachmentAction {
    pub association_method: AssociationMethod,
    pub segment: SegmentName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssociationMethod {
    Constant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShareMode {
    AttachmentRoute,
}

/// Segment action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum SegmentAction {
    /// Share `segment`'s attachment routes
    Share {
        mode: ShareMode,
        segment: SegmentName,
        #[serde(rename = "share-with")]
        share_with: ShareTarget,
    },
    /// Inject static routes into `segment`, towards attachments in order
    CreateRoute {
        #[serde(rename = "destination-cidr-blocks")]
        destination_cidr_blocks: Vec<IpNet>,
        destinations: Vec<AttachmentId>,
        segment: SegmentName,
    },
}

impl SegmentAction {
    fn segment(&self) -> &SegmentName {
        match self {
            Self::Share { segment, .. } | Self::CreateRoute { segment, .. } => segment,
        }
    }
}

/// Attachment ids resolved so far, by member network name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedAttachments(BTreeMap<String, AttachmentId>);

impl ResolvedAttachments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, network: impl Into<String>, id: AttachmentId) {
        self.0.insert(network.into(), id);
    }

    pub fn get(&self, network: &str) -> Option<&AttachmentId> {
        self.0.get(network)
    }

    pub fn contains(&self, network: &str) -> bool {
        self.0.contains_key(network)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Networks of `required` still without an id
    pub fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required.iter().copied().filter(|n| !self.contains(n)).collect()
    }
}

impl FromIterator<(String, AttachmentId)> for ResolvedAttachments {
    fn from_iter<I: IntoIterator<Item = (String, AttachmentId)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Build the policy document for `topology`.
///
/// Every route injection destination must already be resolved; an
/// unresolved one is refused rather than left out.
pub fn synthesize(
    topology: &Topology,
    attachments: &ResolvedAttachments,
) -> ProvisionResult<PolicyDocument> {
    let segments = topology
        .segments()
        .iter()
        .map(|s| PolicySegment {
            name: s.name.clone(),
            isolate_attachments: s.isolate_attachments,
            require_attachment_acceptance: s.require_attachment_acceptance,
            edge_locations: s.edge_locations.clone(),
        })
        .collect();

    let core_network_configuration = CoreNetworkConfiguration {
        asn_ranges: topology.hub().asn_ranges.clone(),
        edge_locations: topology
            .regions()
            .iter()
            .map(|r| EdgeLocation { location: r.clone() })
            .collect(),
    };

    let attachment_policies = topology
        .attachment_policies()
        .iter()
        .map(|rule| AttachmentPolicy {
            rule_number: rule.rule_number,
            conditions: vec![PolicyCondition::from(&rule.condition)],
            action: AttachmentAction {
                association_method: AssociationMethod::Constant,
                segment: rule.segment.clone(),
            },
        })
        .collect();

    let mut segment_actions: Vec<SegmentAction> = topology
        .share_rules()
        .iter()
        .map(|share| SegmentAction::Share {
            mode: ShareMode::AttachmentRoute,
            segment: share.segment.clone(),
            share_with: share.share_with.clone(),
        })
        .collect();

    for injection in topology.route_injections() {
        let destinations = injection
            .via
            .iter()
            .map(|network| {
                attachments
                    .get(network)
                    .cloned()
                    .ok_or_else(|| ProvisionError::UnresolvedDestination {
                        segment: injection.segment.to_string(),
                        network: network.clone(),
                    })
            })
            .collect::<ProvisionResult<Vec<_>>>()?;

        segment_actions.push(SegmentAction::CreateRoute {
            destination_cidr_blocks: injection.destination_cidr_blocks.clone(),
            destinations,
            segment: injection.segment.clone(),
        });
    }

    let document = PolicyDocument {
        version: POLICY_VERSION.to_string(),
        segments,
        core_network_configuration,
        attachment_policies,
        segment_actions,
    };
    document.validate()?;
    Ok(document)
}

impl PolicyDocument {
    /// Check the document is self-consistent
    pub fn validate(&self) -> ProvisionResult<()> {
        let inconsistent = |msg: String| Err(ProvisionError::InconsistentPolicy(msg));

        if self.version != POLICY_VERSION {
            return inconsistent(format!("unsupported version {}", self.version));
        }

        let mut declared = HashSet::new();
        for segment in &self.segments {
            if !declared.insert(&segment.name) {
                return inconsistent(format!("segment {} declared twice", segment.name));
            }
        }

        let edges: HashSet<&Region> = self
            .core_network_configuration
            .edge_locations
            .iter()
            .map(|e| &e.location)
            .collect();
        for segment in &self.segments {
            if let Some(region) = segment.edge_locations.iter().find(|r| !edges.contains(r)) {
                return inconsistent(format!(
                    "segment {} uses edge location {} outside the core network",
                    segment.name, region
                ));
            }
        }

        let mut previous: Option<u32> = None;
        for rule in &self.attachment_policies {
            if previous.is_some_and(|p| rule.rule_number <= p) {
                return inconsistent(format!(
                    "attachment policy rule numbers must increase, {} follows {}",
                    rule.rule_number,
                    previous.unwrap_or_default()
                ));
            }
            previous = Some(rule.rule_number);
            if !declared.contains(&rule.action.segment) {
                return inconsistent(format!(
                    "attachment policy {} targets undeclared segment {}",
                    rule.rule_number, rule.action.segment
                ));
            }
        }

        for action in &self.segment_actions {
            if !declared.contains(action.segment()) {
                return inconsistent(format!(
                    "segment action on undeclared segment {}",
                    action.segment()
                ));
            }
            match action {
                SegmentAction::Share {
                    share_with: ShareTarget::Segments(targets),
                    ..
                } => {
                    if let Some(target) = targets.iter().find(|t| !declared.contains(t)) {
                        return inconsistent(format!("share with undeclared segment {}", target));
                    }
                }
                SegmentAction::CreateRoute { destinations, segment, .. } if destinations.is_empty() => {
                    return inconsistent(format!("route injection into {} has no destinations", segment));
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Segment an attachment with `tags` joins: the first rule whose
    /// conditions all hold
    pub fn evaluate(&self, tags: &BTreeMap<String, String>) -> Option<&SegmentName> {
        self.attachment_policies
            .iter()
            .find(|rule| rule.conditions.iter().all(|c| c.matches(tags)))
            .map(|rule| &rule.action.segment)
    }

    /// Serialized form submitted to the hub
    pub fn to_json(&self) -> ProvisionResult<String> {
        serde_json::to_string(self).map_err(|e| ProvisionError::InconsistentPolicy(e.to_string()))
    }
}

/// A document the hub accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedPolicy {
    pub revision: u64,
    pub submitted_at: DateTime<Utc>,
    pub document: PolicyDocument,
}

/// Single writer of the hub policy
pub struct PolicyPublisher {
    api: Arc<dyn HubPolicyApi>,
    hub: HubId,
    active: Mutex<Option<PublishedPolicy>>,
}

impl PolicyPublisher {
    pub fn new(api: Arc<dyn HubPolicyApi>, hub: HubId) -> Self {
        Self {
            api,
            hub,
            active: Mutex::new(None),
        }
    }

    /// Replace the hub policy with `document`
    pub async fn publish(&self, document: PolicyDocument) -> ProvisionResult<PublishedPolicy> {
        document.validate()?;
        let json = document.to_json()?;

        let mut active = self.active.lock().await;
        match self.api.put_policy(&self.hub, &json).await? {
            PolicyVerdict::Accepted => {
                let revision = active.as_ref().map_or(1, |p| p.revision + 1);
                let published = PublishedPolicy {
                    revision,
                    submitted_at: Utc::now(),
                    document,
                };
                info!(
                    hub = %self.hub,
                    revision,
                    segments = published.document.segments.len(),
                    actions = published.document.segment_actions.len(),
                    "hub policy published"
                );
                *active = Some(published.clone());
                Ok(published)
            }
            PolicyVerdict::Rejected { reason } => {
                warn!(hub = %self.hub, %reason, "hub policy rejected");
                Err(ProvisionError::PolicyRejected {
                    hub: self.hub.to_string(),
                    reason,
                })
            }
        }
    }

    /// Last accepted document
    pub async fn active(&self) -> Option<PublishedPolicy> {
        self.active.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cloudwan_common::topology::config::*;
    use cloudwan_common::{ErrorClass, NetworkKind, SEGMENT_TAG_VALUE};
    use parking_lot::Mutex as SyncMutex;
    use serde_json::json;

    fn network(name: &str, kind: NetworkKind, region: &str, cidr: &str, segment: &str) -> NetworkConfig {
        NetworkConfig {
            name: name.into(),
            kind,
            region: region.into(),
            cidr: cidr.into(),
            availability_zones: 2,
            segment: segment.into(),
            subnets: vec![],
        }
    }

    fn segment(name: &str) -> SegmentConfig {
        SegmentConfig {
            name: name.into(),
            isolate_attachments: true,
            require_attachment_acceptance: false,
            edge_locations: vec![],
        }
    }

    fn topology() -> Topology {
        Topology::build(TopologyConfig {
            hub: HubConfig {
                name: "GlobalNet".into(),
                regions: vec!["eu-west-1".into(), "us-east-1".into()],
                asn_ranges: vec!["65412-65534".into()],
            },
            organisation_cidr: "10.0.0.0/8".into(),
            segments: vec![segment("prod"), segment("sharedservices")],
            networks: vec![
                network("inspection-us", NetworkKind::Inspection, "us-east-1", "10.200.0.0/16", "sharedservices"),
                network("inspection-eu", NetworkKind::Inspection, "eu-west-1", "10.200.0.0/16", "sharedservices"),
            ],
            attachment_policies: vec![],
            share: vec![ShareConfig {
                segment: "sharedservices".into(),
                share_with: ShareTarget::All,
            }],
            routes: vec![RouteInjectionConfig {
                segment: "prod".into(),
                destination_cidr_blocks: vec!["0.0.0.0/0".into()],
                via: vec!["inspection-us".into(), "inspection-eu".into()],
            }],
        })
        .unwrap()
    }

    fn resolved() -> ResolvedAttachments {
        [
            ("inspection-eu".to_string(), AttachmentId::new("attachment-EUID").unwrap()),
            ("inspection-us".to_string(), AttachmentId::new("attachment-USID").unwrap()),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_document_shape() {
        let document = synthesize(&topology(), &resolved()).unwrap();
        let value = serde_json::to_value(&document).unwrap();

        let segment = |name: &str| {
            json!({
                "name": name,
                "isolate-attachments": true,
                "require-attachment-acceptance": false,
                "edge-locations": ["eu-west-1", "us-east-1"]
            })
        };
        let rule = |number: u32, name: &str| {
            json!({
                "rule-number": number,
                "conditions": [{"type": "tag-exists", "key": name}],
                "action": {"association-method": "constant", "segment": name}
            })
        };

        assert_eq!(
            value,
            json!({
                "version": "2021.12",
                "segments": [segment("prod"), segment("sharedservices")],
                "core-network-configuration": {
                    "asn-ranges": ["65412-65534"],
                    "edge-locations": [{"location": "eu-west-1"}, {"location": "us-east-1"}]
                },
                "attachment-policies": [rule(100, "prod"), rule(200, "sharedservices")],
                "segment-actions": [
                    {
                        "action": "share",
                        "mode": "attachment-route",
                        "segment": "sharedservices",
                        "share-with": "*"
                    },
                    {
                        "action": "create-route",
                        "destination-cidr-blocks": ["0.0.0.0/0"],
                        "destinations": ["attachment-USID", "attachment-EUID"],
                        "segment": "prod"
                    }
                ]
            })
        );
    }

    #[test]
    fn test_document_decodes_back() {
        let document = synthesize(&topology(), &resolved()).unwrap();
        let decoded: PolicyDocument = serde_json::from_str(&document.to_json().unwrap()).unwrap();
        assert_eq!(decoded, document);
    }

    #[test]
    fn test_refuses_unresolved_destination() {
        let mut partial = ResolvedAttachments::new();
        partial.insert("inspection-us", AttachmentId::new("attachment-USID").unwrap());

        let err = synthesize(&topology(), &partial).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Fatal);
        assert!(matches!(
            err,
            ProvisionError::UnresolvedDestination { ref network, .. } if network == "inspection-eu"
        ));
        assert_eq!(
            partial.missing(&topology().referenced_networks()),
            vec!["inspection-eu"]
        );
    }

    #[test]
    fn test_evaluate_first_match() {
        let document = synthesize(&topology(), &resolved()).unwrap();
        let tags = |key: &str| BTreeMap::from([(key.to_string(), SEGMENT_TAG_VALUE.to_string())]);

        assert_eq!(document.evaluate(&tags("prod")).map(|s| s.as_str()), Some("prod"));
        assert_eq!(
            document.evaluate(&tags("sharedservices")).map(|s| s.as_str()),
            Some("sharedservices")
        );
        assert_eq!(document.evaluate(&tags("nonprod")), None);

        let mut both = tags("sharedservices");
        both.insert("prod".into(), SEGMENT_TAG_VALUE.into());
        assert_eq!(document.evaluate(&both).map(|s| s.as_str()), Some("prod"));
    }

    #[test]
    fn test_validate_rejects_undeclared_segment() {
        let mut document = synthesize(&topology(), &resolved()).unwrap();
        document.segment_actions.push(SegmentAction::Share {
            mode: ShareMode::AttachmentRoute,
            segment: SegmentName::new("nonprod").unwrap(),
            share_with: ShareTarget::All,
        });
        assert!(matches!(
            document.validate(),
            Err(ProvisionError::InconsistentPolicy(_))
        ));
    }

    #[test]
    fn test_validate_rejects_unordered_rules() {
        let mut document = synthesize(&topology(), &resolved()).unwrap();
        document.attachment_policies.reverse();
        assert!(document.validate().is_err());
    }

    struct RecordingHub {
        verdict: PolicyVerdict,
        documents: SyncMutex<Vec<String>>,
    }

    #[async_trait]
    impl HubPolicyApi for RecordingHub {
        async fn put_policy(&self, _hub: &HubId, document: &str) -> ProvisionResult<PolicyVerdict> {
            self.documents.lock().push(document.to_string());
            Ok(self.verdict.clone())
        }
    }

    #[tokio::test]
    async fn test_publish_increments_revision() {
        let hub = Arc::new(RecordingHub {
            verdict: PolicyVerdict::Accepted,
            documents: SyncMutex::new(Vec::new()),
        });
        let publisher = PolicyPublisher::new(hub.clone(), HubId::new("core-network-0f").unwrap());
        let document = synthesize(&topology(), &resolved()).unwrap();

        let first = publisher.publish(document.clone()).await.unwrap();
        let second = publisher.publish(document).await.unwrap();

        assert_eq!(first.revision, 1);
        assert_eq!(second.revision, 2);
        assert_eq!(hub.documents.lock().len(), 2);
        assert_eq!(publisher.active().await.map(|p| p.revision), Some(2));
    }

    #[tokio::test]
    async fn test_rejected_policy_is_fatal() {
        let hub = Arc::new(RecordingHub {
            verdict: PolicyVerdict::Rejected {
                reason: "unknown attachment".into(),
            },
            documents: SyncMutex::new(Vec::new()),
        });
        let publisher = PolicyPublisher::new(hub, HubId::new("core-network-0f").unwrap());

        let err = publisher
            .publish(synthesize(&topology(), &resolved()).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Fatal);
        assert!(publisher.active().await.is_none());
    }
}

//! Zone endpoint resolution
//!
//! The inspection engine reports its placement as a nested status document:
//! engine statuses, each with per-zone sync states, each with the endpoint
//! attachments in that zone. Resolution folds that document into one
//! `zone -> endpoint` map.

use cloudwan_common::{AvailabilityZone, EndpointId, SubnetId};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One status record of the inspection engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    #[serde(default)]
    pub sync_states: Vec<SyncState>,
}

/// Engine placement in one availability zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub availability_zone: AvailabilityZone,
    #[serde(default)]
    pub attachments: Vec<SyncAttachment>,
}

/// Endpoint attachment inside a zone
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAttachment {
    /// Absent (or empty) while the endpoint is still being created
    #[serde(default, deserialize_with = "blank_as_none")]
    pub endpoint_id: Option<EndpointId>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub subnet_id: Option<SubnetId>,
    #[serde(default)]
    pub status: Option<String>,
}

impl SyncAttachment {
    /// Attachment with a ready endpoint
    pub fn ready(endpoint: EndpointId) -> Self {
        Self {
            endpoint_id: Some(endpoint),
            subnet_id: None,
            status: Some("READY".to_string()),
        }
    }

    /// Attachment whose endpoint is not populated yet
    pub fn creating() -> Self {
        Self {
            endpoint_id: None,
            subnet_id: None,
            status: Some("CREATING".to_string()),
        }
    }
}

fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<String>,
    T::Error: std::fmt::Display,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => T::try_from(s).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Resolved `zone -> endpoint` mapping
///
/// A zone absent from `endpoints` is pending. `observed` keeps every zone the
/// engine reported on, so a zone the engine placed itself in but has no
/// endpoint for yet can be told apart from one it never placed itself in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneEndpoints {
    endpoints: BTreeMap<AvailabilityZone, EndpointId>,
    observed: BTreeSet<AvailabilityZone>,
}

impl ZoneEndpoints {
    /// Record one attachment report for `zone`; later reports overwrite earlier ones
    pub fn record(mut self, zone: &AvailabilityZone, endpoint: Option<&EndpointId>) -> Self {
        self.observed.insert(zone.clone());
        match endpoint {
            Some(endpoint) => {
                self.endpoints.insert(zone.clone(), endpoint.clone());
            }
            None => {
                self.endpoints.remove(zone);
            }
        }
        self
    }

    /// Mark `zone` as observed without touching its endpoint
    pub fn observe(mut self, zone: &AvailabilityZone) -> Self {
        self.observed.insert(zone.clone());
        self
    }

    pub fn get(&self, zone: &AvailabilityZone) -> Option<&EndpointId> {
        self.endpoints.get(zone)
    }

    pub fn is_observed(&self, zone: &AvailabilityZone) -> bool {
        self.observed.contains(zone)
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Resolved zones and endpoints, ordered by zone
    pub fn iter(&self) -> impl Iterator<Item = (&AvailabilityZone, &EndpointId)> {
        self.endpoints.iter()
    }

    pub fn observed_zones(&self) -> impl Iterator<Item = &AvailabilityZone> {
        self.observed.iter()
    }
}

impl FromIterator<(AvailabilityZone, EndpointId)> for ZoneEndpoints {
    fn from_iter<I: IntoIterator<Item = (AvailabilityZone, EndpointId)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::default(), |acc, (zone, endpoint)| acc.record(&zone, Some(&endpoint)))
    }
}

/// Fold an engine status snapshot into a zone map.
///
/// Records are applied in iteration order and the last one for a zone wins,
/// including a record that carries no endpoint. Pure; the same snapshot always
/// yields the same map.
pub fn resolve_zone_endpoints(statuses: &[EngineStatus]) -> ZoneEndpoints {
    statuses
        .iter()
        .flat_map(|status| status.sync_states.iter())
        .fold(ZoneEndpoints::default(), |acc, state| {
            let acc = acc.observe(&state.availability_zone);
            state.attachments.iter().fold(acc, |acc, attachment| {
                acc.record(&state.availability_zone, attachment.endpoint_id.as_ref())
            })
        })
}

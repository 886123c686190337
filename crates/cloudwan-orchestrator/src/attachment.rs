//! Attachment coordination
//!
//! Binds a member network to the hub and waits for admission. Waiting has no
//! built-in limit; callers that need one use [`AttachmentCoordinator::attach_within`].

use crate::provider::{AdmissionState, AttachmentApi, AttachmentRequest, HubIdentity};
use chrono::{DateTime, Utc};
use cloudwan_common::{
    AttachmentId, MemberNetwork, ProvisionError, ProvisionResult, ResourceArn, SegmentName,
    Subnet, SubnetRole, VpcId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Attachment admitted by the hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: AttachmentId,
    pub network: String,
    pub segment: SegmentName,
    pub vpc: ResourceArn,
    pub admitted_at: DateTime<Utc>,
}

/// Submits attachments and polls for admission
pub struct AttachmentCoordinator {
    api: Arc<dyn AttachmentApi>,
    identity: HubIdentity,
    poll_interval: Duration,
}

impl AttachmentCoordinator {
    pub fn new(api: Arc<dyn AttachmentApi>, identity: HubIdentity, poll_interval: Duration) -> Self {
        Self {
            api,
            identity,
            poll_interval,
        }
    }

    /// Build the attachment request for `network`.
    ///
    /// The attachment goes on the network's isolated subnets. Every reference
    /// is re-parsed so a malformed handle fails here, before any API call. A
    /// handle that does not survive the round trip is a fatal rejection.
    pub fn request(
        &self,
        network: &MemberNetwork,
        vpc: &VpcId,
        subnets: &[Subnet],
    ) -> ProvisionResult<AttachmentRequest> {
        let vpc_arn = checked(
            &network.name,
            ResourceArn::vpc(&network.region, &self.identity.account, vpc),
        )?;
        let core_network = checked(&network.name, self.identity.core_network_arn())?;

        let subnet_arns = subnets
            .iter()
            .filter(|s| s.role == SubnetRole::Isolated)
            .map(|s| {
                checked(
                    &network.name,
                    ResourceArn::subnet(&network.region, &self.identity.account, &s.id),
                )
            })
            .collect::<ProvisionResult<Vec<_>>>()?;
        if subnet_arns.is_empty() {
            return Err(ProvisionError::AdmissionRejected {
                network: network.name.clone(),
                reference: vpc_arn.to_string(),
                reason: "network has no isolated subnets to attach".to_string(),
            });
        }

        Ok(AttachmentRequest {
            network: network.name.clone(),
            core_network,
            vpc: vpc_arn,
            subnets: subnet_arns,
            tags: network.attachment_tags(),
        })
    }

    /// Attach `network` and wait, without limit, for the hub to admit it
    pub async fn attach(
        &self,
        network: &MemberNetwork,
        vpc: &VpcId,
        subnets: &[Subnet],
    ) -> ProvisionResult<Attachment> {
        let request = self.request(network, vpc, subnets)?;
        let submission = self.api.create_attachment(&request).await?;
        info!(
            network = %network.name,
            segment = %network.segment,
            vpc = %request.vpc,
            "attachment submitted"
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut polls: u32 = 0;

        loop {
            ticker.tick().await;
            polls += 1;

            match self.api.admission_state(submission).await? {
                AdmissionState::Pending => {
                    debug!(network = %network.name, polls, "attachment pending admission");
                }
                AdmissionState::Admitted { id } => {
                    info!(network = %network.name, attachment = %id, polls, "attachment admitted");
                    return Ok(Attachment {
                        id,
                        network: network.name.clone(),
                        segment: network.segment.clone(),
                        vpc: request.vpc,
                        admitted_at: Utc::now(),
                    });
                }
                AdmissionState::Rejected { reason } => {
                    warn!(network = %network.name, %reason, "attachment rejected");
                    return Err(ProvisionError::AdmissionRejected {
                        network: network.name.clone(),
                        reference: request.vpc.to_string(),
                        reason,
                    });
                }
            }
        }
    }

    /// [`attach`](Self::attach) bounded by `deadline`; still pending at the
    /// deadline is a retryable failure
    pub async fn attach_within(
        &self,
        network: &MemberNetwork,
        vpc: &VpcId,
        subnets: &[Subnet],
        deadline: Duration,
    ) -> ProvisionResult<Attachment> {
        tokio::time::timeout(deadline, self.attach(network, vpc, subnets))
            .await
            .map_err(|_| ProvisionError::AdmissionTimeout {
                network: network.name.clone(),
                waited: deadline,
            })?
    }
}

fn checked(network: &str, reference: ResourceArn) -> ProvisionResult<ResourceArn> {
    let rendered = reference.to_string();
    ResourceArn::parse(&rendered).map_err(|e| ProvisionError::AdmissionRejected {
        network: network.to_string(),
        reference: rendered.clone(),
        reason: e.to_string(),
    })
}

//! Main Orchestrator
//!
//! Runs one task per member network on a `JoinSet`. Each task partitions its
//! network, attaches it to the hub and converges its routes; attachment ids
//! flow back over a channel to the policy step, which publishes once every
//! id a route injection needs has arrived. One network's failure or slow
//! admission never holds up another network's routes.

use crate::attachment::{Attachment, AttachmentCoordinator};
use crate::config::OrchestratorConfig;
use crate::policy::{synthesize, PolicyDocument, PolicyPublisher, ResolvedAttachments};
use crate::provider::{CloudApis, HubIdentity, PartitionRequest};
use chrono::{DateTime, Utc};
use cloudwan_common::metrics::{ReconcileMetrics, ReconcileSnapshot};
use cloudwan_common::{
    AttachmentId, AvailabilityZone, ErrorClass, MemberNetwork, NetworkKind, ProvisionError,
    ProvisionResult, Region, SegmentName, Subnet, Topology, VpcId,
};
use cloudwan_inspection::{
    resolve_zone_endpoints, EgressPolicy, NextHops, ReconcileObserver, ReconcileReport,
    RouteReconciler, TracingObserver,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

type AttachmentFeed = mpsc::UnboundedSender<(String, ProvisionResult<AttachmentId>)>;

/// Control plane for one hub and its member networks
pub struct Orchestrator {
    topology: Arc<Topology>,
    cloud: CloudApis,
    identity: HubIdentity,
    config: OrchestratorConfig,
    observer: Arc<dyn ReconcileObserver>,
    metrics: Arc<ReconcileMetrics>,
    publisher: Arc<PolicyPublisher>,
}

impl Orchestrator {
    /// Create new orchestrator
    pub fn new(
        topology: Topology,
        cloud: CloudApis,
        identity: HubIdentity,
        config: OrchestratorConfig,
    ) -> Self {
        let publisher = Arc::new(PolicyPublisher::new(cloud.policy.clone(), identity.hub.clone()));
        Self {
            topology: Arc::new(topology),
            cloud,
            identity,
            config,
            observer: Arc::new(TracingObserver),
            metrics: Arc::new(ReconcileMetrics::new()),
            publisher,
        }
    }

    /// Route reconciliation events to `observer` instead of the log
    pub fn with_observer(mut self, observer: Arc<dyn ReconcileObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn publisher(&self) -> &Arc<PolicyPublisher> {
        &self.publisher
    }

    pub fn metrics(&self) -> ReconcileSnapshot {
        self.metrics.snapshot()
    }

    /// Provision every member network and publish the hub policy
    pub async fn deploy(&self) -> DeploymentReport {
        info!(
            hub = %self.identity.hub,
            networks = self.topology.networks().len(),
            regions = self.topology.regions().len(),
            "deployment started"
        );

        let (attachments_tx, attachments_rx) = mpsc::unbounded_channel();
        let mut tasks = JoinSet::new();
        for (index, network) in self.topology.networks().iter().enumerate() {
            let task = NetworkTask {
                network: network.clone(),
                organisation_cidr: self.topology.organisation_cidr(),
                cloud: self.cloud.clone(),
                identity: self.identity.clone(),
                config: self.config.clone(),
                observer: self.observer.clone(),
                metrics: self.metrics.clone(),
            };
            let feed = attachments_tx.clone();
            tasks.spawn(async move { (index, task.run(feed).await) });
        }
        drop(attachments_tx);

        let (networks, policy) = tokio::join!(collect(tasks), self.publish_policy(attachments_rx));

        let report = DeploymentReport {
            networks,
            policy,
            routes: self.metrics.snapshot(),
        };
        info!(
            routes_applied = report.routes.routes_applied(),
            subnets_unrouted = report.routes.subnets_unrouted,
            success = report.is_success(),
            "deployment finished"
        );
        report
    }

    /// Wait for every attachment a route injection references, then publish
    async fn publish_policy(
        &self,
        mut attachments: mpsc::UnboundedReceiver<(String, ProvisionResult<AttachmentId>)>,
    ) -> PolicyReport {
        let required = self.topology.referenced_networks();
        let mut resolved = ResolvedAttachments::new();

        while !resolved.missing(&required).is_empty() {
            match attachments.recv().await {
                Some((network, Ok(id))) => resolved.insert(network, id),
                Some((network, Err(e))) if required.contains(&network.as_str()) => {
                    warn!(%network, error = %e, "policy blocked by failed attachment");
                    return PolicyReport::Blocked {
                        missing: resolved.missing(&required).iter().map(|n| n.to_string()).collect(),
                        reason: e.to_string(),
                    };
                }
                Some(_) => {}
                None => {
                    return PolicyReport::Blocked {
                        missing: resolved.missing(&required).iter().map(|n| n.to_string()).collect(),
                        reason: "attachment tasks ended without an id".to_string(),
                    };
                }
            }
        }

        let published = match synthesize(&self.topology, &resolved) {
            Ok(document) => self.publisher.publish(document).await,
            Err(e) => Err(e),
        };
        match published {
            Ok(policy) => PolicyReport::Published {
                revision: policy.revision,
                submitted_at: policy.submitted_at,
                document: policy.document,
            },
            Err(e) => {
                error!(error = %e, "hub policy not published");
                PolicyReport::Failed {
                    class: e.class(),
                    message: e.to_string(),
                }
            }
        }
    }
}

async fn collect(mut tasks: JoinSet<(usize, NetworkReport)>) -> Vec<NetworkReport> {
    let mut reports = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(report) => reports.push(report),
            Err(e) => error!(error = %e, "network task aborted"),
        }
    }
    reports.sort_by_key(|(index, _)| *index);
    reports.into_iter().map(|(_, report)| report).collect()
}

/// Work for one member network
struct NetworkTask {
    network: MemberNetwork,
    organisation_cidr: ipnet::IpNet,
    cloud: CloudApis,
    identity: HubIdentity,
    config: OrchestratorConfig,
    observer: Arc<dyn ReconcileObserver>,
    metrics: Arc<ReconcileMetrics>,
}

impl NetworkTask {
    async fn run(self, attachments: AttachmentFeed) -> NetworkReport {
        let mut report = NetworkReport::new(&self.network);
        info!(
            network = %self.network.name,
            kind = ?self.network.kind,
            region = %self.network.region,
            "provisioning member network"
        );

        let (vpc, mut subnets) = match self.partition().await {
            Ok(partitioned) => partitioned,
            Err(e) => {
                let _ = attachments.send((self.network.name.clone(), Err(e.clone())));
                report.fail("partition", &e);
                return report;
            }
        };
        report.vpc = Some(vpc.clone());

        let current = match subnets.wait_for(|s| !s.is_empty()).await {
            Ok(current) => current.clone(),
            Err(_) => {
                let e = ProvisionError::provider("partition", "subnet feed closed before any subnet appeared");
                let _ = attachments.send((self.network.name.clone(), Err(e.clone())));
                report.fail("partition", &e);
                return report;
            }
        };

        let coordinator = AttachmentCoordinator::new(
            self.cloud.attachments.clone(),
            self.identity.clone(),
            self.config.admission_poll_interval(),
        );
        let attach = async {
            let result = match self.config.attachment_deadline() {
                Some(deadline) => {
                    coordinator
                        .attach_within(&self.network, &vpc, &current, deadline)
                        .await
                }
                None => coordinator.attach(&self.network, &vpc, &current).await,
            };
            let id = result.as_ref().map(|a| a.id.clone()).map_err(Clone::clone);
            let _ = attachments.send((self.network.name.clone(), id));
            result
        };

        let (hops_tx, hops_rx) = watch::channel(NextHops::Pending);
        let reconcile_deadline = self.config.reconcile_deadline();

        let (attachment, routes) = match self.network.kind {
            NetworkKind::Inspection => {
                let reconciler = self.reconciler(EgressPolicy::inspection(self.organisation_cidr));
                let zones: BTreeSet<_> = current.iter().map(|s| s.zone.clone()).collect();
                let (attachment, (), routes) = tokio::join!(
                    attach,
                    self.poll_endpoints(&vpc, zones, hops_tx),
                    reconciler.converge(hops_rx, subnets.clone(), reconcile_deadline),
                );
                (attachment, routes)
            }
            NetworkKind::Workload => {
                let reconciler = self.reconciler(EgressPolicy::workload());
                let core_network = self.identity.core_network_arn();
                let attach_then_route = async move {
                    let result = attach.await;
                    if result.is_ok() {
                        let _ = hops_tx.send(NextHops::Hub(core_network));
                    }
                    result
                };
                tokio::join!(
                    attach_then_route,
                    reconciler.converge(hops_rx, subnets.clone(), reconcile_deadline),
                )
            }
        };

        match attachment {
            Ok(attachment) => report.attachment = Some(attachment),
            Err(e) => report.fail("attachment", &e),
        }
        match routes {
            Ok(routes) => report.routes = Some(routes),
            Err(e) => report.fail("routes", &e),
        }
        report
    }

    async fn partition(&self) -> ProvisionResult<(VpcId, watch::Receiver<Vec<Subnet>>)> {
        let request = PartitionRequest {
            network: self.network.name.clone(),
            region: self.network.region.clone(),
            cidr: self.network.cidr,
            availability_zones: self.network.availability_zones,
            layout: self.network.layout.clone(),
        };
        let partitioned = self.cloud.partitioner.partition(&request).await?;
        debug!(network = %self.network.name, vpc = %partitioned.vpc, "network partitioned");
        Ok((partitioned.vpc, partitioned.subnets))
    }

    fn reconciler(&self, policy: EgressPolicy) -> RouteReconciler {
        RouteReconciler::new(
            self.network.name.clone(),
            self.cloud.routes.clone(),
            policy,
            self.observer.clone(),
        )
        .with_metrics(self.metrics.clone())
    }

    /// Poll the engine until every zone has an endpoint, the reconciler stops
    /// listening, or the poll limit runs out. Dropping `hops` closes the feed.
    async fn poll_endpoints(
        &self,
        vpc: &VpcId,
        zones: BTreeSet<AvailabilityZone>,
        hops: watch::Sender<NextHops>,
    ) {
        let mut ticker = interval(self.config.endpoint_poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        for poll in 1..=self.config.endpoint_poll_limit {
            ticker.tick().await;
            if hops.is_closed() {
                return;
            }

            match self.cloud.engine.status(vpc).await {
                Ok(statuses) => {
                    let resolved = resolve_zone_endpoints(&statuses);
                    let covered = zones.iter().all(|z| resolved.get(z).is_some());
                    hops.send_if_modified(|current| {
                        let next = NextHops::Endpoints(resolved);
                        if *current == next {
                            false
                        } else {
                            *current = next;
                            true
                        }
                    });
                    if covered {
                        debug!(network = %self.network.name, poll, "every zone has an endpoint");
                        return;
                    }
                }
                Err(e) => warn!(network = %self.network.name, error = %e, "engine status query failed"),
            }
        }

        debug!(
            network = %self.network.name,
            limit = self.config.endpoint_poll_limit,
            "endpoint polling stopped with zones still pending"
        );
    }
}

/// Failure recorded against a network
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub stage: String,
    pub class: ErrorClass,
    pub message: String,
}

/// Outcome for one member network
#[derive(Debug, Clone, Serialize)]
pub struct NetworkReport {
    pub network: String,
    pub kind: NetworkKind,
    pub region: Region,
    pub segment: SegmentName,
    pub vpc: Option<VpcId>,
    pub attachment: Option<Attachment>,
    pub routes: Option<ReconcileReport>,
    pub failures: Vec<Failure>,
}

impl NetworkReport {
    fn new(network: &MemberNetwork) -> Self {
        Self {
            network: network.name.clone(),
            kind: network.kind,
            region: network.region.clone(),
            segment: network.segment.clone(),
            vpc: None,
            attachment: None,
            routes: None,
            failures: Vec::new(),
        }
    }

    fn fail(&mut self, stage: &str, error: &ProvisionError) {
        warn!(
            network = %self.network,
            stage,
            class = error.class().as_str(),
            error = %error,
            "member network failed"
        );
        self.failures.push(Failure {
            stage: stage.to_string(),
            class: error.class(),
            message: error.to_string(),
        });
    }

    /// Attached and every subnet routed
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
            && self.attachment.is_some()
            && self.routes.as_ref().is_some_and(ReconcileReport::is_complete)
    }
}

/// Outcome of the policy step
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum PolicyReport {
    Published {
        revision: u64,
        submitted_at: DateTime<Utc>,
        document: PolicyDocument,
    },
    /// A referenced attachment never resolved, nothing was submitted
    Blocked { missing: Vec<String>, reason: String },
    Failed { class: ErrorClass, message: String },
}

/// Outcome of a deployment
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentReport {
    pub networks: Vec<NetworkReport>,
    pub policy: PolicyReport,
    pub routes: ReconcileSnapshot,
}

impl DeploymentReport {
    pub fn network(&self, name: &str) -> Option<&NetworkReport> {
        self.networks.iter().find(|n| n.network == name)
    }

    pub fn is_success(&self) -> bool {
        matches!(self.policy, PolicyReport::Published { .. })
            && self.networks.iter().all(NetworkReport::is_complete)
    }
}

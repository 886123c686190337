//! AZ-aware route reconciliation
//!
//! Wires each subnet's egress route through the next hop serving its zone.
//! Planning is pure; application goes through [`RouteTableApi`] and is keyed
//! by `(route table, destination)` so re-running a pass never duplicates a
//! route. Subnets whose route table or next hop is not known yet are skipped
//! and picked up on a later pass.

use crate::observer::ReconcileObserver;
use crate::provider::RouteTableApi;
use crate::status::ZoneEndpoints;
use cloudwan_common::metrics::ReconcileMetrics;
use cloudwan_common::{
    AvailabilityZone, ProvisionResult, ResourceArn, RouteBinding, RouteKey, RouteTarget, Subnet,
    SubnetId, SubnetRole,
};
use ipnet::{IpNet, Ipv4Net};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::info;

/// Which destination each subnet role sends to its next hop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EgressPolicy {
    rules: Vec<(SubnetRole, IpNet)>,
}

impl EgressPolicy {
    /// Inspection network: isolated subnets send everything, public subnets
    /// send only organisation traffic through the engine
    pub fn inspection(organisation_cidr: IpNet) -> Self {
        Self {
            rules: vec![
                (SubnetRole::Isolated, default_route()),
                (SubnetRole::Public, organisation_cidr),
            ],
        }
    }

    /// Workload network: isolated subnets send everything to the hub
    pub fn workload() -> Self {
        Self {
            rules: vec![(SubnetRole::Isolated, default_route())],
        }
    }

    /// Destination routed for `role`, `None` when the role is left alone
    pub fn destination(&self, role: SubnetRole) -> Option<IpNet> {
        self.rules
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, destination)| *destination)
    }
}

fn default_route() -> IpNet {
    // 0.0.0.0/0
    IpNet::V4(Ipv4Net::default())
}

/// Next hops available to a network's subnets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NextHops {
    /// Nothing known yet
    #[default]
    Pending,
    /// Per-zone inspection endpoints
    Endpoints(ZoneEndpoints),
    /// The hub, once the network's attachment is admitted
    Hub(ResourceArn),
}

impl NextHops {
    /// Target serving `zone`, or why there is none yet
    pub fn target_for(&self, zone: &AvailabilityZone) -> Result<RouteTarget, SkipReason> {
        match self {
            Self::Pending => Err(SkipReason::EndpointPending),
            Self::Endpoints(zones) => match zones.get(zone) {
                Some(endpoint) => Ok(RouteTarget::Endpoint(endpoint.clone())),
                None if zones.is_observed(zone) => Err(SkipReason::EndpointPending),
                None => Err(SkipReason::ZoneUnplaced),
            },
            Self::Hub(arn) => Ok(RouteTarget::CoreNetwork(arn.clone())),
        }
    }
}

/// Why a subnet got no route this pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Route table handle not assigned yet
    RouteTablePending,
    /// Zone known but its next hop is not ready
    EndpointPending,
    /// Engine never reported on this zone
    ZoneUnplaced,
    /// Route table shared with a subnet routed to a different next hop
    ConflictingRouteTable,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RouteTablePending => "route-table-pending",
            Self::EndpointPending => "endpoint-pending",
            Self::ZoneUnplaced => "zone-unplaced",
            Self::ConflictingRouteTable => "conflicting-route-table",
        }
    }
}

/// Subnet without a route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSubnet {
    pub subnet: SubnetId,
    pub zone: AvailabilityZone,
    pub reason: SkipReason,
}

/// Desired bindings plus the subnets that cannot be bound yet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePlan {
    pub bindings: Vec<RouteBinding>,
    pub skipped: Vec<SkippedSubnet>,
}

/// Plan routes for `subnets`.
///
/// A subnet is bound only when its zone has a next hop and its route table is
/// known; everything else lands in `skipped`. Subnets whose role the policy
/// does not route are ignored. Subnets sharing a route table must agree on
/// the target for each destination; when they do not, none of them is bound.
pub fn plan(next_hops: &NextHops, subnets: &[Subnet], policy: &EgressPolicy) -> RoutePlan {
    let mut plan = RoutePlan::default();

    for subnet in subnets {
        let Some(destination) = policy.destination(subnet.role) else {
            continue;
        };

        let skip = |reason| SkippedSubnet {
            subnet: subnet.id.clone(),
            zone: subnet.zone.clone(),
            reason,
        };

        let target = match next_hops.target_for(&subnet.zone) {
            Ok(target) => target,
            Err(reason) => {
                plan.skipped.push(skip(reason));
                continue;
            }
        };
        let Some(route_table) = subnet.route_table.clone() else {
            plan.skipped.push(skip(SkipReason::RouteTablePending));
            continue;
        };

        plan.bindings.push(RouteBinding {
            subnet: subnet.id.clone(),
            zone: subnet.zone.clone(),
            route_table,
            destination,
            target,
        });
    }

    let mut targets: HashMap<RouteKey, &RouteTarget> = HashMap::new();
    let mut conflicting: HashSet<RouteKey> = HashSet::new();
    for binding in &plan.bindings {
        let key = binding.key();
        match targets.get(&key) {
            Some(target) if **target != binding.target => {
                conflicting.insert(key);
            }
            Some(_) => {}
            None => {
                targets.insert(key, &binding.target);
            }
        }
    }

    if !conflicting.is_empty() {
        let (clashing, bindings): (Vec<_>, Vec<_>) = std::mem::take(&mut plan.bindings)
            .into_iter()
            .partition(|binding| conflicting.contains(&binding.key()));
        plan.bindings = bindings;
        plan.skipped
            .extend(clashing.into_iter().map(|binding| SkippedSubnet {
                subnet: binding.subnet,
                zone: binding.zone,
                reason: SkipReason::ConflictingRouteTable,
            }));
    }

    plan
}

/// Result of applying one binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum RouteOutcome {
    Created,
    Replaced { previous: RouteTarget },
    Unchanged,
}

/// A binding and what applying it did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRoute {
    pub binding: RouteBinding,
    #[serde(flatten)]
    pub outcome: RouteOutcome,
}

/// Routes applied and subnets still skipped
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub applied: Vec<AppliedRoute>,
    pub skipped: Vec<SkippedSubnet>,
}

impl ReconcileReport {
    pub fn created(&self) -> usize {
        self.count(|o| matches!(o, RouteOutcome::Created))
    }

    pub fn replaced(&self) -> usize {
        self.count(|o| matches!(o, RouteOutcome::Replaced { .. }))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, RouteOutcome::Unchanged))
    }

    /// Every subnet that needs a route has one
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    fn count(&self, f: impl Fn(&RouteOutcome) -> bool) -> usize {
        self.applied.iter().filter(|a| f(&a.outcome)).count()
    }

    /// Fold a later pass into this report.
    ///
    /// A route's first change is kept over later no-op passes; `skipped`
    /// always reflects the latest pass.
    fn absorb(&mut self, pass: ReconcileReport) {
        let index: HashMap<_, _> = self
            .applied
            .iter()
            .enumerate()
            .map(|(i, a)| (a.binding.key(), i))
            .collect();

        for applied in pass.applied {
            match index.get(&applied.binding.key()) {
                Some(&i) if applied.outcome == RouteOutcome::Unchanged => {
                    self.applied[i].binding = applied.binding;
                }
                Some(&i) => self.applied[i] = applied,
                None => self.applied.push(applied),
            }
        }
        self.skipped = pass.skipped;
    }
}

/// Applies route plans for one network
pub struct RouteReconciler {
    network: String,
    routes: Arc<dyn RouteTableApi>,
    policy: EgressPolicy,
    observer: Arc<dyn ReconcileObserver>,
    metrics: Arc<ReconcileMetrics>,
}

impl RouteReconciler {
    pub fn new(
        network: impl Into<String>,
        routes: Arc<dyn RouteTableApi>,
        policy: EgressPolicy,
        observer: Arc<dyn ReconcileObserver>,
    ) -> Self {
        Self {
            network: network.into(),
            routes,
            policy,
            observer,
            metrics: Arc::new(ReconcileMetrics::new()),
        }
    }

    /// Share counters with other reconcilers
    pub fn with_metrics(mut self, metrics: Arc<ReconcileMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<ReconcileMetrics> {
        &self.metrics
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    /// Run one pass over the current inputs
    pub async fn reconcile(
        &self,
        next_hops: &NextHops,
        subnets: &[Subnet],
    ) -> ProvisionResult<ReconcileReport> {
        let plan = plan(next_hops, subnets, &self.policy);
        self.metrics.passes.inc();

        let mut report = ReconcileReport::default();
        for binding in plan.bindings {
            let outcome = match self.routes.current_route(&binding.key()).await? {
                None => {
                    self.routes.create_route(&binding).await?;
                    self.metrics.routes_created.inc();
                    RouteOutcome::Created
                }
                Some(current) if current == binding.target => {
                    self.metrics.routes_unchanged.inc();
                    RouteOutcome::Unchanged
                }
                Some(previous) => {
                    self.routes.replace_route(&binding).await?;
                    self.metrics.routes_replaced.inc();
                    RouteOutcome::Replaced { previous }
                }
            };
            self.observer.route_applied(&self.network, &binding, &outcome);
            report.applied.push(AppliedRoute { binding, outcome });
        }

        for skipped in &plan.skipped {
            self.metrics.subnets_deferred.inc();
            self.observer.subnet_deferred(&self.network, skipped);
        }
        report.skipped = plan.skipped;

        Ok(report)
    }

    /// Reconcile on every change of either feed.
    ///
    /// Returns once every subnet is routed, once both feeds are closed, or at
    /// `deadline`. Subnets still skipped at that point are reported unrouted;
    /// that is a partial success, not an error.
    pub async fn converge(
        &self,
        mut next_hops: watch::Receiver<NextHops>,
        mut subnets: watch::Receiver<Vec<Subnet>>,
        deadline: Option<Duration>,
    ) -> ProvisionResult<ReconcileReport> {
        let deadline = deadline.map(|d| Instant::now() + d);
        let mut hops_open = true;
        let mut subnets_open = true;
        let mut total = ReconcileReport::default();

        loop {
            let hops = next_hops.borrow_and_update().clone();
            let current = subnets.borrow_and_update().clone();
            let pass = self.reconcile(&hops, &current).await?;
            let done = !current.is_empty() && pass.is_complete();
            total.absorb(pass);

            if done || !(hops_open || subnets_open) {
                break;
            }

            let expired = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                changed = next_hops.changed(), if hops_open => {
                    hops_open = changed.is_ok();
                }
                changed = subnets.changed(), if subnets_open => {
                    subnets_open = changed.is_ok();
                }
                _ = expired => break,
            }
        }

        for skipped in &total.skipped {
            self.metrics.subnets_unrouted.inc();
            self.observer.subnet_unrouted(&self.network, skipped);
        }

        info!(
            network = %self.network,
            created = total.created(),
            replaced = total.replaced(),
            unrouted = total.skipped.len(),
            "route reconciliation finished"
        );

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{resolve_zone_endpoints, EngineStatus, SyncAttachment, SyncState};
    use async_trait::async_trait;
    use cloudwan_common::{AccountId, EndpointId, HubId, RouteTableId};
    use parking_lot::Mutex;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct MemoryRoutes {
        routes: Mutex<BTreeMap<RouteKey, RouteTarget>>,
        writes: Mutex<usize>,
    }

    #[async_trait]
    impl RouteTableApi for MemoryRoutes {
        async fn current_route(&self, key: &RouteKey) -> ProvisionResult<Option<RouteTarget>> {
            Ok(self.routes.lock().get(key).cloned())
        }

        async fn create_route(&self, binding: &RouteBinding) -> ProvisionResult<()> {
            *self.writes.lock() += 1;
            self.routes.lock().insert(binding.key(), binding.target.clone());
            Ok(())
        }

        async fn replace_route(&self, binding: &RouteBinding) -> ProvisionResult<()> {
            *self.writes.lock() += 1;
            self.routes.lock().insert(binding.key(), binding.target.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recording {
        deferred: Mutex<Vec<SkipReason>>,
        unrouted: Mutex<Vec<SubnetId>>,
    }

    impl ReconcileObserver for Recording {
        fn subnet_deferred(&self, _network: &str, skipped: &SkippedSubnet) {
            self.deferred.lock().push(skipped.reason);
        }

        fn subnet_unrouted(&self, _network: &str, skipped: &SkippedSubnet) {
            self.unrouted.lock().push(skipped.subnet.clone());
        }
    }

    fn az(name: &str) -> AvailabilityZone {
        AvailabilityZone::new(name).unwrap()
    }

    fn subnet(id: &str, zone: &str, role: SubnetRole, table: Option<&str>) -> Subnet {
        Subnet {
            id: SubnetId::new(id).unwrap(),
            name: id.to_string(),
            zone: az(zone),
            cidr: "10.200.0.0/24".parse().unwrap(),
            role,
            route_table: table.map(|t| RouteTableId::new(t).unwrap()),
        }
    }

    fn endpoints(pairs: &[(&str, &str)]) -> NextHops {
        NextHops::Endpoints(
            pairs
                .iter()
                .map(|(z, e)| (az(z), EndpointId::new(*e).unwrap()))
                .collect(),
        )
    }

    fn org() -> IpNet {
        "10.0.0.0/8".parse().unwrap()
    }

    fn inspection_subnets() -> Vec<Subnet> {
        vec![
            subnet("iso-a", "us-east-1a", SubnetRole::Isolated, Some("rtb-iso-a")),
            subnet("iso-b", "us-east-1b", SubnetRole::Isolated, Some("rtb-iso-b")),
            subnet("fw-a", "us-east-1a", SubnetRole::Private, Some("rtb-fw-a")),
            subnet("pub-a", "us-east-1a", SubnetRole::Public, Some("rtb-pub-a")),
            subnet("pub-b", "us-east-1b", SubnetRole::Public, Some("rtb-pub-b")),
        ]
    }

    fn reconciler(routes: Arc<MemoryRoutes>, observer: Arc<Recording>) -> RouteReconciler {
        RouteReconciler::new("inspection-us", routes, EgressPolicy::inspection(org()), observer)
    }

    #[test]
    fn test_plan_routes_by_role() {
        let hops = endpoints(&[("us-east-1a", "vpce-a"), ("us-east-1b", "vpce-b")]);
        let plan = plan(&hops, &inspection_subnets(), &EgressPolicy::inspection(org()));

        assert_eq!(plan.bindings.len(), 4);
        assert!(plan.skipped.is_empty());

        let iso_a = plan.bindings.iter().find(|b| b.subnet.as_str() == "iso-a").unwrap();
        assert_eq!(iso_a.destination.to_string(), "0.0.0.0/0");
        assert_eq!(iso_a.target, RouteTarget::Endpoint(EndpointId::new("vpce-a").unwrap()));

        let pub_b = plan.bindings.iter().find(|b| b.subnet.as_str() == "pub-b").unwrap();
        assert_eq!(pub_b.destination, org());
        assert_eq!(pub_b.target, RouteTarget::Endpoint(EndpointId::new("vpce-b").unwrap()));

        assert!(plan.bindings.iter().all(|b| b.subnet.as_str() != "fw-a"));
    }

    #[test]
    fn test_plan_skip_reasons() {
        let zones = resolve_zone_endpoints(&[EngineStatus {
            sync_states: vec![
                SyncState {
                    availability_zone: az("us-east-1a"),
                    attachments: vec![SyncAttachment::ready(EndpointId::new("vpce-a").unwrap())],
                },
                SyncState {
                    availability_zone: az("us-east-1b"),
                    attachments: vec![SyncAttachment::creating()],
                },
            ],
        }]);
        let subnets = vec![
            subnet("iso-a", "us-east-1a", SubnetRole::Isolated, None),
            subnet("iso-b", "us-east-1b", SubnetRole::Isolated, Some("rtb-b")),
            subnet("iso-c", "us-east-1c", SubnetRole::Isolated, Some("rtb-c")),
        ];

        let plan = plan(&NextHops::Endpoints(zones), &subnets, &EgressPolicy::workload());
        assert!(plan.bindings.is_empty());
        let reasons: Vec<_> = plan.skipped.iter().map(|s| s.reason).collect();
        assert_eq!(
            reasons,
            vec![
                SkipReason::RouteTablePending,
                SkipReason::EndpointPending,
                SkipReason::ZoneUnplaced,
            ]
        );
    }

    #[test]
    fn test_plan_hub_next_hop() {
        let arn = ResourceArn::core_network(
            &AccountId::new("123456789012").unwrap(),
            &HubId::new("core-network-0f").unwrap(),
        );
        let subnets = vec![
            subnet("wl-a", "eu-west-1a", SubnetRole::Isolated, Some("rtb-a")),
            subnet("wl-b", "eu-west-1b", SubnetRole::Isolated, Some("rtb-b")),
        ];

        let pending = plan(&NextHops::Pending, &subnets, &EgressPolicy::workload());
        assert_eq!(pending.skipped.len(), 2);

        let admitted = plan(&NextHops::Hub(arn.clone()), &subnets, &EgressPolicy::workload());
        assert_eq!(admitted.bindings.len(), 2);
        assert!(admitted
            .bindings
            .iter()
            .all(|b| b.target == RouteTarget::CoreNetwork(arn.clone())));
    }

    #[test]
    fn test_plan_shared_table_with_split_targets() {
        let hops = endpoints(&[("us-east-1a", "vpce-a"), ("us-east-1b", "vpce-b")]);
        let subnets = vec![
            subnet("pub-a", "us-east-1a", SubnetRole::Public, Some("rtb-shared")),
            subnet("pub-b", "us-east-1b", SubnetRole::Public, Some("rtb-shared")),
            subnet("iso-a", "us-east-1a", SubnetRole::Isolated, Some("rtb-iso-a")),
        ];

        let plan = plan(&hops, &subnets, &EgressPolicy::inspection(org()));
        assert_eq!(plan.bindings.len(), 1);
        assert_eq!(plan.bindings[0].subnet.as_str(), "iso-a");

        let mut skipped: Vec<_> = plan.skipped.iter().map(|s| s.subnet.as_str()).collect();
        skipped.sort();
        assert_eq!(skipped, vec!["pub-a", "pub-b"]);
        assert!(plan
            .skipped
            .iter()
            .all(|s| s.reason == SkipReason::ConflictingRouteTable));
    }

    #[test]
    fn test_plan_shared_table_with_same_target() {
        let arn = ResourceArn::core_network(
            &AccountId::new("123456789012").unwrap(),
            &HubId::new("core-network-0f").unwrap(),
        );
        let subnets = vec![
            subnet("wl-a", "eu-west-1a", SubnetRole::Isolated, Some("rtb-shared")),
            subnet("wl-b", "eu-west-1b", SubnetRole::Isolated, Some("rtb-shared")),
        ];

        let plan = plan(&NextHops::Hub(arn), &subnets, &EgressPolicy::workload());
        assert_eq!(plan.bindings.len(), 2);
        assert!(plan.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_shared_table_does_not_flip() {
        let routes = Arc::new(MemoryRoutes::default());
        let observer = Arc::new(Recording::default());
        let rec = reconciler(routes.clone(), observer.clone());
        let hops = endpoints(&[("us-east-1a", "vpce-a"), ("us-east-1b", "vpce-b")]);
        let subnets = vec![
            subnet("pub-a", "us-east-1a", SubnetRole::Public, Some("rtb-shared")),
            subnet("pub-b", "us-east-1b", SubnetRole::Public, Some("rtb-shared")),
        ];

        for _ in 0..2 {
            let report = rec.reconcile(&hops, &subnets).await.unwrap();
            assert!(report.applied.is_empty());
            assert_eq!(report.skipped.len(), 2);
        }

        assert_eq!(*routes.writes.lock(), 0);
        assert!(routes.routes.lock().is_empty());
        assert_eq!(
            *observer.deferred.lock(),
            vec![SkipReason::ConflictingRouteTable; 4]
        );
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let routes = Arc::new(MemoryRoutes::default());
        let rec = reconciler(routes.clone(), Arc::new(Recording::default()));
        let hops = endpoints(&[("us-east-1a", "vpce-a"), ("us-east-1b", "vpce-b")]);

        let first = rec.reconcile(&hops, &inspection_subnets()).await.unwrap();
        assert_eq!(first.created(), 4);

        let second = rec.reconcile(&hops, &inspection_subnets()).await.unwrap();
        assert_eq!(second.created(), 0);
        assert_eq!(second.unchanged(), 4);
        assert_eq!(routes.routes.lock().len(), 4);
        assert_eq!(*routes.writes.lock(), 4);
    }

    #[tokio::test]
    async fn test_reconcile_replaces_stale_target() {
        let routes = Arc::new(MemoryRoutes::default());
        let rec = reconciler(routes.clone(), Arc::new(Recording::default()));

        rec.reconcile(&endpoints(&[("us-east-1a", "vpce-old")]), &inspection_subnets())
            .await
            .unwrap();
        let report = rec
            .reconcile(&endpoints(&[("us-east-1a", "vpce-new")]), &inspection_subnets())
            .await
            .unwrap();

        assert_eq!(report.replaced(), 2);
        assert!(routes
            .routes
            .lock()
            .values()
            .all(|t| *t == RouteTarget::Endpoint(EndpointId::new("vpce-new").unwrap())));
        assert_eq!(rec.metrics().snapshot().routes_replaced, 2);
    }

    #[tokio::test]
    async fn test_converge_routes_late_zone() {
        let routes = Arc::new(MemoryRoutes::default());
        let observer = Arc::new(Recording::default());
        let rec = reconciler(routes.clone(), observer.clone());

        let (hops_tx, hops_rx) = watch::channel(endpoints(&[("us-east-1a", "vpce-a")]));
        let (_subnets_tx, subnets_rx) = watch::channel(inspection_subnets());

        let task = tokio::spawn(async move { rec.converge(hops_rx, subnets_rx, None).await });
        tokio::task::yield_now().await;
        hops_tx
            .send(endpoints(&[("us-east-1a", "vpce-a"), ("us-east-1b", "vpce-b")]))
            .unwrap();

        let report = task.await.unwrap().unwrap();
        assert!(report.is_complete());
        assert_eq!(report.created(), 4);
        assert_eq!(routes.routes.lock().len(), 4);
        assert!(observer.unrouted.lock().is_empty());
    }

    #[tokio::test]
    async fn test_converge_reports_unrouted_when_feeds_close() {
        let routes = Arc::new(MemoryRoutes::default());
        let observer = Arc::new(Recording::default());
        let rec = reconciler(routes.clone(), observer.clone());

        let (hops_tx, hops_rx) = watch::channel(endpoints(&[("us-east-1a", "vpce-a")]));
        let (subnets_tx, subnets_rx) = watch::channel(inspection_subnets());
        drop(hops_tx);
        drop(subnets_tx);

        let report = rec.converge(hops_rx, subnets_rx, None).await.unwrap();
        assert_eq!(report.created(), 2);
        assert_eq!(report.skipped.len(), 2);
        assert!(report.skipped.iter().all(|s| s.reason == SkipReason::ZoneUnplaced));
        assert_eq!(observer.unrouted.lock().len(), 2);
        assert_eq!(rec.metrics().snapshot().subnets_unrouted, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_converge_stops_at_deadline() {
        let routes = Arc::new(MemoryRoutes::default());
        let observer = Arc::new(Recording::default());
        let rec = reconciler(routes, observer.clone());

        let (_hops_tx, hops_rx) = watch::channel(NextHops::Pending);
        let (_subnets_tx, subnets_rx) = watch::channel(inspection_subnets());

        let report = rec
            .converge(hops_rx, subnets_rx, Some(Duration::from_secs(30)))
            .await
            .unwrap();
        assert_eq!(report.skipped.len(), 4);
        assert!(report.applied.is_empty());
        assert_eq!(observer.unrouted.lock().len(), 4);
        assert!(observer
            .deferred
            .lock()
            .iter()
            .all(|r| *r == SkipReason::EndpointPending));
    }
}

//! End-to-end deployments against the in-memory cloud

use cloudwan_common::{AvailabilityZone, ErrorClass, RouteTarget, Topology};
use cloudwan_inspection::SkipReason;
use cloudwan_orchestrator::policy::SegmentAction;
use cloudwan_orchestrator::{
    parse_topology, CloudApis, DeploymentReport, Orchestrator, OrchestratorConfig, PolicyReport,
    SimulatedCloud, SimulationSettings, TopologyFormat,
};
use std::sync::Arc;
use std::time::Duration;

const TOPOLOGY: &str = r#"
hub:
  name: GlobalNet
  regions: [eu-west-1, us-east-1]
organisation_cidr: 10.0.0.0/8
segments:
  - name: prod
  - name: nonprod
  - name: sharedservices
networks:
  - name: inspection-us
    kind: inspection
    region: us-east-1
    cidr: 10.200.0.0/16
    segment: sharedservices
  - name: inspection-eu
    kind: inspection
    region: eu-west-1
    cidr: 10.201.0.0/16
    segment: sharedservices
  - name: workload-prod-us
    kind: workload
    region: us-east-1
    cidr: 10.0.0.0/22
    segment: prod
  - name: workload-nonprod-eu
    kind: workload
    region: eu-west-1
    cidr: 10.0.8.0/22
    segment: nonprod
share:
  - segment: sharedservices
    share_with: "*"
routes:
  - segment: prod
    via: [inspection-us, inspection-eu]
"#;

fn topology() -> Topology {
    Topology::build(parse_topology(TOPOLOGY, TopologyFormat::Yaml).unwrap()).unwrap()
}

fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        admission_poll_ms: 1_000,
        endpoint_poll_ms: 1_000,
        endpoint_poll_limit: 5,
        attachment_deadline_secs: Some(600),
        reconcile_deadline_secs: Some(600),
    }
}

async fn deploy(cloud: SimulatedCloud) -> (Arc<SimulatedCloud>, DeploymentReport) {
    let cloud = Arc::new(cloud);
    let orchestrator = Orchestrator::new(
        topology(),
        CloudApis::from_backend(cloud.clone()),
        cloud.identity().clone(),
        config(),
    );
    let report = orchestrator.deploy().await;
    (cloud, report)
}

#[tokio::test(start_paused = true)]
async fn test_full_deployment_converges() {
    let (cloud, report) = deploy(SimulatedCloud::for_topology(&topology()).unwrap()).await;

    assert!(report.is_success(), "{:#?}", report);
    assert_eq!(report.networks.len(), 4);
    assert_eq!(report.routes.routes_created, 12);
    assert_eq!(report.routes.subnets_unrouted, 0);
    assert_eq!(cloud.routes().len(), 12);

    for name in ["inspection-us", "inspection-eu"] {
        let routes = report.network(name).unwrap().routes.as_ref().unwrap();
        assert_eq!(routes.applied.len(), 4, "{}", name);
        for applied in &routes.applied {
            match &applied.binding.target {
                RouteTarget::Endpoint(endpoint) => {
                    assert!(endpoint.as_str().ends_with(applied.binding.zone.as_str()))
                }
                other => panic!("{} routed to {}", name, other),
            }
        }
    }

    let core_network = cloud.identity().core_network_arn();
    let routes = report.network("workload-prod-us").unwrap().routes.as_ref().unwrap();
    assert_eq!(routes.applied.len(), 2);
    assert!(routes
        .applied
        .iter()
        .all(|a| a.binding.target == RouteTarget::CoreNetwork(core_network.clone())));
}

#[tokio::test(start_paused = true)]
async fn test_slow_cloud_still_converges() {
    let cloud = SimulatedCloud::for_topology(&topology())
        .unwrap()
        .with_settings(SimulationSettings {
            route_table_delay: Duration::from_secs(20),
            endpoint_ready_after: 3,
            admission_after: 8,
        });
    let (cloud, report) = deploy(cloud).await;

    assert!(report.is_success(), "{:#?}", report);
    assert_eq!(report.routes.routes_created, 12);
    assert_eq!(cloud.routes().len(), 12);
    assert!(matches!(report.policy, PolicyReport::Published { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_policy_routes_through_inspection_in_order() {
    let (cloud, report) = deploy(SimulatedCloud::for_topology(&topology()).unwrap()).await;
    let attachments = cloud.attachments();

    let document = match &report.policy {
        PolicyReport::Published { revision, document, .. } => {
            assert_eq!(*revision, 1);
            document
        }
        other => panic!("policy not published: {:?}", other),
    };

    let destinations = document
        .segment_actions
        .iter()
        .find_map(|action| match action {
            SegmentAction::CreateRoute { destinations, segment, .. } if segment.as_str() == "prod" => {
                Some(destinations.clone())
            }
            _ => None,
        })
        .unwrap();
    assert_eq!(
        destinations,
        vec![
            attachments["inspection-us"].clone(),
            attachments["inspection-eu"].clone()
        ]
    );
    assert_eq!(cloud.policies().len(), 1);
    assert_eq!(cloud.policies()[0], document.to_json().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_withheld_zone_leaves_other_zone_routed() {
    let cloud = SimulatedCloud::for_topology(&topology())
        .unwrap()
        .withhold_zone(AvailabilityZone::new("us-east-1b").unwrap());
    let (_cloud, report) = deploy(cloud).await;

    let network = report.network("inspection-us").unwrap();
    assert!(network.attachment.is_some());
    assert!(network.failures.is_empty());

    let routes = network.routes.as_ref().unwrap();
    assert_eq!(routes.applied.len(), 2);
    assert!(routes.applied.iter().all(|a| a.binding.zone.as_str() == "us-east-1a"));
    assert_eq!(routes.skipped.len(), 2);
    assert!(routes
        .skipped
        .iter()
        .all(|s| s.reason == SkipReason::ZoneUnplaced && s.zone.as_str() == "us-east-1b"));

    assert_eq!(report.routes.subnets_unrouted, 2);
    assert!(report.network("inspection-eu").unwrap().is_complete());
    assert!(matches!(report.policy, PolicyReport::Published { .. }));
    assert!(!report.is_success());
}

#[tokio::test(start_paused = true)]
async fn test_rejected_segment_fails_only_its_network() {
    let cloud = SimulatedCloud::for_topology(&topology())
        .unwrap()
        .reject_segment("nonprod");
    let (_cloud, report) = deploy(cloud).await;

    let rejected = report.network("workload-nonprod-eu").unwrap();
    assert!(rejected.attachment.is_none());
    assert_eq!(rejected.failures.len(), 1);
    assert_eq!(rejected.failures[0].stage, "attachment");
    assert_eq!(rejected.failures[0].class, ErrorClass::Fatal);

    let routes = rejected.routes.as_ref().unwrap();
    assert!(routes.applied.is_empty());
    assert!(routes.skipped.iter().all(|s| s.reason == SkipReason::EndpointPending));

    for name in ["inspection-us", "inspection-eu", "workload-prod-us"] {
        assert!(report.network(name).unwrap().is_complete(), "{}", name);
    }
    assert!(matches!(report.policy, PolicyReport::Published { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_failed_inspection_attachment_blocks_policy() {
    let cloud = SimulatedCloud::for_topology(&topology())
        .unwrap()
        .reject_segment("sharedservices");
    let (cloud, report) = deploy(cloud).await;

    match &report.policy {
        PolicyReport::Blocked { missing, .. } => {
            assert_eq!(missing, &vec!["inspection-us".to_string(), "inspection-eu".to_string()])
        }
        other => panic!("expected blocked policy, got {:?}", other),
    }
    assert!(cloud.policies().is_empty());

    // Endpoints do not depend on admission
    assert_eq!(
        report.network("inspection-us").unwrap().routes.as_ref().unwrap().applied.len(),
        4
    );
    assert!(report.network("workload-prod-us").unwrap().is_complete());
}

#[tokio::test(start_paused = true)]
async fn test_deferred_route_tables_reported_unrouted() {
    let cloud = SimulatedCloud::for_topology(&topology())
        .unwrap()
        .defer_route_tables("workload-prod-us");
    let (cloud, report) = deploy(cloud).await;

    let network = report.network("workload-prod-us").unwrap();
    assert!(network.attachment.is_some());
    let routes = network.routes.as_ref().unwrap();
    assert!(routes.applied.is_empty());
    assert_eq!(routes.skipped.len(), 2);
    assert!(routes
        .skipped
        .iter()
        .all(|s| s.reason == SkipReason::RouteTablePending));
    assert_eq!(cloud.routes().len(), 10);
}

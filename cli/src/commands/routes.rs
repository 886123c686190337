//! Routes command

use super::read_json;
use crate::output::{OutputFormat, Tabulate};
use anyhow::{anyhow, bail};
use cloudwan_common::{NetworkKind, ResourceArn, Subnet};
use cloudwan_inspection::{plan, resolve_zone_endpoints, EgressPolicy, EngineStatus, NextHops, RoutePlan};
use cloudwan_orchestrator::load_topology;
use serde::Serialize;
use std::path::PathBuf;
use tabled::settings::Style;
use tabled::{Table, Tabled};

pub struct RoutesArgs {
    pub file: PathBuf,
    pub network: String,
    pub status: Option<PathBuf>,
    pub subnets: PathBuf,
    pub core_network: Option<String>,
}

#[derive(Tabled)]
struct RouteRow {
    subnet: String,
    zone: String,
    route_table: String,
    destination: String,
    target: String,
}

#[derive(Serialize)]
pub struct RoutesView {
    network: String,
    #[serde(flatten)]
    plan: RoutePlan,
}

impl Tabulate for RoutesView {
    fn tabulate(&self) -> String {
        let mut rows: Vec<RouteRow> = self
            .plan
            .bindings
            .iter()
            .map(|b| RouteRow {
                subnet: b.subnet.to_string(),
                zone: b.zone.to_string(),
                route_table: b.route_table.to_string(),
                destination: b.destination.to_string(),
                target: b.target.to_string(),
            })
            .collect();
        rows.extend(self.plan.skipped.iter().map(|s| RouteRow {
            subnet: s.subnet.to_string(),
            zone: s.zone.to_string(),
            route_table: "-".into(),
            destination: "-".into(),
            target: format!("skipped: {}", s.reason.as_str()),
        }));

        format!(
            "Routes for {} ({} bound, {} skipped)\n{}",
            self.network,
            self.plan.bindings.len(),
            self.plan.skipped.len(),
            Table::new(rows).with(Style::rounded())
        )
    }
}

pub fn handle(args: RoutesArgs, format: OutputFormat) -> anyhow::Result<()> {
    let topology = load_topology(&args.file)?;
    let network = topology
        .network(&args.network)
        .ok_or_else(|| anyhow!("topology has no network named {}", args.network))?;
    let subnets: Vec<Subnet> = read_json(&args.subnets)?;

    let (hops, policy) = match network.kind {
        NetworkKind::Inspection => {
            let Some(status) = &args.status else {
                bail!("inspection network {} needs --status", network.name);
            };
            let statuses: Vec<EngineStatus> = read_json(status)?;
            (
                NextHops::Endpoints(resolve_zone_endpoints(&statuses)),
                EgressPolicy::inspection(topology.organisation_cidr()),
            )
        }
        NetworkKind::Workload => {
            let hops = match &args.core_network {
                Some(arn) => NextHops::Hub(ResourceArn::parse(arn)?),
                None => NextHops::Pending,
            };
            (hops, EgressPolicy::workload())
        }
    };

    let view = RoutesView {
        network: network.name.clone(),
        plan: plan(&hops, &subnets, &policy),
    };
    format.print(&view)
}

//! Simulate command

use crate::config::Config;
use crate::output::{OutputFormat, Tabulate};
use cloudwan_common::AvailabilityZone;
use cloudwan_orchestrator::{
    load_topology, CloudApis, DeploymentReport, Orchestrator, PolicyReport, SimulatedCloud,
    SimulationSettings,
};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tabled::settings::Style;
use tabled::{Table, Tabled};

pub struct SimulateArgs {
    pub file: PathBuf,
    pub withhold_zones: Vec<String>,
    pub reject_segments: Vec<String>,
    pub defer_route_tables: Vec<String>,
    pub admission_polls: Option<u32>,
    pub endpoint_polls: Option<u32>,
    pub route_table_delay_ms: Option<u64>,
}

impl SimulateArgs {
    fn settings(&self) -> SimulationSettings {
        let defaults = SimulationSettings::default();
        SimulationSettings {
            route_table_delay: self
                .route_table_delay_ms
                .map_or(defaults.route_table_delay, Duration::from_millis),
            endpoint_ready_after: self.endpoint_polls.unwrap_or(defaults.endpoint_ready_after),
            admission_after: self.admission_polls.unwrap_or(defaults.admission_after),
        }
    }
}

#[derive(Tabled)]
struct NetworkRow {
    network: String,
    region: String,
    segment: String,
    attachment: String,
    routes: usize,
    unrouted: usize,
    status: String,
}

impl Tabulate for DeploymentReport {
    fn tabulate(&self) -> String {
        let rows: Vec<NetworkRow> = self
            .networks
            .iter()
            .map(|n| {
                let routes = n.routes.as_ref();
                let status = if n.is_complete() {
                    "complete".green().to_string()
                } else if let Some(failure) = n.failures.first() {
                    format!("{} ({})", failure.stage, failure.class.as_str()).red().to_string()
                } else {
                    "partial".yellow().to_string()
                };
                NetworkRow {
                    network: n.network.clone(),
                    region: n.region.to_string(),
                    segment: n.segment.to_string(),
                    attachment: n
                        .attachment
                        .as_ref()
                        .map(|a| a.id.to_string())
                        .unwrap_or_else(|| "-".into()),
                    routes: routes.map_or(0, |r| r.applied.len()),
                    unrouted: routes.map_or(0, |r| r.skipped.len()),
                    status,
                }
            })
            .collect();

        let policy = match &self.policy {
            PolicyReport::Published { revision, .. } => {
                format!("published (revision {})", revision).green().to_string()
            }
            PolicyReport::Blocked { missing, reason } => {
                format!("blocked on {}: {}", missing.join(", "), reason).yellow().to_string()
            }
            PolicyReport::Failed { class, message } => {
                format!("failed ({}): {}", class.as_str(), message).red().to_string()
            }
        };

        format!(
            "{}\nPolicy: {}\nRoutes: {} created, {} replaced, {} unchanged, {} subnets unrouted",
            Table::new(rows).with(Style::rounded()),
            policy,
            self.routes.routes_created,
            self.routes.routes_replaced,
            self.routes.routes_unchanged,
            self.routes.subnets_unrouted,
        )
    }
}

pub async fn handle(args: SimulateArgs, config: &Config, format: OutputFormat) -> anyhow::Result<()> {
    let topology = load_topology(&args.file)?;

    let mut cloud = SimulatedCloud::for_topology(&topology)?.with_settings(args.settings());
    for zone in args.withhold_zones {
        cloud = cloud.withhold_zone(AvailabilityZone::new(zone)?);
    }
    for segment in args.reject_segments {
        cloud = cloud.reject_segment(segment);
    }
    for network in args.defer_route_tables {
        cloud = cloud.defer_route_tables(network);
    }

    let cloud = Arc::new(cloud);
    let orchestrator = Orchestrator::new(
        topology,
        CloudApis::from_backend(cloud.clone()),
        cloud.identity().clone(),
        config.simulation_timing(),
    );

    let report = orchestrator.deploy().await;
    format.print(&report)?;

    if !report.is_success() {
        anyhow::bail!("deployment did not fully converge");
    }
    Ok(())
}

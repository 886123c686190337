//! Validate command

use crate::output::{OutputFormat, Tabulate};
use cloudwan_common::{NetworkKind, ShareTarget, Topology};
use cloudwan_orchestrator::load_topology;
use serde::Serialize;
use std::path::Path;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Debug, Serialize, Tabled)]
pub struct NetworkRow {
    pub name: String,
    pub kind: String,
    pub region: String,
    pub cidr: String,
    pub zones: u8,
    pub segment: String,
}

#[derive(Debug, Serialize)]
pub struct TopologySummary {
    pub hub: String,
    pub regions: Vec<String>,
    pub organisation_cidr: String,
    pub segments: Vec<String>,
    pub attachment_rules: usize,
    pub shares: Vec<String>,
    /// Networks a route injection sends traffic through, in order
    pub inspection_path: Vec<String>,
    pub networks: Vec<NetworkRow>,
}

impl TopologySummary {
    pub fn from_topology(topology: &Topology) -> Self {
        let shares = topology
            .share_rules()
            .iter()
            .map(|rule| match &rule.share_with {
                ShareTarget::All => format!("{} -> *", rule.segment),
                ShareTarget::Segments(segments) => format!(
                    "{} -> {}",
                    rule.segment,
                    segments.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                ),
            })
            .collect();

        Self {
            hub: topology.hub().name.clone(),
            regions: topology.regions().iter().map(|r| r.to_string()).collect(),
            organisation_cidr: topology.organisation_cidr().to_string(),
            segments: topology.segments().iter().map(|s| s.name.to_string()).collect(),
            attachment_rules: topology.attachment_policies().len(),
            shares,
            inspection_path: topology.referenced_networks().iter().map(|n| n.to_string()).collect(),
            networks: topology
                .networks()
                .iter()
                .map(|n| NetworkRow {
                    name: n.name.clone(),
                    kind: match n.kind {
                        NetworkKind::Inspection => "inspection".into(),
                        NetworkKind::Workload => "workload".into(),
                    },
                    region: n.region.to_string(),
                    cidr: n.cidr.to_string(),
                    zones: n.availability_zones,
                    segment: n.segment.to_string(),
                })
                .collect(),
        }
    }
}

impl Tabulate for TopologySummary {
    fn tabulate(&self) -> String {
        let mut out = format!(
            "Hub {} ({}) across {}\nSegments: {}\nAttachment rules: {}\n",
            self.hub,
            self.organisation_cidr,
            self.regions.join(", "),
            self.segments.join(", "),
            self.attachment_rules,
        );
        if !self.shares.is_empty() {
            out.push_str(&format!("Shares: {}\n", self.shares.join("; ")));
        }
        if !self.inspection_path.is_empty() {
            out.push_str(&format!("Inspection path: {}\n", self.inspection_path.join(" -> ")));
        }
        out.push_str(&Table::new(&self.networks).with(Style::rounded()).to_string());
        out
    }
}

pub fn handle(file: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let topology = load_topology(file)?;
    format.print(&TopologySummary::from_topology(&topology))
}

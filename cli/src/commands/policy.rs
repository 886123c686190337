//! Policy command

use super::read_json;
use crate::output::{OutputFormat, Tabulate};
use anyhow::Context;
use cloudwan_orchestrator::{load_topology, synthesize, PolicyDocument, ResolvedAttachments};
use serde::Serialize;
use std::path::Path;

/// Policy documents print as JSON in every format but YAML
#[derive(Serialize)]
#[serde(transparent)]
pub struct PolicyView(PolicyDocument);

impl Tabulate for PolicyView {
    fn tabulate(&self) -> String {
        self.0.to_json().unwrap_or_default()
    }
}

pub fn handle(file: &Path, attachments: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let topology = load_topology(file)?;
    let resolved: ResolvedAttachments = read_json(attachments)?;

    let document = synthesize(&topology, &resolved).context("synthesizing hub policy")?;
    format.print(&PolicyView(document))
}

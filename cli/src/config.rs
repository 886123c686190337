//! CLI Configuration

use crate::output::OutputFormat;
use anyhow::{anyhow, Context};
use clap::ValueEnum;
use cloudwan_orchestrator::OrchestratorConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub log_json: bool,
    pub default_format: Option<String>,
    /// Timing used by `simulate`
    pub simulation: Option<OrchestratorConfig>,
}

impl Config {
    pub fn load(profile: Option<&str>) -> anyhow::Result<Self> {
        let path = Self::config_path(profile)?;
        if path.exists() {
            let content = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, profile: Option<&str>) -> anyhow::Result<PathBuf> {
        let path = Self::config_path(profile)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }

    pub fn exists(profile: Option<&str>) -> anyhow::Result<bool> {
        Ok(Self::config_path(profile)?.exists())
    }

    pub fn config_path(profile: Option<&str>) -> anyhow::Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot find home directory"))?;
        let filename = match profile {
            Some(p) => format!("config.{}.toml", p),
            None => "config.toml".to_string(),
        };
        Ok(home.join(".cloudwan").join(filename))
    }

    pub fn output_format(&self) -> OutputFormat {
        self.default_format
            .as_deref()
            .and_then(|f| OutputFormat::from_str(f, true).ok())
            .unwrap_or(OutputFormat::Table)
    }

    /// Simulation timing; polls are short since nothing real is waited on
    pub fn simulation_timing(&self) -> OrchestratorConfig {
        self.simulation.clone().unwrap_or(OrchestratorConfig {
            admission_poll_ms: 200,
            endpoint_poll_ms: 200,
            endpoint_poll_limit: 15,
            attachment_deadline_secs: Some(60),
            reconcile_deadline_secs: Some(60),
        })
    }

    /// Starting point written by `config init`
    pub fn template() -> Self {
        let mut config = Self {
            log_level: Some("info".into()),
            default_format: Some("table".into()),
            ..Self::default()
        };
        config.simulation = Some(config.simulation_timing());
        config
    }
}

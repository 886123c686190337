//! Orchestrator configuration
//!
//! Runtime knobs for a deployment plus loading of topology files.

use cloudwan_common::topology::config::TopologyConfig;
use cloudwan_common::{ConfigError, Topology};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// How often attachment admission is polled
    pub admission_poll_ms: u64,
    /// How often the inspection engine status is polled
    pub endpoint_poll_ms: u64,
    /// Engine status polls before giving up on missing endpoints
    pub endpoint_poll_limit: u32,
    /// Deadline for attachment admission, none waits forever
    pub attachment_deadline_secs: Option<u64>,
    /// Deadline for route convergence, none waits until inputs settle
    pub reconcile_deadline_secs: Option<u64>,
}

impl OrchestratorConfig {
    pub fn admission_poll_interval(&self) -> Duration {
        Duration::from_millis(self.admission_poll_ms)
    }

    pub fn endpoint_poll_interval(&self) -> Duration {
        Duration::from_millis(self.endpoint_poll_ms)
    }

    pub fn attachment_deadline(&self) -> Option<Duration> {
        self.attachment_deadline_secs.map(Duration::from_secs)
    }

    pub fn reconcile_deadline(&self) -> Option<Duration> {
        self.reconcile_deadline_secs.map(Duration::from_secs)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            admission_poll_ms: 5_000,
            endpoint_poll_ms: 10_000,
            endpoint_poll_limit: 90,
            attachment_deadline_secs: Some(1_800),
            reconcile_deadline_secs: Some(1_800),
        }
    }
}

/// Topology file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyFormat {
    Yaml,
    Toml,
}

impl TopologyFormat {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Some(Self::Yaml),
            Some("toml") => Some(Self::Toml),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Toml => "toml",
        }
    }
}

/// Decode topology configuration
pub fn parse_topology(raw: &str, format: TopologyFormat) -> Result<TopologyConfig, ConfigError> {
    let decode_error = |reason: String| ConfigError::Decode {
        format: format.as_str(),
        reason,
    };
    match format {
        TopologyFormat::Yaml => serde_yaml::from_str(raw).map_err(|e| decode_error(e.to_string())),
        TopologyFormat::Toml => toml::from_str(raw).map_err(|e| decode_error(e.to_string())),
    }
}

/// Read, decode and validate a topology file
pub fn load_topology(path: impl AsRef<Path>) -> Result<Topology, ConfigError> {
    let path = path.as_ref();
    let load_error = |reason: String| ConfigError::Load {
        path: path.display().to_string(),
        reason,
    };

    let format = TopologyFormat::from_path(path)
        .ok_or_else(|| load_error("expected a .yaml, .yml or .toml file".to_string()))?;
    let raw = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
    let config = parse_topology(&raw, format).map_err(|e| load_error(e.to_string()))?;

    Topology::build(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
hub:
  name: GlobalNet
  regions: [eu-west-1, us-east-1]
organisation_cidr: 10.0.0.0/8
segments:
  - name: prod
  - name: sharedservices
networks:
  - name: inspection-us
    kind: inspection
    region: us-east-1
    cidr: 10.200.0.0/16
    segment: sharedservices
share:
  - segment: sharedservices
    share_with: "*"
routes:
  - segment: prod
    via: [inspection-us]
"#;

    const TOML: &str = r#"
organisation_cidr = "10.0.0.0/8"

[hub]
name = "GlobalNet"
regions = ["us-east-1"]

[[segments]]
name = "prod"
edge_locations = ["us-east-1"]

[[networks]]
name = "workload-prod-us"
kind = "workload"
region = "us-east-1"
cidr = "10.0.0.0/22"
segment = "prod"
"#;

    #[test]
    fn test_parse_yaml_topology() {
        let config = parse_topology(YAML, TopologyFormat::Yaml).unwrap();
        let topology = Topology::build(config).unwrap();

        assert_eq!(topology.networks().len(), 1);
        assert_eq!(topology.share_rules()[0].share_with, cloudwan_common::ShareTarget::All);
        assert_eq!(
            topology.route_injections()[0].destination_cidr_blocks[0].to_string(),
            "0.0.0.0/0"
        );
        assert_eq!(topology.hub().asn_ranges[0].to_string(), "65412-65534");
    }

    #[test]
    fn test_parse_toml_topology() {
        let config = parse_topology(TOML, TopologyFormat::Toml).unwrap();
        let topology = Topology::build(config).unwrap();

        let network = topology.network("workload-prod-us").unwrap();
        assert_eq!(network.availability_zones, 2);
        assert_eq!(network.layout.len(), 1);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let raw = YAML.replace("organisation_cidr", "organization_cidr");
        let err = parse_topology(&raw, TopologyFormat::Yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Decode { format: "yaml", .. }));
        assert!(err.to_string().contains("organization_cidr"));
    }

    #[test]
    fn test_malformed_toml_is_decode_error() {
        let err = parse_topology("organisation_cidr = [", TopologyFormat::Toml).unwrap_err();
        assert!(matches!(err, ConfigError::Decode { format: "toml", .. }));

        let provision: cloudwan_common::ProvisionError = err.into();
        assert_eq!(provision.class(), cloudwan_common::ErrorClass::Configuration);
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(TopologyFormat::from_path(Path::new("t.yml")), Some(TopologyFormat::Yaml));
        assert_eq!(TopologyFormat::from_path(Path::new("t.toml")), Some(TopologyFormat::Toml));
        assert_eq!(TopologyFormat::from_path(Path::new("t.json")), None);
        assert!(matches!(
            load_topology("does-not-exist.json"),
            Err(ConfigError::Load { .. })
        ));
    }

    #[test]
    fn test_sample_topology_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/topology.yaml");
        let topology = load_topology(path).unwrap();

        assert_eq!(topology.networks().len(), 6);
        assert_eq!(topology.referenced_networks(), vec!["inspection-us", "inspection-eu"]);
    }

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.admission_poll_interval(), Duration::from_secs(5));
        assert_eq!(config.attachment_deadline(), Some(Duration::from_secs(1_800)));
    }
}

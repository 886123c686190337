//! CLI Commands

pub mod config;
pub mod policy;
pub mod routes;
pub mod simulate;
pub mod validate;

use anyhow::Context;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

/// Read and decode a JSON input file
pub fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("decoding {}", path.display()))
}

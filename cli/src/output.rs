//! Output formatting

use clap::ValueEnum;
use serde::Serialize;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}

/// Human-readable rendering for `--format table`
pub trait Tabulate {
    fn tabulate(&self) -> String;
}

impl OutputFormat {
    pub fn print<T: Serialize + Tabulate>(&self, data: &T) -> anyhow::Result<()> {
        match self {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(data)?),
            OutputFormat::Yaml => print!("{}", serde_yaml::to_string(data)?),
            OutputFormat::Table => println!("{}", data.tabulate()),
        }
        Ok(())
    }
}

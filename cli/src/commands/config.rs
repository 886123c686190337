//! Config commands

use crate::config::Config;
use crate::output::{OutputFormat, Tabulate};
use crate::ConfigCommands;

impl Tabulate for Config {
    fn tabulate(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

pub fn handle(
    action: ConfigCommands,
    profile: Option<&str>,
    current: &Config,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match action {
        ConfigCommands::Init { force } => {
            if Config::exists(profile)? && !force {
                anyhow::bail!(
                    "{} already exists, pass --force to overwrite",
                    Config::config_path(profile)?.display()
                );
            }
            let path = Config::template().save(profile)?;
            println!("Configuration initialized at {}", path.display());
        }
        ConfigCommands::Show => {
            println!("# {}", Config::config_path(profile)?.display());
            format.print(current)?;
        }
    }
    Ok(())
}

//! CloudWAN CLI
//!
//! Command-line interface for the CloudWAN control plane.
//!
//! # Usage
//!
//! ```bash
//! cloudwan validate -f topology.yaml
//! cloudwan policy -f topology.yaml --attachments attachments.json
//! cloudwan routes -f topology.yaml --network inspection-us --status status.json --subnets subnets.json
//! cloudwan simulate -f topology.yaml --withhold-zone us-east-1b --format json
//! cloudwan simulate -f topology.yaml --admission-polls 5 --route-table-delay-ms 500
//! cloudwan config init
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod output;

#[derive(Parser)]
#[command(name = "cloudwan")]
#[command(version)]
#[command(about = "CloudWAN Command Line Interface", long_about = None)]
struct Cli {
    /// Log filter, e.g. `info` or `cloudwan_inspection=debug`
    #[arg(long, env = "CLOUDWAN_LOG")]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "CLOUDWAN_LOG_JSON")]
    log_json: bool,

    /// Output format
    #[arg(long, short = 'o')]
    format: Option<output::OutputFormat>,

    /// Profile name from config file
    #[arg(long, short, env = "CLOUDWAN_PROFILE")]
    profile: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a topology file
    Validate {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Synthesize the hub policy from resolved attachment ids
    Policy {
        #[arg(short, long)]
        file: PathBuf,
        /// JSON object of network name to attachment id
        #[arg(long)]
        attachments: PathBuf,
    },
    /// Plan the routes of one member network
    Routes {
        #[arg(short, long)]
        file: PathBuf,
        #[arg(long)]
        network: String,
        /// Inspection engine status snapshot (JSON)
        #[arg(long)]
        status: Option<PathBuf>,
        /// Subnets of the network (JSON)
        #[arg(long)]
        subnets: PathBuf,
        /// Core network ARN, the next hop of workload networks
        #[arg(long)]
        core_network: Option<String>,
    },
    /// Run a deployment against the in-memory cloud
    Simulate {
        #[arg(short, long)]
        file: PathBuf,
        /// Zone the inspection engine never places an endpoint in
        #[arg(long)]
        withhold_zone: Vec<String>,
        /// Segment the hub refuses attachments to
        #[arg(long)]
        reject_segment: Vec<String>,
        /// Network whose route tables never appear
        #[arg(long)]
        defer_route_tables: Vec<String>,
        /// Admission polls before the hub decides on an attachment
        #[arg(long)]
        admission_polls: Option<u32>,
        /// Status polls before the engine reports endpoints
        #[arg(long)]
        endpoint_polls: Option<u32>,
        /// Delay before new subnets get route tables
        #[arg(long)]
        route_table_delay_ms: Option<u64>,
    },
    /// Configure CLI
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Initialize configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Show the effective configuration
    Show,
}

fn init_tracing(filter: &str, json: bool) {
    let registry = tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(filter));
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match config::Config::load(cli.profile.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    let filter = cli
        .log_level
        .clone()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".into());
    init_tracing(&filter, cli.log_json || config.log_json);
    tracing::debug!("cloudwan v{}", env!("CARGO_PKG_VERSION"));

    let format = cli.format.unwrap_or_else(|| config.output_format());

    let result = match cli.command {
        Commands::Validate { file } => commands::validate::handle(&file, format),
        Commands::Policy { file, attachments } => commands::policy::handle(&file, &attachments, format),
        Commands::Routes {
            file,
            network,
            status,
            subnets,
            core_network,
        } => commands::routes::handle(
            commands::routes::RoutesArgs {
                file,
                network,
                status,
                subnets,
                core_network,
            },
            format,
        ),
        Commands::Simulate {
            file,
            withhold_zone,
            reject_segment,
            defer_route_tables,
            admission_polls,
            endpoint_polls,
            route_table_delay_ms,
        } => {
            commands::simulate::handle(
                commands::simulate::SimulateArgs {
                    file,
                    withhold_zones: withhold_zone,
                    reject_segments: reject_segment,
                    defer_route_tables,
                    admission_polls,
                    endpoint_polls,
                    route_table_delay_ms,
                },
                &config,
                format,
            )
            .await
        }
        Commands::Config { action } => commands::config::handle(action, cli.profile.as_deref(), &config, format),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

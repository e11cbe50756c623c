//! # Standby Orchestrator Binary
//!
//! Thin wrapper that runs the passive replica.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin orchestrator-standby
//! cargo run --bin orchestrator-standby -- --config config/standby.toml
//! ```
//!
//! The standby listens for the primary's replication stream (port 5002 by
//! default), applies state snapshots, and terminates with an operator
//! banner when the primary is declared dead.

use clap::Parser;

use task_orchestrator::common::config::{load_config, StandbyConfig};
use task_orchestrator::common::logging::init_logger;
use task_orchestrator::standby::Standby;

/// Command-line arguments for the standby binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => StandbyConfig::default(),
    };

    let standby = Standby::new(config);
    standby.run().await
}

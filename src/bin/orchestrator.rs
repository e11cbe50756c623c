//! # Primary Orchestrator Binary
//!
//! Thin wrapper that initializes and runs the primary orchestrator.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin orchestrator
//! cargo run --bin orchestrator -- --config config/orchestrator.toml
//! ```
//!
//! With no arguments the reference defaults apply: clients on port 5000,
//! workers on port 5001, standby replication toward port 5002.

use clap::Parser;

use task_orchestrator::common::config::{load_config, OrchestratorConfig};
use task_orchestrator::common::logging::init_logger;
use task_orchestrator::orchestrator::Orchestrator;

/// Command-line arguments for the orchestrator binary
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
        None => OrchestratorConfig::default(),
    };

    let orchestrator = Orchestrator::new(config);
    orchestrator.run().await
}

//! # Client Binary
//!
//! Thin wrapper that runs the interactive client CLI.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin client -- 127.0.0.1 5000
//! ```
//!
//! The client prompts for credentials and then offers a small menu:
//! submit a task, query a task's status, or quit.

use clap::Parser;

use task_orchestrator::client::ClientCli;
use task_orchestrator::common::logging::init_logger;

/// Command-line arguments for the client binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Orchestrator host
    host: String,
    /// Orchestrator client port
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let args = Args::parse();
    let mut client = ClientCli::new(&args.host, args.port);
    client.run().await
}

//! # Worker Binary
//!
//! Thin wrapper that runs one worker node.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin worker -- 127.0.0.1 5001
//! ```
//!
//! The worker registers with the orchestrator, heartbeats every 5 seconds,
//! and simulates task processing (including the occasional crash).

use clap::Parser;

use task_orchestrator::common::logging::init_logger;
use task_orchestrator::worker::WorkerNode;

/// Command-line arguments for the worker binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Orchestrator host
    host: String,
    /// Orchestrator worker port
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let args = Args::parse();
    let worker = WorkerNode::new(&args.host, args.port);
    worker.run().await
}

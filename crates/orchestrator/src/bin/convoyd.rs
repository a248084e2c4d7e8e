// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! convoyd: the Convoy orchestrator daemon.

use clap::Parser;
use convoy_core::{Config, Strategy};
use convoy_orchestrator::runtime::{Runtime, RuntimeOptions};
use convoy_orchestrator::worker::CommandWorker;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "convoyd", about = "Fleet migration orchestrator")]
struct Args {
    /// Control-plane port destinations connect to.
    #[arg(long, default_value_t = 54322)]
    control_port: u16,

    /// UDP discovery port.
    #[arg(long, default_value_t = 54321)]
    discovery_port: u16,

    /// Disable UDP discovery broadcasts.
    #[arg(long)]
    no_discovery: bool,

    /// Seconds without a liveness signal before a destination is dropped.
    #[arg(long, default_value_t = 30)]
    stale_timeout: u64,

    /// Health-poll interval in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    health_interval_ms: u64,

    /// Maximum transfers in flight at once.
    #[arg(long, default_value_t = 10)]
    max_concurrent: usize,

    /// Global bandwidth budget in Mbps (0 = unlimited).
    #[arg(long, default_value_t = 0)]
    global_bandwidth_mbps: i64,

    /// Per-job bandwidth cap in Mbps (0 = none).
    #[arg(long, default_value_t = 0)]
    per_job_bandwidth_mbps: i64,

    /// Placement strategy: largest_free or round_robin.
    #[arg(long, default_value = "largest_free")]
    strategy: Strategy,

    /// Mapping template to deploy at startup.
    #[arg(long)]
    mapping: Option<PathBuf>,

    /// Deployment history file.
    #[arg(long)]
    history: Option<PathBuf>,

    /// Shell command launched per transfer job (job coordinates arrive in
    /// CONVOY_* environment variables).
    #[arg(long)]
    launch_command: Option<String>,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let mapping = match &args.mapping {
        Some(path) => match convoy_orchestrator::mapping::load_template(path) {
            Ok(mapping) => Some(mapping),
            Err(error) => {
                tracing::error!(%error, path = %path.display(), "failed to load mapping template");
                return std::process::ExitCode::FAILURE;
            }
        },
        None => None,
    };

    let config = Config {
        control_port: args.control_port,
        discovery_port: args.discovery_port,
        stale_timeout_secs: args.stale_timeout,
        health_interval_ms: args.health_interval_ms,
        max_concurrent: args.max_concurrent,
        global_bandwidth_mbps: args.global_bandwidth_mbps,
        per_job_bandwidth_mbps: args.per_job_bandwidth_mbps,
        strategy: args.strategy,
        ..Config::default()
    };

    let options = RuntimeOptions {
        config,
        enable_discovery: !args.no_discovery,
        history_path: args.history,
        template_path: args.mapping.as_ref().map(|p| p.display().to_string()),
        mapping,
    };

    // The data plane reports through destination control streams; this
    // channel only carries posts from embedded workers, so it stays closed.
    let (_worker_tx, worker_rx) = mpsc::unbounded_channel();
    let worker = CommandWorker::new(args.launch_command);

    match Runtime::run(options, worker, worker_rx).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "orchestrator failed");
            std::process::ExitCode::FAILURE
        }
    }
}

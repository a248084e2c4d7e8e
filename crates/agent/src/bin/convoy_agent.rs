// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! convoy-agent: destination-side agent daemon.

use clap::Parser;
use convoy_agent::{connect, AgentState, AssignmentQueueStore, ClientEvent, ClientOptions};
use convoy_core::{Destination, DestinationHealth};
use convoy_discovery::{DiscoveryEvent, DiscoveryService};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "convoy-agent", about = "Convoy destination agent")]
struct Args {
    /// Orchestrator address (host:port). Discovered over UDP when absent.
    #[arg(long)]
    orchestrator: Option<SocketAddr>,

    /// UDP discovery port.
    #[arg(long, default_value_t = 54321)]
    discovery_port: u16,

    /// Advertised control port.
    #[arg(long, default_value_t = 54322)]
    control_port: u16,

    /// Advertised data-plane port.
    #[arg(long, default_value_t = 54323)]
    data_port: u16,

    /// Stable destination id; derived as hostname@ip when absent.
    #[arg(long)]
    destination_id: Option<String>,

    /// Advertised free disk in bytes.
    #[arg(long, default_value_t = 0)]
    free_disk_bytes: i64,

    /// Durable assignment queue file.
    #[arg(long, default_value = "convoy-queue.json")]
    state_file: PathBuf,

    /// Reconnect interval in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    reconnect_interval_ms: u64,

    /// Give up instead of reconnecting when the stream drops.
    #[arg(long)]
    no_reconnect: bool,
}

fn local_destination(args: &Args) -> Destination {
    let hostname = gethostname::gethostname().to_string_lossy().into_owned();
    Destination {
        destination_id: args.destination_id.clone().unwrap_or_default(),
        hostname,
        control_port: args.control_port,
        data_port: args.data_port,
        status: "ready".into(),
        health: DestinationHealth {
            free_disk_bytes: args.free_disk_bytes,
            ..DestinationHealth::default()
        },
        ..Destination::default()
    }
}

/// Announce until an orchestrator probe arrives.
async fn discover_orchestrator(
    port: u16,
    destination: Destination,
) -> Result<SocketAddr, convoy_discovery::DiscoveryError> {
    let (service, mut events) = DiscoveryService::destination(port, destination)?;
    tokio::spawn(service.run());

    loop {
        match events.recv().await {
            Some(DiscoveryEvent::OrchestratorDiscovered { address, port }) => {
                return Ok(SocketAddr::new(address, port));
            }
            Some(_) => continue,
            None => {
                // Discovery task died; keep waiting after a beat.
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let destination = local_destination(&args);

    let orchestrator = match args.orchestrator {
        Some(addr) => addr,
        None => {
            tracing::info!(port = args.discovery_port, "discovering orchestrator");
            match discover_orchestrator(args.discovery_port, destination.clone()).await {
                Ok(addr) => addr,
                Err(error) => {
                    tracing::error!(%error, "discovery failed");
                    return std::process::ExitCode::FAILURE;
                }
            }
        }
    };
    tracing::info!(%orchestrator, "connecting to orchestrator");

    let options = ClientOptions {
        auto_reconnect: !args.no_reconnect,
        reconnect_interval: Duration::from_millis(args.reconnect_interval_ms),
    };
    let (handle, mut events) = connect(orchestrator, destination, options);
    let mut state = AgentState::load(AssignmentQueueStore::new(&args.state_file));

    while let Some(event) = events.recv().await {
        match event {
            ClientEvent::AssignmentReceived(assignment) => {
                tracing::info!(
                    job_id = %assignment.job_id,
                    deployment_id = %assignment.deployment_id,
                    source_user = %assignment.source_user,
                    "assignment received"
                );
                state.enqueue(assignment);
                if let Some(active) = state.activate_next() {
                    tracing::info!(job_id = %active.job_id, "awaiting data plane for job");
                }
            }
            ClientEvent::AssignmentPaused { job_id, .. } => state.pause(&job_id),
            ClientEvent::AssignmentResumed { job_id, .. } => state.resume(&job_id),
            ClientEvent::AssignmentCanceled { job_id, .. } => state.cancel(&job_id),
            ClientEvent::Connected { addr } => tracing::info!(%addr, "connected"),
            ClientEvent::Registered { destination_id } => {
                tracing::info!(destination_id, "registered with orchestrator");
            }
            ClientEvent::Disconnected => tracing::warn!("orchestrator stream closed"),
            ClientEvent::Status(message) => tracing::info!("{message}"),
        }
    }

    handle.disconnect();
    std::process::ExitCode::SUCCESS
}

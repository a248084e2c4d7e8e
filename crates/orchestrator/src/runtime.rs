// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator runtime: one event loop over server, discovery, worker,
//! and timer activity.
//!
//! Suspension points are network I/O and timers only; every state machine
//! below runs synchronously on this task.

use crate::history::{DeploymentHistory, HistoryEntry};
use crate::manager::{ManagerEvent, ParallelJobManager};
use crate::orchestrator::{MigrationOrchestrator, OrchestratorEvent};
use crate::server::{OrchestrationServer, ServerEvent, ServerSender};
use crate::worker::{TransferWorker, WorkerEvent};
use chrono::{DateTime, Utc};
use convoy_core::{Config, DeploymentAssignment, Mapping, SystemClock};
use convoy_discovery::{DiscoveryError, DiscoveryEvent, DiscoveryService};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// How often the registry is swept for stale destinations.
const PRUNE_INTERVAL: Duration = Duration::from_secs(5);

/// Fallback retry-timer horizon when no deadline is pending.
const IDLE_RETRY_HORIZON: Duration = Duration::from_secs(3600);

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Server(#[from] crate::server::ServerError),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// Everything `convoyd` needs to run.
pub struct RuntimeOptions {
    pub config: Config,
    pub enable_discovery: bool,
    pub history_path: Option<PathBuf>,
    /// Deployment to start immediately (from a mapping template).
    pub mapping: Option<Mapping>,
    /// Where the mapping template came from, recorded in history entries.
    pub template_path: Option<String>,
}

/// Orchestrator event loop.
pub struct Runtime<W: TransferWorker> {
    config: Config,
    orchestrator: MigrationOrchestrator<ServerSender, SystemClock>,
    manager: ParallelJobManager<SystemClock>,
    worker: W,
    history: Option<DeploymentHistory>,
    deployment_started_at: DateTime<Utc>,
    template_path: String,
}

impl<W: TransferWorker> Runtime<W> {
    /// Bind sockets, wire components, and run until shutdown.
    ///
    /// `worker_events` carries progress posts from embedded workers; pass
    /// the receiver from the worker's channel, or a closed receiver when
    /// the data plane reports over the control stream instead.
    pub async fn run(
        options: RuntimeOptions,
        worker: W,
        mut worker_events: mpsc::UnboundedReceiver<WorkerEvent>,
    ) -> Result<(), RuntimeError> {
        let config = options.config.clone();

        let (server, sender, mut server_events) =
            OrchestrationServer::bind(config.control_port).await?;
        let control_port = server.local_addr().map(|a| a.port()).unwrap_or(config.control_port);
        tokio::spawn(server.run());

        let mut discovery_events = if options.enable_discovery {
            let (service, events) =
                DiscoveryService::orchestrator(config.discovery_port, control_port)?;
            tokio::spawn(service.run());
            events
        } else {
            // Closed channel; the select branch stays disabled.
            let (_, events) = mpsc::unbounded_channel();
            events
        };

        let clock = SystemClock;
        let orchestrator = MigrationOrchestrator::new(
            config.stale_timeout_secs,
            config.strategy,
            sender,
            clock.clone(),
        );
        let mut manager = ParallelJobManager::new(clock);
        manager.set_max_concurrent(config.max_concurrent);
        manager.set_global_bandwidth_limit(config.global_bandwidth_mbps);
        manager.set_per_job_bandwidth_limit(config.per_job_bandwidth_mbps);
        manager.set_retry_backoff(config.retry_base_ms, config.retry_max_ms);

        let mut runtime = Runtime {
            config,
            orchestrator,
            manager,
            worker,
            history: options.history_path.map(DeploymentHistory::new),
            deployment_started_at: Utc::now(),
            template_path: options.template_path.unwrap_or_default(),
        };

        if let Some(mapping) = &options.mapping {
            runtime.start_deployment(mapping);
        }

        let mut prune = tokio::time::interval(PRUNE_INTERVAL);
        let mut health =
            tokio::time::interval(Duration::from_millis(runtime.config.health_interval_ms));

        loop {
            let retry_deadline = runtime.manager.next_retry_deadline();
            let retry_sleep = retry_deadline
                .map(tokio::time::Instant::from_std)
                .unwrap_or_else(|| tokio::time::Instant::now() + IDLE_RETRY_HORIZON);

            tokio::select! {
                Some(event) = server_events.recv() => runtime.handle_server_event(event),
                Some(event) = discovery_events.recv() => runtime.handle_discovery_event(event),
                Some(event) = worker_events.recv() => runtime.handle_worker_event(event),
                _ = prune.tick() => {
                    let events = runtime.orchestrator.prune_stale();
                    runtime.handle_orchestrator_events(events);
                }
                _ = health.tick() => runtime.orchestrator.poll_health(),
                _ = tokio::time::sleep_until(retry_sleep), if retry_deadline.is_some() => {
                    let events = runtime.manager.on_retry_timer();
                    runtime.handle_manager_events(events);
                }
            }
        }
    }

    /// Kick off a deployment: jobs into the parallel manager, one
    /// assignment per job into the placement queue.
    fn start_deployment(&mut self, mapping: &Mapping) {
        self.deployment_started_at = Utc::now();
        let events = self.manager.start_deployment(mapping);
        self.handle_manager_events(events);

        for job in self.manager.jobs() {
            let assignment = DeploymentAssignment {
                deployment_id: self.manager.deployment_id().to_string(),
                job_id: job.job_id.clone(),
                source_user: job.source.username.clone(),
                profile_size_bytes: job.source.profile_size_bytes,
                priority: job.priority,
                max_bandwidth_kbps: 0,
            };
            let events = self.orchestrator.queue_deployment(assignment);
            self.handle_orchestrator_events(events);
        }
    }

    fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::DestinationRegistered(destination) => {
                let events = self.orchestrator.register_destination(destination);
                self.handle_orchestrator_events(events);
            }
            ServerEvent::HealthUpdated { destination_id, health } => {
                let events = self.orchestrator.update_health(&destination_id, health);
                self.handle_orchestrator_events(events);
            }
            ServerEvent::Progress(progress) => {
                let manager_events = self.manager.update_job_progress(
                    &progress.job_id,
                    progress.progress_percent,
                    progress.bytes_transferred,
                    progress.bytes_total,
                    progress.transfer_speed_mbps,
                );
                self.handle_manager_events(manager_events);
                let events = self.orchestrator.handle_progress(progress);
                self.handle_orchestrator_events(events);
            }
            ServerEvent::Completed(completion) => {
                let manager_events = self.manager.mark_job_complete(
                    &completion.job_id,
                    completion.succeeded(),
                    &completion.status,
                );
                self.handle_manager_events(manager_events);
                let events = self.orchestrator.handle_completion(completion);
                self.handle_orchestrator_events(events);
            }
            ServerEvent::Disconnected { destination_id } => {
                let events = self.orchestrator.destination_disconnected(&destination_id);
                self.handle_orchestrator_events(events);
            }
            ServerEvent::Status(message) => info!("{message}"),
        }
    }

    fn handle_discovery_event(&mut self, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::DestinationDiscovered(destination) => {
                let events = self.orchestrator.register_destination(destination);
                self.handle_orchestrator_events(events);
            }
            // Orchestrator probes from elsewhere are informational here.
            DiscoveryEvent::OrchestratorDiscovered { address, port } => {
                tracing::debug!(%address, port, "another orchestrator probe seen");
            }
        }
    }

    fn handle_worker_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Progress {
                job_id,
                progress_percent,
                bytes_transferred,
                total_bytes,
                speed_mbps,
            } => {
                let events = self.manager.update_job_progress(
                    &job_id,
                    progress_percent,
                    bytes_transferred,
                    total_bytes,
                    speed_mbps,
                );
                self.handle_manager_events(events);
            }
            WorkerEvent::Completed { job_id, success, error } => {
                let events = self.manager.mark_job_complete(&job_id, success, &error);
                self.handle_manager_events(events);
            }
        }
    }

    fn handle_orchestrator_events(&mut self, events: Vec<OrchestratorEvent>) {
        for event in events {
            match event {
                OrchestratorEvent::Status(message) => info!("{message}"),
                OrchestratorEvent::DeploymentRejected { destination_id, reason } => {
                    warn!(destination_id, reason, "deployment rejected");
                }
                OrchestratorEvent::AggregateProgress { completed, total, percent } => {
                    info!(completed, total, percent, "deployment progress");
                }
                OrchestratorEvent::DestinationRegistered(d) => {
                    info!(destination_id = %d.destination_id, "destination online");
                }
                OrchestratorEvent::DestinationRemoved(id) => {
                    info!(destination_id = %id, "destination offline");
                }
                OrchestratorEvent::DestinationUpdated(_)
                | OrchestratorEvent::DeploymentReady(_)
                | OrchestratorEvent::Progress(_)
                | OrchestratorEvent::Completed(_) => {}
            }
        }
    }

    fn handle_manager_events(&mut self, events: Vec<ManagerEvent>) {
        for event in events {
            match event {
                ManagerEvent::JobStartRequested { job_id, source, destination } => {
                    self.worker.start(&job_id, &source, &destination);
                }
                ManagerEvent::JobPauseRequested { job_id } => self.worker.pause(&job_id),
                ManagerEvent::JobResumeRequested { job_id } => self.worker.resume(&job_id),
                ManagerEvent::JobCancelRequested { job_id } => self.worker.cancel(&job_id),
                ManagerEvent::JobBandwidthUpdateRequested { job_id, max_bandwidth_kbps } => {
                    self.worker.set_bandwidth(&job_id, max_bandwidth_kbps);
                }
                ManagerEvent::DeploymentComplete { deployment_id, success } => {
                    info!(deployment_id, success, "deployment complete");
                    self.append_history(&deployment_id, success);
                }
                ManagerEvent::DeploymentStarted { deployment_id } => {
                    info!(deployment_id, "deployment started");
                }
                ManagerEvent::DeploymentProgress { completed, total } => {
                    tracing::debug!(completed, total, "job counters");
                }
                ManagerEvent::JobStarted { .. }
                | ManagerEvent::JobUpdated { .. }
                | ManagerEvent::JobCompleted { .. } => {}
            }
        }
    }

    fn append_history(&mut self, deployment_id: &str, success: bool) {
        let Some(history) = &self.history else {
            return;
        };
        let entry = HistoryEntry {
            deployment_id: deployment_id.to_string(),
            started_at: self.deployment_started_at,
            completed_at: Utc::now(),
            total_jobs: self.manager.total_jobs(),
            completed_jobs: self.manager.completed_jobs(),
            failed_jobs: self.manager.failed_jobs(),
            status: if success { "success" } else { "completed_with_failures" }.to_string(),
            template_path: self.template_path.clone(),
        };
        if let Err(error) = history.append(entry) {
            warn!(%error, "failed to append deployment history");
        }
    }
}

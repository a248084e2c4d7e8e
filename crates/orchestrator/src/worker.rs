// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transfer-worker facade: the seam to the opaque data plane.
//!
//! The scheduler only ever posts control messages out and receives
//! progress/completion posts back; no other error type crosses this
//! boundary. Workers may run on their own threads or as external
//! processes.

use convoy_core::{Destination, SourceProfile};
#[cfg(any(test, feature = "test-support"))]
use tokio::sync::mpsc;

/// Inbound posts from the data plane to the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Progress {
        job_id: String,
        progress_percent: i64,
        bytes_transferred: i64,
        total_bytes: i64,
        speed_mbps: f64,
    },
    Completed {
        job_id: String,
        success: bool,
        error: String,
    },
}

/// Outbound control surface for per-file transfer workers.
pub trait TransferWorker: Send {
    /// Launch the transfer for one job.
    fn start(&self, job_id: &str, source: &SourceProfile, destination: &Destination);
    fn pause(&self, job_id: &str);
    fn resume(&self, job_id: &str);
    fn cancel(&self, job_id: &str);
    /// Advisory bandwidth cap; workers are trusted to apply it.
    fn set_bandwidth(&self, job_id: &str, max_kbps: i64);
}

/// Launches an external transfer tool per job.
///
/// The launch command runs through `sh -c` with the job's coordinates in
/// the environment; the tool reports progress back to the orchestrator via
/// the destination's control stream, not through this process.
pub struct CommandWorker {
    launch_command: Option<String>,
}

impl CommandWorker {
    pub fn new(launch_command: Option<String>) -> Self {
        Self { launch_command }
    }
}

impl TransferWorker for CommandWorker {
    fn start(&self, job_id: &str, source: &SourceProfile, destination: &Destination) {
        let Some(command) = &self.launch_command else {
            tracing::info!(
                job_id,
                source_user = %source.username,
                destination_id = %destination.destination_id,
                "transfer start requested (no launch command configured)"
            );
            return;
        };

        tracing::info!(job_id, command = %command, "launching transfer worker");
        let result = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .env("CONVOY_JOB_ID", job_id)
            .env("CONVOY_SOURCE_USER", &source.username)
            .env("CONVOY_SOURCE_HOST", &source.source_hostname)
            .env("CONVOY_DEST_ID", &destination.destination_id)
            .env("CONVOY_DEST_IP", &destination.ip_address)
            .env("CONVOY_DEST_PORT", destination.data_port.to_string())
            .spawn();
        if let Err(error) = result {
            tracing::warn!(job_id, %error, "failed to launch transfer worker");
        }
    }

    fn pause(&self, job_id: &str) {
        tracing::info!(job_id, "pause requested for transfer worker");
    }

    fn resume(&self, job_id: &str) {
        tracing::info!(job_id, "resume requested for transfer worker");
    }

    fn cancel(&self, job_id: &str) {
        tracing::info!(job_id, "cancel requested for transfer worker");
    }

    fn set_bandwidth(&self, job_id: &str, max_kbps: i64) {
        tracing::debug!(job_id, max_kbps, "bandwidth advisory for transfer worker");
    }
}

/// Recording worker for scheduler tests: captures every control call and
/// lets the test script inbound events.
#[cfg(any(test, feature = "test-support"))]
pub struct FakeWorker {
    pub calls: std::sync::Arc<parking_lot::Mutex<Vec<String>>>,
    events: mpsc::UnboundedSender<WorkerEvent>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeWorker {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self { calls: std::sync::Arc::new(parking_lot::Mutex::new(Vec::new())), events },
            rx,
        )
    }

    /// Post a completion as the data plane would.
    pub fn complete(&self, job_id: &str, success: bool, error: &str) {
        let _ = self.events.send(WorkerEvent::Completed {
            job_id: job_id.to_string(),
            success,
            error: error.to_string(),
        });
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl TransferWorker for FakeWorker {
    fn start(&self, job_id: &str, _source: &SourceProfile, _destination: &Destination) {
        self.calls.lock().push(format!("start:{job_id}"));
    }

    fn pause(&self, job_id: &str) {
        self.calls.lock().push(format!("pause:{job_id}"));
    }

    fn resume(&self, job_id: &str) {
        self.calls.lock().push(format!("resume:{job_id}"));
    }

    fn cancel(&self, job_id: &str) {
        self.calls.lock().push(format!("cancel:{job_id}"));
    }

    fn set_bandwidth(&self, job_id: &str, max_kbps: i64) {
        self.calls.lock().push(format!("bandwidth:{job_id}:{max_kbps}"));
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;

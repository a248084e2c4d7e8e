// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transfer job record and its status machine.

use crate::assignment::JobPriority;
use crate::destination::Destination;
use crate::profile::SourceProfile;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a transfer job inside the parallel manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Transferring,
    Paused,
    RetryScheduled,
    Complete,
    Failed,
    Canceled,
}

impl JobStatus {
    /// Terminal states are never left again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed | JobStatus::Canceled)
    }
}

crate::simple_display! {
    JobStatus {
        Queued => "queued",
        Transferring => "transferring",
        Paused => "paused",
        RetryScheduled => "retry_scheduled",
        Complete => "complete",
        Failed => "failed",
        Canceled => "canceled",
    }
}

/// One (source profile → destination) transfer, tracked by the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferJob {
    pub job_id: String,
    pub source: SourceProfile,
    pub destination: Destination,
    #[serde(default)]
    pub bytes_transferred: i64,
    #[serde(default)]
    pub total_bytes: i64,
    #[serde(default)]
    pub speed_mbps: f64,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub priority: JobPriority,
    #[serde(default)]
    pub error_message: String,
    /// Epoch milliseconds; 0 until the job first starts.
    #[serde(default)]
    pub started_at_ms: u64,
    #[serde(default)]
    pub updated_at_ms: u64,
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;

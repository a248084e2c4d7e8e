// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Progress and completion records reported by destination agents.

use serde::{Deserialize, Serialize};

/// Point-in-time progress of one job, flowing destination → orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentProgress {
    #[serde(default)]
    pub deployment_id: String,
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub destination_id: String,
    #[serde(default)]
    pub progress_percent: i64,
    #[serde(default)]
    pub bytes_transferred: i64,
    #[serde(default)]
    pub bytes_total: i64,
    #[serde(default)]
    pub files_transferred: i64,
    #[serde(default)]
    pub files_total: i64,
    #[serde(default)]
    pub current_file: String,
    #[serde(default)]
    pub transfer_speed_mbps: f64,
    #[serde(default)]
    pub eta_seconds: i64,
}

/// Terminal report for one job on one destination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentCompletion {
    #[serde(default)]
    pub deployment_id: String,
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub destination_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub summary: serde_json::Value,
}

impl DeploymentCompletion {
    pub fn succeeded(&self) -> bool {
        self.status == "success"
    }
}

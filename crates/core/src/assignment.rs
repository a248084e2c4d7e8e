// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deployment assignments and job priority.

use serde::{Deserialize, Serialize};

/// Scheduling priority for a transfer job.
///
/// Carried as a lowercase string on the wire; exactly these four names are
/// accepted — anything else fails to parse and the carrying message is
/// rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl JobPriority {
    /// Numeric scheduling score: higher runs first.
    pub fn score(self) -> i64 {
        match self {
            JobPriority::Low => 0,
            JobPriority::Normal => 1,
            JobPriority::High => 2,
            JobPriority::Critical => 3,
        }
    }
}

crate::simple_display! {
    JobPriority {
        Low => "low",
        Normal => "normal",
        High => "high",
        Critical => "critical",
    }
}

/// A work item binding one source profile to one destination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentAssignment {
    #[serde(default)]
    pub deployment_id: String,
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub source_user: String,
    #[serde(default)]
    pub profile_size_bytes: i64,
    #[serde(default)]
    pub priority: JobPriority,
    /// Per-job cap advised to the data plane; 0 means unlimited.
    #[serde(default)]
    pub max_bandwidth_kbps: i64,
}

crate::builder! {
    pub struct DeploymentAssignmentBuilder => DeploymentAssignment {
        into {
            deployment_id: String = "dep-1",
            job_id: String = "job-1",
            source_user: String = "alice",
        }
        set {
            profile_size_bytes: i64 = 1024,
            priority: JobPriority = JobPriority::Normal,
            max_bandwidth_kbps: i64 = 0,
        }
    }
}

#[cfg(test)]
#[path = "assignment_tests.rs"]
mod tests;

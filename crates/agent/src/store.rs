// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable assignment queue for one destination.
//!
//! One JSON document holding the active assignment, the waiting queue, and
//! per-job status/event text. Every state transition rewrites the file
//! atomically; load tolerates a missing or corrupt file by starting fresh.

use convoy_core::fsio::write_atomic;
use convoy_core::DeploymentAssignment;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure writing the queue file; in-memory state stays authoritative
/// until the next successful write.
#[derive(Debug, Error)]
#[error("persist error: {0}")]
pub struct PersistError(#[from] std::io::Error);

/// On-disk shape of the assignment queue.
///
/// `active` with an empty `job_id` means nothing is being processed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredQueue {
    #[serde(default)]
    pub active: DeploymentAssignment,
    #[serde(default)]
    pub queue: Vec<DeploymentAssignment>,
    #[serde(default)]
    pub status_by_job: IndexMap<String, String>,
    #[serde(default)]
    pub event_by_job: IndexMap<String, String>,
}

impl StoredQueue {
    pub fn has_active(&self) -> bool {
        !self.active.job_id.is_empty()
    }
}

/// File handle for the queue document.
pub struct AssignmentQueueStore {
    path: PathBuf,
}

impl AssignmentQueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist the whole document atomically.
    pub fn save(&self, state: &StoredQueue) -> Result<(), PersistError> {
        let json = serde_json::to_vec_pretty(state).map_err(std::io::Error::other)?;
        write_atomic(&self.path, &json)?;
        Ok(())
    }

    /// Load the document; absent or unparseable files read as defaults.
    pub fn load(&self) -> StoredQueue {
        let Ok(data) = fs::read(&self.path) else {
            return StoredQueue::default();
        };
        match serde_json::from_slice(&data) {
            Ok(state) => state,
            Err(error) => {
                tracing::warn!(
                    path = %self.path.display(),
                    %error,
                    "unreadable assignment queue, starting fresh"
                );
                StoredQueue::default()
            }
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

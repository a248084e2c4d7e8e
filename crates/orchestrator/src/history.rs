// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only deployment history on disk.
//!
//! The file is a JSON array of entries. Appends rewrite the whole array
//! atomically; readers tolerate a missing or corrupt file by starting
//! empty.

use chrono::{DateTime, Utc};
use convoy_core::fsio::write_atomic;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

/// A deployment's terminal record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub deployment_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub total_jobs: usize,
    #[serde(default)]
    pub completed_jobs: usize,
    #[serde(default)]
    pub failed_jobs: usize,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub template_path: String,
}

/// Failure writing a persisted file; in-memory state stays authoritative.
#[derive(Debug, Error)]
#[error("persist error: {0}")]
pub struct PersistError(#[from] std::io::Error);

/// History file handle.
pub struct DeploymentHistory {
    path: PathBuf,
}

impl DeploymentHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Load all entries. Missing or unparseable files read as empty.
    pub fn load(&self) -> Vec<HistoryEntry> {
        let Ok(data) = fs::read(&self.path) else {
            return Vec::new();
        };
        match serde_json::from_slice(&data) {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(path = %self.path.display(), %error, "unreadable history, starting empty");
                Vec::new()
            }
        }
    }

    /// Append one entry (load, push, atomic rewrite).
    pub fn append(&self, entry: HistoryEntry) -> Result<(), PersistError> {
        let mut entries = self.load();
        entries.push(entry);
        let json = serde_json::to_vec_pretty(&entries).map_err(std::io::Error::other)?;
        write_atomic(&self.path, &json)?;
        Ok(())
    }

    /// Render every entry as CSV with a fixed header.
    pub fn export_csv(&self, path: &std::path::Path) -> Result<(), PersistError> {
        let entries = self.load();
        let mut out = String::from(
            "deployment_id,started_at,completed_at,total_jobs,completed_jobs,failed_jobs,status,template_path\n",
        );
        for entry in &entries {
            out.push_str(&format!(
                "{},{},{},{},{},{},{},{}\n",
                escape_csv(&entry.deployment_id),
                escape_csv(&entry.started_at.to_rfc3339()),
                escape_csv(&entry.completed_at.to_rfc3339()),
                entry.total_jobs,
                entry.completed_jobs,
                entry.failed_jobs,
                escape_csv(&entry.status),
                escape_csv(&entry.template_path),
            ));
        }
        write_atomic(path, out.as_bytes())?;
        Ok(())
    }
}

/// Double-quote a CSV field, escaping embedded quotes as `""`.
pub(crate) fn escape_csv(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;

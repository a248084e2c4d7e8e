// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deployment summary export (CSV).

use crate::history::{escape_csv, PersistError};
use chrono::{DateTime, Utc};
use convoy_core::fsio::write_atomic;
use convoy_core::{Destination, TransferJob};
use std::path::Path;

/// Per-destination rollup rendered into the summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DestinationSummary {
    pub destination: Destination,
    pub progress_percent: i64,
    /// Status lines accumulated for this destination, oldest first.
    pub events: Vec<String>,
}

/// Sectioned CSV summary of one deployment.
pub struct SummaryReport;

impl SummaryReport {
    /// Write the three-section CSV: deployment header, destinations, jobs.
    pub fn export_csv(
        path: &Path,
        deployment_id: &str,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        jobs: &[TransferJob],
        destinations: &[DestinationSummary],
    ) -> Result<(), PersistError> {
        let mut out = String::from("Deployment Summary\n");
        out.push_str(&format!("deployment_id,{}\n", escape_csv(deployment_id)));
        out.push_str(&format!("started_at,{}\n", escape_csv(&started_at.to_rfc3339())));
        out.push_str(&format!("completed_at,{}\n", escape_csv(&completed_at.to_rfc3339())));

        out.push_str("\nDestinations\n");
        out.push_str("destination_id,hostname,ip_address,status,progress_percent,last_seen,events\n");
        for summary in destinations {
            let destination = &summary.destination;
            out.push_str(&format!(
                "{},{},{},{},{},{},{}\n",
                escape_csv(&destination.destination_id),
                escape_csv(&destination.hostname),
                escape_csv(&destination.ip_address),
                escape_csv(&destination.status),
                summary.progress_percent,
                escape_csv(&last_seen_rfc3339(destination.last_seen)),
                escape_csv(&summary.events.join(" | ")),
            ));
        }

        out.push_str("\nJobs\n");
        out.push_str("job_id,source_user,destination_id,status,bytes_transferred,total_bytes,error\n");
        for job in jobs {
            out.push_str(&format!(
                "{},{},{},{},{},{},{}\n",
                escape_csv(&job.job_id),
                escape_csv(&job.source.username),
                escape_csv(&job.destination.destination_id),
                escape_csv(&job.status.to_string()),
                job.bytes_transferred,
                job.total_bytes,
                escape_csv(&job.error_message),
            ));
        }

        write_atomic(path, out.as_bytes())?;
        Ok(())
    }
}

fn last_seen_rfc3339(epoch_secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(epoch_secs, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;

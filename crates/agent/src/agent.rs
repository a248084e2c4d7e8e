// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent-side assignment lifecycle over the durable store.
//!
//! Every transition persists; a failed write is surfaced as a warning and
//! the in-memory state stays authoritative until the next successful save.

use crate::store::{AssignmentQueueStore, StoredQueue};
use convoy_core::DeploymentAssignment;

/// In-memory queue state mirrored to disk on each transition.
pub struct AgentState {
    store: AssignmentQueueStore,
    state: StoredQueue,
}

impl AgentState {
    /// Load whatever survived the last run.
    pub fn load(store: AssignmentQueueStore) -> Self {
        let state = store.load();
        Self { store, state }
    }

    pub fn state(&self) -> &StoredQueue {
        &self.state
    }

    /// A new assignment arrived over the control stream.
    pub fn enqueue(&mut self, assignment: DeploymentAssignment) {
        self.set_status(&assignment.job_id, "queued", "assignment received");
        self.state.queue.push(assignment);
        self.persist();
    }

    /// Promote the queue head when nothing is active. Returns the now
    /// active assignment for the data plane.
    pub fn activate_next(&mut self) -> Option<DeploymentAssignment> {
        if self.state.has_active() || self.state.queue.is_empty() {
            return None;
        }
        let next = self.state.queue.remove(0);
        self.state.active = next.clone();
        self.set_status(&next.job_id, "transferring", "transfer started");
        self.persist();
        Some(next)
    }

    pub fn record_progress(&mut self, job_id: &str, percent: i64) {
        self.state
            .event_by_job
            .insert(job_id.to_string(), format!("{percent}% transferred"));
        self.persist();
    }

    pub fn pause(&mut self, job_id: &str) {
        self.set_status(job_id, "paused", "paused by orchestrator");
        self.persist();
    }

    pub fn resume(&mut self, job_id: &str) {
        self.set_status(job_id, "transferring", "resumed by orchestrator");
        self.persist();
    }

    pub fn cancel(&mut self, job_id: &str) {
        self.set_status(job_id, "canceled", "canceled by orchestrator");
        self.clear_active_if(job_id);
        self.persist();
    }

    /// Terminal report from the data plane; frees the active slot.
    pub fn complete(&mut self, job_id: &str, success: bool) {
        let status = if success { "complete" } else { "failed" };
        self.set_status(job_id, status, "transfer finished");
        self.clear_active_if(job_id);
        self.persist();
    }

    fn clear_active_if(&mut self, job_id: &str) {
        if self.state.active.job_id == job_id {
            self.state.active = DeploymentAssignment::default();
        }
    }

    fn set_status(&mut self, job_id: &str, status: &str, event: &str) {
        if job_id.is_empty() {
            return;
        }
        self.state.status_by_job.insert(job_id.to_string(), status.to_string());
        self.state.event_by_job.insert(job_id.to_string(), event.to_string());
    }

    fn persist(&self) {
        if let Err(error) = self.store.save(&self.state) {
            tracing::warn!(%error, path = %self.store.path().display(), "queue persist failed");
        }
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;

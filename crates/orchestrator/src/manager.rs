// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parallel job manager: global concurrency bound, priority scheduling,
//! retry backoff, and advisory bandwidth allocation.
//!
//! Independent of the orchestrator's per-destination serializer. All state
//! lives on the event-loop task; every operation completes synchronously
//! and returns the events it raised. The runtime owns the single retry
//! timer and re-enters via [`ParallelJobManager::on_retry_timer`].

use convoy_core::{
    Clock, Destination, JobPriority, JobStatus, Mapping, MappingKind, SourceProfile,
    SystemClock, TransferJob,
};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// Exponent cap for the retry backoff doubling.
const MAX_BACKOFF_SHIFT: u32 = 6;

/// Iteration bound for the bandwidth remainder distribution; guards against
/// integer-division roundoff loops.
const MAX_REBALANCE_ITERATIONS: u32 = 1000;

/// Events raised by manager operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerEvent {
    DeploymentStarted { deployment_id: String },
    DeploymentProgress { completed: usize, total: usize },
    DeploymentComplete { deployment_id: String, success: bool },

    /// Ask the data plane to launch this transfer.
    JobStartRequested { job_id: String, source: SourceProfile, destination: Destination },
    JobBandwidthUpdateRequested { job_id: String, max_bandwidth_kbps: i64 },
    JobPauseRequested { job_id: String },
    JobResumeRequested { job_id: String },
    JobCancelRequested { job_id: String },

    JobStarted { job_id: String },
    JobUpdated { job_id: String, progress_percent: i64 },
    JobCompleted { job_id: String, success: bool, error: String },
}

/// Bounded-concurrency scheduler for one deployment's transfer jobs.
pub struct ParallelJobManager<C: Clock = SystemClock> {
    deployment_id: String,
    deployment_paused: bool,

    jobs: IndexMap<String, TransferJob>,
    queue: Vec<String>,
    active: HashSet<String>,
    completed: HashSet<String>,
    failed: HashSet<String>,
    retry_schedule: HashMap<String, Instant>,

    max_concurrent: usize,
    global_bandwidth_limit_mbps: i64,
    per_job_bandwidth_limit_mbps: i64,
    retry_base_ms: u64,
    retry_max_ms: u64,
    default_priority: JobPriority,

    clock: C,
}

impl<C: Clock> ParallelJobManager<C> {
    pub fn new(clock: C) -> Self {
        Self {
            deployment_id: String::new(),
            deployment_paused: false,
            jobs: IndexMap::new(),
            queue: Vec::new(),
            active: HashSet::new(),
            completed: HashSet::new(),
            failed: HashSet::new(),
            retry_schedule: HashMap::new(),
            max_concurrent: 10,
            global_bandwidth_limit_mbps: 0,
            per_job_bandwidth_limit_mbps: 0,
            retry_base_ms: 2_000,
            retry_max_ms: 60_000,
            default_priority: JobPriority::Normal,
            clock,
        }
    }

    // -- configuration --

    pub fn set_max_concurrent(&mut self, count: usize) -> Vec<ManagerEvent> {
        self.max_concurrent = count.max(1);
        self.start_next_jobs()
    }

    pub fn set_global_bandwidth_limit(&mut self, mbps: i64) -> Vec<ManagerEvent> {
        self.global_bandwidth_limit_mbps = mbps.max(0);
        self.rebalance_bandwidth()
    }

    pub fn set_per_job_bandwidth_limit(&mut self, mbps: i64) -> Vec<ManagerEvent> {
        self.per_job_bandwidth_limit_mbps = mbps.max(0);
        self.rebalance_bandwidth()
    }

    pub fn set_retry_backoff(&mut self, base_ms: u64, max_ms: u64) {
        self.retry_base_ms = base_ms.max(100);
        self.retry_max_ms = max_ms.max(self.retry_base_ms);
    }

    pub fn set_default_priority(&mut self, priority: JobPriority) {
        self.default_priority = priority;
    }

    pub fn set_job_priority(&mut self, job_id: &str, priority: JobPriority) -> Vec<ManagerEvent> {
        match self.jobs.get_mut(job_id) {
            Some(job) => job.priority = priority,
            None => return Vec::new(),
        }
        self.start_next_jobs()
    }

    // -- deployment lifecycle --

    /// Reset and enqueue one job per mapped (source, destination) pair.
    pub fn start_deployment(&mut self, mapping: &Mapping) -> Vec<ManagerEvent> {
        self.reset();
        self.deployment_id = if mapping.deployment_id.is_empty() {
            convoy_core::deployment_id()
        } else {
            mapping.deployment_id.clone()
        };

        if mapping.kind == MappingKind::OneToMany && mapping.sources.is_empty() {
            return Vec::new();
        }

        for (source, destination) in mapping.expand() {
            self.enqueue_job(source, destination);
        }

        tracing::info!(
            deployment_id = %self.deployment_id,
            jobs = self.jobs.len(),
            "deployment started"
        );

        let mut events =
            vec![ManagerEvent::DeploymentStarted { deployment_id: self.deployment_id.clone() }];
        events.extend(self.start_next_jobs());
        events
    }

    pub fn pause_deployment(&mut self) -> Vec<ManagerEvent> {
        self.deployment_paused = true;
        let mut events = Vec::new();
        for job_id in &self.active {
            if let Some(job) = self.jobs.get_mut(job_id) {
                job.status = JobStatus::Paused;
                events.push(ManagerEvent::JobPauseRequested { job_id: job_id.clone() });
            }
        }
        events
    }

    pub fn resume_deployment(&mut self) -> Vec<ManagerEvent> {
        self.deployment_paused = false;
        let mut events = Vec::new();
        for job_id in &self.active {
            if let Some(job) = self.jobs.get_mut(job_id) {
                job.status = JobStatus::Transferring;
                events.push(ManagerEvent::JobResumeRequested { job_id: job_id.clone() });
            }
        }
        events.extend(self.start_next_jobs());
        events
    }

    /// Cancel everything still queued or active and finish the deployment.
    pub fn cancel_deployment(&mut self) -> Vec<ManagerEvent> {
        let mut events = Vec::new();

        let active: Vec<String> = self.active.iter().cloned().collect();
        for job_id in active {
            if let Some(job) = self.jobs.get_mut(&job_id) {
                job.status = JobStatus::Canceled;
                job.updated_at_ms = self.clock.epoch_ms();
            }
            events.push(ManagerEvent::JobCancelRequested { job_id });
        }

        for job_id in &self.queue {
            if let Some(job) = self.jobs.get_mut(job_id) {
                job.status = JobStatus::Canceled;
                job.updated_at_ms = self.clock.epoch_ms();
            }
        }

        self.active.clear();
        self.queue.clear();
        self.retry_schedule.clear();

        events.push(self.deployment_progress());
        events.push(ManagerEvent::DeploymentComplete {
            deployment_id: self.deployment_id.clone(),
            success: false,
        });
        events
    }

    // -- per-job control --

    pub fn pause_job(&mut self, job_id: &str) -> Vec<ManagerEvent> {
        match self.jobs.get_mut(job_id) {
            Some(job) if !job.status.is_terminal() => {
                job.status = JobStatus::Paused;
                vec![ManagerEvent::JobPauseRequested { job_id: job_id.to_string() }]
            }
            _ => Vec::new(),
        }
    }

    pub fn resume_job(&mut self, job_id: &str) -> Vec<ManagerEvent> {
        let mut events = Vec::new();
        if let Some(job) = self.jobs.get_mut(job_id) {
            if !job.status.is_terminal() {
                job.status = JobStatus::Transferring;
                events.push(ManagerEvent::JobResumeRequested { job_id: job_id.to_string() });
            }
        }
        events.extend(self.start_next_jobs());
        events
    }

    /// Schedule a failed job for another attempt with exponential backoff.
    ///
    /// The delay is `retry_base * 2^min(retry_count-1, 6)`, capped at
    /// `retry_max`. Complete and canceled jobs are not retryable.
    pub fn retry_job(&mut self, job_id: &str) {
        let now = self.clock.now();
        let epoch_ms = self.clock.epoch_ms();
        let Some(job) = self.jobs.get_mut(job_id) else {
            return;
        };
        if matches!(job.status, JobStatus::Complete | JobStatus::Canceled) {
            return;
        }

        job.retry_count += 1;
        job.status = JobStatus::RetryScheduled;
        job.error_message.clear();
        job.bytes_transferred = 0;
        job.updated_at_ms = epoch_ms;

        let shift = (job.retry_count - 1).min(MAX_BACKOFF_SHIFT);
        let delay_ms = self
            .retry_base_ms
            .saturating_mul(1 << shift)
            .min(self.retry_max_ms);

        tracing::debug!(job_id, retry = job.retry_count, delay_ms, "retry scheduled");

        self.failed.remove(job_id);
        self.active.remove(job_id);
        self.retry_schedule
            .insert(job_id.to_string(), now + Duration::from_millis(delay_ms));

        if !self.queue.iter().any(|id| id == job_id) {
            self.queue.push(job_id.to_string());
        }
    }

    /// Cancel one job. Counts against the deployment like a failure.
    pub fn cancel_job(&mut self, job_id: &str) -> Vec<ManagerEvent> {
        let epoch_ms = self.clock.epoch_ms();
        match self.jobs.get_mut(job_id) {
            Some(job) if !job.status.is_terminal() => {
                job.status = JobStatus::Canceled;
                job.updated_at_ms = epoch_ms;
            }
            _ => return Vec::new(),
        }

        self.queue.retain(|id| id != job_id);
        self.active.remove(job_id);
        self.retry_schedule.remove(job_id);
        self.failed.insert(job_id.to_string());

        let mut events = vec![
            ManagerEvent::JobCancelRequested { job_id: job_id.to_string() },
            ManagerEvent::JobCompleted {
                job_id: job_id.to_string(),
                success: false,
                error: "Canceled".to_string(),
            },
            self.deployment_progress(),
        ];

        if self.is_deployment_complete() {
            events.push(self.deployment_complete());
        } else {
            events.extend(self.start_next_jobs());
        }
        events
    }

    // -- data-plane feedback --

    pub fn update_job_progress(
        &mut self,
        job_id: &str,
        progress_percent: i64,
        bytes_transferred: i64,
        total_bytes: i64,
        speed_mbps: f64,
    ) -> Vec<ManagerEvent> {
        let epoch_ms = self.clock.epoch_ms();
        let Some(job) = self.jobs.get_mut(job_id) else {
            return Vec::new();
        };
        if job.status.is_terminal() {
            return Vec::new();
        }

        job.status = JobStatus::Transferring;
        job.bytes_transferred = bytes_transferred;
        job.total_bytes = total_bytes;
        job.speed_mbps = speed_mbps;
        job.updated_at_ms = epoch_ms;

        vec![
            ManagerEvent::JobUpdated { job_id: job_id.to_string(), progress_percent },
            self.deployment_progress(),
        ]
    }

    /// Record a terminal result from the data plane.
    ///
    /// Emits exactly one `DeploymentComplete` over the deployment's life,
    /// once every job is terminal.
    pub fn mark_job_complete(
        &mut self,
        job_id: &str,
        success: bool,
        error: &str,
    ) -> Vec<ManagerEvent> {
        let epoch_ms = self.clock.epoch_ms();
        match self.jobs.get_mut(job_id) {
            Some(job) if !job.status.is_terminal() => {
                job.status = if success { JobStatus::Complete } else { JobStatus::Failed };
                job.error_message = error.to_string();
                job.updated_at_ms = epoch_ms;
            }
            _ => return Vec::new(),
        }

        self.active.remove(job_id);
        self.retry_schedule.remove(job_id);
        if success {
            self.completed.insert(job_id.to_string());
        } else {
            self.failed.insert(job_id.to_string());
        }

        let mut events = vec![
            ManagerEvent::JobCompleted {
                job_id: job_id.to_string(),
                success,
                error: error.to_string(),
            },
            self.deployment_progress(),
        ];

        if self.is_deployment_complete() {
            events.push(self.deployment_complete());
        } else {
            events.extend(self.start_next_jobs());
        }
        events
    }

    // -- scheduling --

    /// Start queued jobs while capacity allows, highest priority first.
    ///
    /// Jobs whose retry deadline lies in the future and jobs already
    /// canceled are skipped; FIFO breaks ties within a priority. Ends with
    /// a bandwidth rebalance over the active set.
    pub fn start_next_jobs(&mut self) -> Vec<ManagerEvent> {
        if self.deployment_paused {
            return Vec::new();
        }

        let mut events = Vec::new();
        while !self.queue.is_empty() && self.active.len() < self.max_concurrent {
            let now = self.clock.now();
            let mut best: Option<(usize, i64)> = None;

            for (index, job_id) in self.queue.iter().enumerate() {
                let Some(job) = self.jobs.get(job_id) else {
                    continue;
                };
                if job.status == JobStatus::Canceled {
                    continue;
                }
                if let Some(deadline) = self.retry_schedule.get(job_id) {
                    if *deadline > now {
                        continue;
                    }
                }

                let score = job.priority.score();
                if best.map(|(_, s)| score > s).unwrap_or(true) {
                    best = Some((index, score));
                }
            }

            let Some((index, _)) = best else {
                break;
            };

            let job_id = self.queue.remove(index);
            let epoch_ms = self.clock.epoch_ms();
            let Some(job) = self.jobs.get_mut(&job_id) else {
                continue;
            };
            if job.status == JobStatus::Canceled {
                continue;
            }

            job.status = JobStatus::Transferring;
            job.started_at_ms = epoch_ms;
            job.updated_at_ms = epoch_ms;
            self.active.insert(job_id.clone());

            events.push(ManagerEvent::JobStartRequested {
                job_id: job_id.clone(),
                source: job.source.clone(),
                destination: job.destination.clone(),
            });
            events.push(ManagerEvent::JobStarted { job_id });
        }

        events.extend(self.rebalance_bandwidth());
        events
    }

    /// Earliest pending retry deadline, for the runtime's single timer.
    pub fn next_retry_deadline(&self) -> Option<Instant> {
        self.retry_schedule.values().min().copied()
    }

    /// Timer callback: deadlines may have elapsed, try to start work.
    pub fn on_retry_timer(&mut self) -> Vec<ManagerEvent> {
        self.start_next_jobs()
    }

    // -- bandwidth --

    /// Split the global budget across active jobs, weighted by priority.
    ///
    /// Advises every active job on each pass; sums never exceed the global
    /// limit and no job exceeds the per-job cap. Integer kbps throughout.
    pub fn rebalance_bandwidth(&mut self) -> Vec<ManagerEvent> {
        if self.global_bandwidth_limit_mbps <= 0 || self.active.is_empty() {
            return Vec::new();
        }

        let total_kbps = self.global_bandwidth_limit_mbps * 1024;
        let per_job_cap_kbps = if self.per_job_bandwidth_limit_mbps > 0 {
            self.per_job_bandwidth_limit_mbps * 1024
        } else {
            total_kbps
        };

        struct Allocation {
            job_id: String,
            weight: i64,
            cap: i64,
            assigned: i64,
        }

        // Iterate jobs in insertion order so allocation is deterministic.
        let mut allocations: Vec<Allocation> = self
            .jobs
            .iter()
            .filter(|(job_id, _)| self.active.contains(*job_id))
            .map(|(job_id, job)| Allocation {
                job_id: job_id.clone(),
                weight: (job.priority.score() + 1).max(1),
                cap: per_job_cap_kbps,
                assigned: 0,
            })
            .collect();

        let total_weight: i64 = allocations.iter().map(|a| a.weight).sum();

        let mut assigned_total = 0;
        for allocation in &mut allocations {
            let desired = ((total_kbps * allocation.weight) / total_weight).max(1);
            allocation.assigned = desired.min(allocation.cap);
            assigned_total += allocation.assigned;
        }

        let mut remaining = total_kbps - assigned_total;
        let mut iterations = 0;
        while remaining > 0 && iterations < MAX_REBALANCE_ITERATIONS {
            let weight_sum: i64 = allocations
                .iter()
                .filter(|a| a.assigned < a.cap)
                .map(|a| a.weight)
                .sum();
            if weight_sum <= 0 {
                break;
            }

            let mut progress = false;
            for allocation in &mut allocations {
                if allocation.assigned >= allocation.cap {
                    continue;
                }
                let slice = ((remaining * allocation.weight) / weight_sum).max(1);
                let delta = slice.min(allocation.cap - allocation.assigned).min(remaining);
                if delta > 0 {
                    allocation.assigned += delta;
                    remaining -= delta;
                    progress = true;
                    if remaining <= 0 {
                        break;
                    }
                }
            }

            if !progress {
                break;
            }
            iterations += 1;
        }

        allocations
            .into_iter()
            .map(|a| ManagerEvent::JobBandwidthUpdateRequested {
                job_id: a.job_id,
                max_bandwidth_kbps: a.assigned,
            })
            .collect()
    }

    // -- accessors --

    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    pub fn job(&self, job_id: &str) -> Option<&TransferJob> {
        self.jobs.get(job_id)
    }

    pub fn jobs(&self) -> Vec<TransferJob> {
        self.jobs.values().cloned().collect()
    }

    pub fn active_jobs(&self) -> Vec<TransferJob> {
        self.jobs
            .iter()
            .filter(|(id, _)| self.active.contains(*id))
            .map(|(_, job)| job.clone())
            .collect()
    }

    pub fn total_jobs(&self) -> usize {
        self.jobs.len()
    }

    pub fn completed_jobs(&self) -> usize {
        self.completed.len()
    }

    pub fn failed_jobs(&self) -> usize {
        self.failed.len()
    }

    pub fn is_deployment_complete(&self) -> bool {
        let total = self.jobs.len();
        total > 0 && self.completed.len() + self.failed.len() >= total
    }

    // -- internals --

    fn reset(&mut self) {
        self.jobs.clear();
        self.queue.clear();
        self.active.clear();
        self.completed.clear();
        self.failed.clear();
        self.retry_schedule.clear();
        self.deployment_paused = false;
    }

    fn enqueue_job(&mut self, source: SourceProfile, destination: Destination) {
        let job = TransferJob {
            job_id: convoy_core::job_id(),
            total_bytes: source.profile_size_bytes,
            source,
            destination,
            status: JobStatus::Queued,
            priority: self.default_priority,
            updated_at_ms: self.clock.epoch_ms(),
            ..TransferJob::default()
        };
        self.queue.push(job.job_id.clone());
        self.jobs.insert(job.job_id.clone(), job);
    }

    fn deployment_progress(&self) -> ManagerEvent {
        ManagerEvent::DeploymentProgress {
            completed: self.completed.len(),
            total: self.jobs.len(),
        }
    }

    fn deployment_complete(&self) -> ManagerEvent {
        ManagerEvent::DeploymentComplete {
            deployment_id: self.deployment_id.clone(),
            success: self.failed.is_empty(),
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;

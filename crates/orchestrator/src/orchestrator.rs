// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Migration orchestrator: wires the registry, deployment queue, and
//! mapping engine to the control-plane server.
//!
//! Invariant: at most one in-flight assignment per destination. Overflow
//! for a busy destination lands in that destination's own FIFO and is
//! dispatched the moment its current assignment completes.

use crate::mapping::MappingEngine;
use crate::queue::{DeploymentQueue, QueueEvent};
use crate::registry::{check_readiness, DestinationRegistry, RegistryEvent};
use convoy_core::{
    Clock, DeploymentAssignment, DeploymentCompletion, DeploymentProgress, Destination,
    DestinationHealth, Strategy, SystemClock,
};
use convoy_wire::ControlAction;
use std::collections::{HashMap, HashSet, VecDeque};

/// Safety bound on one assignment pass.
const MAX_ASSIGN_PASS: usize = 1000;

/// Outbound side of the server, injected so the orchestrator never owns a
/// reference back into the component that owns it.
pub trait ServerLink {
    fn send_health_check(&self, destination_id: &str);
    fn send_deployment_assign(&self, destination_id: &str, assignment: &DeploymentAssignment);
    fn send_assignment_control(
        &self,
        destination_id: &str,
        deployment_id: &str,
        job_id: &str,
        action: ControlAction,
    );
}

/// Events surfaced to the runtime and operator layer.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    Status(String),
    DestinationRegistered(Destination),
    DestinationUpdated(Destination),
    DestinationRemoved(String),
    /// An assignment entered the deployment queue.
    DeploymentReady(DeploymentAssignment),
    /// A readiness gate turned an assignment away. Operator-recoverable.
    DeploymentRejected { destination_id: String, reason: String },
    Progress(DeploymentProgress),
    Completed(DeploymentCompletion),
    /// Deployment-wide percent: mean over all registered destinations.
    AggregateProgress { completed: usize, total: usize, percent: i64 },
}

/// Central coordinator for one orchestrator process.
pub struct MigrationOrchestrator<L: ServerLink, C: Clock = SystemClock> {
    registry: DestinationRegistry<C>,
    queue: DeploymentQueue,
    engine: MappingEngine,
    link: L,

    /// Destinations with an in-flight assignment.
    active_destinations: HashSet<String>,
    /// Overflow per destination, strictly FIFO.
    pending_assignments: HashMap<String, VecDeque<DeploymentAssignment>>,
    progress_by_destination: HashMap<String, DeploymentProgress>,
    completed_destinations: HashSet<String>,
    auto_assign: bool,
}

impl<L: ServerLink, C: Clock> MigrationOrchestrator<L, C> {
    pub fn new(stale_timeout_secs: u64, strategy: Strategy, link: L, clock: C) -> Self {
        Self {
            registry: DestinationRegistry::new(stale_timeout_secs, clock),
            queue: DeploymentQueue::new(),
            engine: MappingEngine::new(strategy),
            link,
            active_destinations: HashSet::new(),
            pending_assignments: HashMap::new(),
            progress_by_destination: HashMap::new(),
            completed_destinations: HashSet::new(),
            auto_assign: true,
        }
    }

    pub fn registry(&self) -> &DestinationRegistry<C> {
        &self.registry
    }

    pub fn pending_count(&self) -> usize {
        self.queue.pending_count()
    }

    pub fn set_strategy(&mut self, strategy: Strategy) -> Vec<OrchestratorEvent> {
        self.engine.set_strategy(strategy);
        self.try_assign_queued()
    }

    pub fn set_auto_assign(&mut self, enabled: bool) -> Vec<OrchestratorEvent> {
        self.auto_assign = enabled;
        if enabled {
            self.try_assign_queued()
        } else {
            Vec::new()
        }
    }

    // -- inbound from server / discovery --

    /// A destination registered over the control stream or was discovered
    /// via UDP.
    pub fn register_destination(&mut self, destination: Destination) -> Vec<OrchestratorEvent> {
        let hostname = destination.hostname.clone();
        let mut events = vec![match self.registry.register(destination) {
            RegistryEvent::Registered(d) => OrchestratorEvent::DestinationRegistered(d),
            RegistryEvent::Updated(d) => OrchestratorEvent::DestinationUpdated(d),
            RegistryEvent::Removed(id) => OrchestratorEvent::DestinationRemoved(id),
        }];
        events.push(OrchestratorEvent::Status(format!("Destination registered: {hostname}")));
        events.extend(self.try_assign_queued());
        events
    }

    pub fn update_health(
        &mut self,
        destination_id: &str,
        health: DestinationHealth,
    ) -> Vec<OrchestratorEvent> {
        let mut events = Vec::new();
        if let Some(RegistryEvent::Updated(d)) =
            self.registry.update_health(destination_id, health)
        {
            events.push(OrchestratorEvent::DestinationUpdated(d));
            events.extend(self.try_assign_queued());
        }
        events
    }

    /// Stream closed for a registered destination.
    pub fn destination_disconnected(&mut self, destination_id: &str) -> Vec<OrchestratorEvent> {
        let mut events = Vec::new();
        if self.registry.remove(destination_id).is_some() {
            events.push(OrchestratorEvent::DestinationRemoved(destination_id.to_string()));
        }
        self.active_destinations.remove(destination_id);
        events.extend(self.try_assign_queued());
        events
    }

    /// Prune timer fired: drop stale records and retry placement.
    pub fn prune_stale(&mut self) -> Vec<OrchestratorEvent> {
        let removed = self.registry.prune_stale();
        if removed.is_empty() {
            return Vec::new();
        }
        let mut events: Vec<OrchestratorEvent> = removed
            .into_iter()
            .map(|event| match event {
                RegistryEvent::Removed(id) => {
                    self.active_destinations.remove(&id);
                    OrchestratorEvent::DestinationRemoved(id)
                }
                RegistryEvent::Registered(d) | RegistryEvent::Updated(d) => {
                    OrchestratorEvent::DestinationUpdated(d)
                }
            })
            .collect();
        events.extend(self.try_assign_queued());
        events
    }

    // -- deployment intake --

    /// Queue an assignment for automatic placement.
    pub fn queue_deployment(&mut self, assignment: DeploymentAssignment) -> Vec<OrchestratorEvent> {
        let event = self.queue.enqueue(assignment);
        let mut events = match event {
            QueueEvent::Queued(a) => vec![
                OrchestratorEvent::Status(format!("Deployment queued: {}", a.deployment_id)),
                OrchestratorEvent::DeploymentReady(a),
            ],
            QueueEvent::Rejected { destination_id, reason } => {
                vec![OrchestratorEvent::DeploymentRejected { destination_id, reason }]
            }
        };
        events.extend(self.try_assign_queued());
        events
    }

    /// Queue an assignment intended for one destination, subject to the
    /// readiness gate. Rejection leaves the queue untouched.
    pub fn queue_deployment_for_destination(
        &mut self,
        assignment: DeploymentAssignment,
        destination_id: &str,
        required_free_bytes: i64,
    ) -> Vec<OrchestratorEvent> {
        let registry = &self.registry;
        let event = self.queue.enqueue_for_destination(
            assignment,
            destination_id,
            required_free_bytes,
            |id, required| match registry.get(id) {
                Some(destination) => check_readiness(destination, required),
                None => Err("Destination not found".to_string()),
            },
        );
        let mut events = match event {
            QueueEvent::Queued(a) => vec![
                OrchestratorEvent::Status(format!("Deployment queued: {}", a.deployment_id)),
                OrchestratorEvent::DeploymentReady(a),
            ],
            QueueEvent::Rejected { destination_id, reason } => {
                vec![
                    OrchestratorEvent::Status(format!(
                        "Deployment rejected for {destination_id}: {reason}"
                    )),
                    OrchestratorEvent::DeploymentRejected { destination_id, reason },
                ]
            }
        };
        events.extend(self.try_assign_queued());
        events
    }

    /// Direct a specific assignment at a specific destination, subject to
    /// the readiness gate.
    pub fn assign_to_destination(
        &mut self,
        destination_id: &str,
        assignment: DeploymentAssignment,
        required_free_bytes: i64,
    ) -> Vec<OrchestratorEvent> {
        if let Err(reason) = self.can_assign(destination_id, required_free_bytes) {
            return vec![
                OrchestratorEvent::Status(format!(
                    "Deployment rejected for {destination_id}: {reason}"
                )),
                OrchestratorEvent::DeploymentRejected {
                    destination_id: destination_id.to_string(),
                    reason,
                },
            ];
        }

        if self.active_destinations.contains(destination_id) {
            let deployment_id = assignment.deployment_id.clone();
            self.pending_assignments
                .entry(destination_id.to_string())
                .or_default()
                .push_back(assignment);
            return vec![OrchestratorEvent::Status(format!(
                "Deployment queued for {destination_id}: {deployment_id}"
            ))];
        }

        vec![self.dispatch(destination_id, assignment)]
    }

    // -- control forwarding --

    pub fn pause_assignment(&self, destination_id: &str, deployment_id: &str, job_id: &str) {
        self.link
            .send_assignment_control(destination_id, deployment_id, job_id, ControlAction::Pause);
    }

    pub fn resume_assignment(&self, destination_id: &str, deployment_id: &str, job_id: &str) {
        self.link.send_assignment_control(
            destination_id,
            deployment_id,
            job_id,
            ControlAction::Resume,
        );
    }

    pub fn cancel_assignment(&self, destination_id: &str, deployment_id: &str, job_id: &str) {
        self.link.send_assignment_control(
            destination_id,
            deployment_id,
            job_id,
            ControlAction::Cancel,
        );
    }

    /// Health-poll timer fired: probe every registered destination.
    pub fn poll_health(&self) {
        for destination in self.registry.destinations() {
            if !destination.destination_id.is_empty() {
                self.link.send_health_check(&destination.destination_id);
            }
        }
    }

    // -- progress / completion --

    pub fn handle_progress(&mut self, progress: DeploymentProgress) -> Vec<OrchestratorEvent> {
        if !progress.destination_id.is_empty() {
            self.progress_by_destination
                .insert(progress.destination_id.clone(), progress.clone());
        }
        let mut events = vec![OrchestratorEvent::Progress(progress)];
        events.extend(self.aggregate_progress());
        events
    }

    pub fn handle_completion(
        &mut self,
        completion: DeploymentCompletion,
    ) -> Vec<OrchestratorEvent> {
        let destination_id = completion.destination_id.clone();
        if !destination_id.is_empty() {
            self.completed_destinations.insert(destination_id.clone());
            self.active_destinations.remove(&destination_id);
            let mut progress = self
                .progress_by_destination
                .get(&destination_id)
                .cloned()
                .unwrap_or_default();
            progress.progress_percent = 100;
            progress.destination_id = destination_id.clone();
            self.progress_by_destination.insert(destination_id.clone(), progress);
        }

        let mut events = vec![OrchestratorEvent::Completed(completion)];
        events.extend(self.aggregate_progress());

        if !destination_id.is_empty() {
            events.extend(self.dispatch_pending_for(&destination_id));
        }
        events.extend(self.try_assign_queued());
        events
    }

    // -- internals --

    fn can_assign(&self, destination_id: &str, required_free_bytes: i64) -> Result<(), String> {
        match self.registry.get(destination_id) {
            Some(destination) => check_readiness(destination, required_free_bytes),
            None => Err("Destination not found".to_string()),
        }
    }

    /// Drain the queue while a destination can take work.
    ///
    /// Busy destinations overflow into their per-destination FIFO so the
    /// global queue never head-blocks behind one machine.
    fn try_assign_queued(&mut self) -> Vec<OrchestratorEvent> {
        if !self.auto_assign {
            return Vec::new();
        }

        let mut events = Vec::new();
        let mut safety = 0;
        while let Some(next) = self.queue.peek().cloned() {
            safety += 1;
            if safety > MAX_ASSIGN_PASS {
                break;
            }

            let destinations = self.registry.destinations();
            let selected = self.engine.select_destination(
                &next,
                &destinations,
                &self.active_destinations,
                next.profile_size_bytes,
            );
            let Some(destination_id) = selected else {
                break;
            };

            self.queue.dequeue();
            if self.active_destinations.contains(&destination_id) {
                let deployment_id = next.deployment_id.clone();
                self.pending_assignments
                    .entry(destination_id.clone())
                    .or_default()
                    .push_back(next);
                events.push(OrchestratorEvent::Status(format!(
                    "Deployment queued for {destination_id}: {deployment_id}"
                )));
                continue;
            }

            events.push(self.dispatch(&destination_id, next));
        }
        events
    }

    fn dispatch(
        &mut self,
        destination_id: &str,
        assignment: DeploymentAssignment,
    ) -> OrchestratorEvent {
        self.active_destinations.insert(destination_id.to_string());
        self.link.send_deployment_assign(destination_id, &assignment);
        tracing::info!(
            deployment_id = %assignment.deployment_id,
            destination_id,
            "assignment dispatched"
        );
        OrchestratorEvent::Status(format!(
            "Deployment assigned: {} -> {destination_id}",
            assignment.deployment_id
        ))
    }

    /// Head of the per-destination FIFO goes out immediately on completion.
    fn dispatch_pending_for(&mut self, destination_id: &str) -> Vec<OrchestratorEvent> {
        let Some(queue) = self.pending_assignments.get_mut(destination_id) else {
            return Vec::new();
        };
        let Some(next) = queue.pop_front() else {
            self.pending_assignments.remove(destination_id);
            return Vec::new();
        };
        if queue.is_empty() {
            self.pending_assignments.remove(destination_id);
        }
        vec![self.dispatch(destination_id, next)]
    }

    /// Mean percent over all registered destinations. Destinations without
    /// a report yet count as zero, which under-reports while machines join
    /// mid-deployment.
    fn aggregate_progress(&self) -> Option<OrchestratorEvent> {
        let destinations = self.registry.destinations();
        let total = destinations.len();
        if total == 0 {
            return None;
        }

        let sum: i64 = destinations
            .iter()
            .filter_map(|d| self.progress_by_destination.get(&d.destination_id))
            .map(|p| p.progress_percent)
            .sum();
        Some(OrchestratorEvent::AggregateProgress {
            completed: self.completed_destinations.len(),
            total,
            percent: sum / total as i64,
        })
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;

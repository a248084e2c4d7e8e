// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use convoy_core::{DeploymentAssignment, Destination, FakeClock, JobPriority};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// What the orchestrator asked the server to send.
#[derive(Debug, Clone, PartialEq)]
enum Sent {
    HealthCheck(String),
    Assign { destination_id: String, deployment_id: String },
    Control { destination_id: String, job_id: String, action: ControlAction },
}

#[derive(Default, Clone)]
struct RecordingLink {
    sent: Rc<RefCell<Vec<Sent>>>,
}

impl RecordingLink {
    fn sent(&self) -> Vec<Sent> {
        self.sent.borrow().clone()
    }

    fn assignments(&self) -> Vec<Sent> {
        self.sent
            .borrow()
            .iter()
            .filter(|s| matches!(s, Sent::Assign { .. }))
            .cloned()
            .collect()
    }
}

impl ServerLink for RecordingLink {
    fn send_health_check(&self, destination_id: &str) {
        self.sent.borrow_mut().push(Sent::HealthCheck(destination_id.to_string()));
    }

    fn send_deployment_assign(&self, destination_id: &str, assignment: &DeploymentAssignment) {
        self.sent.borrow_mut().push(Sent::Assign {
            destination_id: destination_id.to_string(),
            deployment_id: assignment.deployment_id.clone(),
        });
    }

    fn send_assignment_control(
        &self,
        destination_id: &str,
        _deployment_id: &str,
        job_id: &str,
        action: ControlAction,
    ) {
        self.sent.borrow_mut().push(Sent::Control {
            destination_id: destination_id.to_string(),
            job_id: job_id.to_string(),
            action,
        });
    }
}

fn orchestrator(
    strategy: Strategy,
) -> (MigrationOrchestrator<RecordingLink, FakeClock>, RecordingLink, FakeClock) {
    let link = RecordingLink::default();
    let clock = FakeClock::new();
    let orchestrator = MigrationOrchestrator::new(30, strategy, link.clone(), clock.clone());
    (orchestrator, link, clock)
}

fn ready_destination(id: &str, free: i64) -> Destination {
    Destination::builder().destination_id(id).free_disk(free).build()
}

fn assignment(deployment_id: &str, size: i64) -> DeploymentAssignment {
    DeploymentAssignment::builder()
        .deployment_id(deployment_id)
        .profile_size_bytes(size)
        .build()
}

fn completion(deployment_id: &str, destination_id: &str) -> DeploymentCompletion {
    DeploymentCompletion {
        deployment_id: deployment_id.into(),
        destination_id: destination_id.into(),
        status: "success".into(),
        ..DeploymentCompletion::default()
    }
}

#[test]
fn largest_free_dispatches_to_the_biggest_destination() {
    let (mut orchestrator, link, _clock) = orchestrator(Strategy::LargestFree);
    orchestrator.register_destination(ready_destination("A", 100));
    orchestrator.register_destination(ready_destination("B", 200));

    orchestrator.queue_deployment(assignment("X", 50));

    assert_eq!(
        link.assignments(),
        vec![Sent::Assign { destination_id: "B".into(), deployment_id: "X".into() }]
    );
}

#[test]
fn per_destination_serialization_holds_the_second_assignment() {
    let (mut orchestrator, link, _clock) = orchestrator(Strategy::LargestFree);
    orchestrator.register_destination(ready_destination("D", 1000));

    orchestrator.queue_deployment(assignment("X", 10));
    orchestrator.queue_deployment(assignment("Y", 10));

    // Only X goes out; Y waits for the destination to free up.
    assert_eq!(
        link.assignments(),
        vec![Sent::Assign { destination_id: "D".into(), deployment_id: "X".into() }]
    );
    assert_eq!(orchestrator.pending_count(), 1);

    orchestrator.handle_completion(completion("X", "D"));

    assert_eq!(
        link.assignments(),
        vec![
            Sent::Assign { destination_id: "D".into(), deployment_id: "X".into() },
            Sent::Assign { destination_id: "D".into(), deployment_id: "Y".into() },
        ]
    );
}

#[test]
fn targeted_assignments_overflow_into_the_destination_fifo() {
    let (mut orchestrator, link, _clock) = orchestrator(Strategy::LargestFree);
    orchestrator.register_destination(ready_destination("D", 1000));

    orchestrator.assign_to_destination("D", assignment("X", 10), 10);
    let events = orchestrator.assign_to_destination("D", assignment("Y", 10), 10);

    assert_eq!(link.assignments().len(), 1);
    assert!(events
        .iter()
        .any(|e| matches!(e, OrchestratorEvent::Status(s) if s.contains("queued for D"))));

    // Completion releases the head of the FIFO immediately.
    orchestrator.handle_completion(completion("X", "D"));
    assert_eq!(link.assignments().len(), 2);
    assert_eq!(
        link.assignments()[1],
        Sent::Assign { destination_id: "D".into(), deployment_id: "Y".into() }
    );
}

#[test]
fn unready_destination_rejects_targeted_assignment() {
    let (mut orchestrator, link, _clock) = orchestrator(Strategy::LargestFree);
    let mut busy = ready_destination("D", 1000);
    busy.health.cpu_usage_percent = 95;
    orchestrator.register_destination(busy);

    let events = orchestrator.assign_to_destination("D", assignment("X", 10), 10);
    assert!(events.iter().any(|e| matches!(
        e,
        OrchestratorEvent::DeploymentRejected { destination_id, reason }
            if destination_id == "D" && reason == "High CPU usage"
    )));
    assert!(link.assignments().is_empty());
}

#[test]
fn unknown_destination_rejects_with_not_found() {
    let (mut orchestrator, _link, _clock) = orchestrator(Strategy::LargestFree);
    let events = orchestrator.assign_to_destination("ghost", assignment("X", 10), 10);
    assert!(events.iter().any(|e| matches!(
        e,
        OrchestratorEvent::DeploymentRejected { reason, .. } if reason == "Destination not found"
    )));
}

#[test]
fn gated_queueing_rejects_before_enqueue() {
    let (mut orchestrator, _link, _clock) = orchestrator(Strategy::LargestFree);
    let events = orchestrator.queue_deployment_for_destination(assignment("X", 10), "ghost", 10);
    assert!(events.iter().any(|e| matches!(
        e,
        OrchestratorEvent::DeploymentRejected { reason, .. } if reason == "Destination not found"
    )));
    assert_eq!(orchestrator.pending_count(), 0);
}

#[test]
fn queued_work_waits_for_a_ready_destination() {
    let (mut orchestrator, link, _clock) = orchestrator(Strategy::LargestFree);

    orchestrator.queue_deployment(assignment("X", 50));
    assert!(link.assignments().is_empty());
    assert_eq!(orchestrator.pending_count(), 1);

    // A registration change retries placement.
    orchestrator.register_destination(ready_destination("A", 100));
    assert_eq!(link.assignments().len(), 1);
    assert_eq!(orchestrator.pending_count(), 0);
}

#[test]
fn insufficient_disk_keeps_work_queued() {
    let (mut orchestrator, link, _clock) = orchestrator(Strategy::LargestFree);
    orchestrator.register_destination(ready_destination("A", 40));

    orchestrator.queue_deployment(assignment("X", 50));
    assert!(link.assignments().is_empty());
    assert_eq!(orchestrator.pending_count(), 1);
}

#[test]
fn aggregate_progress_averages_over_all_registered_destinations() {
    let (mut orchestrator, _link, _clock) = orchestrator(Strategy::LargestFree);
    orchestrator.register_destination(ready_destination("A", 1000));
    orchestrator.register_destination(ready_destination("B", 1000));

    let events = orchestrator.handle_progress(DeploymentProgress {
        deployment_id: "X".into(),
        destination_id: "A".into(),
        progress_percent: 50,
        ..DeploymentProgress::default()
    });

    // B has no report yet and still counts in the denominator.
    assert!(events.iter().any(|e| matches!(
        e,
        OrchestratorEvent::AggregateProgress { completed: 0, total: 2, percent: 25 }
    )));

    let events = orchestrator.handle_completion(completion("X", "A"));
    assert!(events.iter().any(|e| matches!(
        e,
        OrchestratorEvent::AggregateProgress { completed: 1, total: 2, percent: 50 }
    )));
}

#[test]
fn stale_prune_removes_and_frees_the_destination() {
    let (mut orchestrator, link, clock) = orchestrator(Strategy::LargestFree);
    orchestrator.register_destination(ready_destination("Z", 1000));
    orchestrator.queue_deployment(assignment("X", 10));
    assert_eq!(link.assignments().len(), 1);

    clock.advance(Duration::from_secs(31));
    let events = orchestrator.prune_stale();
    assert!(events
        .iter()
        .any(|e| matches!(e, OrchestratorEvent::DestinationRemoved(id) if id == "Z")));
    assert!(orchestrator.registry().is_empty());
}

#[test]
fn disconnect_frees_the_destination_for_reassignment() {
    let (mut orchestrator, link, _clock) = orchestrator(Strategy::LargestFree);
    orchestrator.register_destination(ready_destination("A", 1000));
    orchestrator.queue_deployment(assignment("X", 10));
    orchestrator.queue_deployment(assignment("Y", 10));
    assert_eq!(link.assignments().len(), 1);

    // A drops; on re-register the queued Y is placed.
    orchestrator.destination_disconnected("A");
    assert!(orchestrator.registry().is_empty());
    orchestrator.register_destination(ready_destination("A", 1000));
    assert_eq!(link.assignments().len(), 2);
}

#[test]
fn health_poll_probes_every_registered_destination() {
    let (mut orchestrator, link, _clock) = orchestrator(Strategy::LargestFree);
    orchestrator.register_destination(ready_destination("A", 1000));
    orchestrator.register_destination(ready_destination("B", 1000));

    orchestrator.poll_health();
    let probes: Vec<Sent> = link
        .sent()
        .into_iter()
        .filter(|s| matches!(s, Sent::HealthCheck(_)))
        .collect();
    assert_eq!(
        probes,
        vec![Sent::HealthCheck("A".into()), Sent::HealthCheck("B".into())]
    );
}

#[test]
fn control_requests_forward_without_local_state_changes() {
    let (mut orchestrator, link, _clock) = orchestrator(Strategy::LargestFree);
    orchestrator.register_destination(ready_destination("D", 1000));
    orchestrator.queue_deployment(assignment("X", 10));

    orchestrator.pause_assignment("D", "X", "job-1");
    orchestrator.resume_assignment("D", "X", "job-1");
    orchestrator.cancel_assignment("D", "X", "job-1");

    let controls: Vec<Sent> = link
        .sent()
        .into_iter()
        .filter(|s| matches!(s, Sent::Control { .. }))
        .collect();
    assert_eq!(
        controls,
        vec![
            Sent::Control {
                destination_id: "D".into(),
                job_id: "job-1".into(),
                action: ControlAction::Pause
            },
            Sent::Control {
                destination_id: "D".into(),
                job_id: "job-1".into(),
                action: ControlAction::Resume
            },
            Sent::Control {
                destination_id: "D".into(),
                job_id: "job-1".into(),
                action: ControlAction::Cancel
            },
        ]
    );
    // The destination stays active until it reports completion itself.
    let events = orchestrator.queue_deployment(assignment("Y", 10));
    assert!(!events
        .iter()
        .any(|e| matches!(e, OrchestratorEvent::Status(s) if s.contains("assigned: Y"))));
}

#[test]
fn round_robin_spreads_across_ready_destinations() {
    let (mut orchestrator, link, _clock) = orchestrator(Strategy::RoundRobin);
    orchestrator.register_destination(ready_destination("A", 100));
    orchestrator.register_destination(ready_destination("B", 100));

    orchestrator.queue_deployment(assignment("X", 10));
    orchestrator.queue_deployment(assignment("Y", 10));

    let destinations: Vec<String> = link
        .assignments()
        .into_iter()
        .map(|s| match s {
            Sent::Assign { destination_id, .. } => destination_id,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(destinations, vec!["A", "B"]);
}

#[test]
fn strategy_can_change_mid_deployment() {
    let (mut orchestrator, link, _clock) = orchestrator(Strategy::LargestFree);
    orchestrator.register_destination(ready_destination("A", 100));
    orchestrator.queue_deployment(assignment("X", 10));
    orchestrator.queue_deployment(assignment("Z", 10));
    assert_eq!(link.assignments().len(), 1);
    assert_eq!(orchestrator.pending_count(), 1);

    // The switch retries placement at once; A is still busy so Z waits,
    // then goes out under the new strategy after the completion.
    orchestrator.set_strategy(Strategy::RoundRobin);
    assert_eq!(orchestrator.pending_count(), 1);

    orchestrator.handle_completion(completion("X", "A"));
    assert_eq!(orchestrator.pending_count(), 0);
    assert_eq!(
        link.assignments()[1],
        Sent::Assign { destination_id: "A".into(), deployment_id: "Z".into() }
    );
}

#[test]
fn auto_assign_can_be_disabled() {
    let (mut orchestrator, link, _clock) = orchestrator(Strategy::LargestFree);
    orchestrator.set_auto_assign(false);
    orchestrator.register_destination(ready_destination("A", 1000));
    orchestrator.queue_deployment(assignment("X", 10));
    assert!(link.assignments().is_empty());

    orchestrator.set_auto_assign(true);
    assert_eq!(link.assignments().len(), 1);
}

#[test]
fn priority_rides_along_on_dispatch() {
    let (mut orchestrator, link, _clock) = orchestrator(Strategy::LargestFree);
    orchestrator.register_destination(ready_destination("A", 1000));
    let critical =
        DeploymentAssignment { priority: JobPriority::Critical, ..assignment("X", 10) };
    orchestrator.queue_deployment(critical);
    assert_eq!(link.assignments().len(), 1);
}

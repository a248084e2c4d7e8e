// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use convoy_core::FakeClock;

fn manager() -> (ParallelJobManager<FakeClock>, FakeClock) {
    let clock = FakeClock::new();
    (ParallelJobManager::new(clock.clone()), clock)
}

/// One-to-many mapping: single source fanned out to `n` destinations.
fn fan_out_mapping(n: usize) -> Mapping {
    Mapping {
        deployment_id: "dep-test".into(),
        kind: MappingKind::OneToMany,
        sources: vec![SourceProfile::builder().profile_size_bytes(1000).build()],
        destinations: (0..n)
            .map(|i| Destination::builder().destination_id(format!("D{i}")).build())
            .collect(),
        ..Mapping::default()
    }
}

fn started_ids(events: &[ManagerEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ManagerEvent::JobStartRequested { job_id, .. } => Some(job_id.clone()),
            _ => None,
        })
        .collect()
}

fn last_bandwidth_by_job(events: &[ManagerEvent]) -> HashMap<String, i64> {
    let mut by_job = HashMap::new();
    for event in events {
        if let ManagerEvent::JobBandwidthUpdateRequested { job_id, max_bandwidth_kbps } = event {
            by_job.insert(job_id.clone(), *max_bandwidth_kbps);
        }
    }
    by_job
}

#[test]
fn start_deployment_enqueues_one_job_per_pair_and_bounds_concurrency() {
    let (mut manager, _clock) = manager();
    manager.set_max_concurrent(2);

    let events = manager.start_deployment(&fan_out_mapping(3));
    assert!(matches!(events.first(), Some(ManagerEvent::DeploymentStarted { .. })));
    assert_eq!(manager.total_jobs(), 3);
    assert_eq!(started_ids(&events).len(), 2);
    assert_eq!(manager.active_jobs().len(), 2);
}

#[test]
fn empty_one_to_many_is_a_no_op() {
    let (mut manager, _clock) = manager();
    let mapping = Mapping { kind: MappingKind::OneToMany, ..Mapping::default() };
    assert!(manager.start_deployment(&mapping).is_empty());
    assert_eq!(manager.total_jobs(), 0);
}

#[test]
fn active_never_exceeds_max_concurrent() {
    let (mut manager, _clock) = manager();
    manager.set_max_concurrent(2);
    manager.start_deployment(&fan_out_mapping(5));
    assert_eq!(manager.active_jobs().len(), 2);

    // Each completion starts exactly one replacement while the queue holds.
    for _ in 0..3 {
        let job_id = manager.active_jobs()[0].job_id.clone();
        manager.mark_job_complete(&job_id, true, "");
        assert!(manager.active_jobs().len() <= 2);
    }
}

#[test]
fn higher_priority_queued_jobs_start_first() {
    let (mut manager, _clock) = manager();
    manager.set_max_concurrent(1);
    manager.start_deployment(&fan_out_mapping(3));

    let running = manager.active_jobs()[0].job_id.clone();
    let queued: Vec<String> = manager
        .jobs()
        .iter()
        .filter(|j| j.status == JobStatus::Queued)
        .map(|j| j.job_id.clone())
        .collect();
    assert_eq!(queued.len(), 2);

    // Bump the later queued job to critical; it must start next.
    manager.set_job_priority(&queued[1], JobPriority::Critical);
    let events = manager.mark_job_complete(&running, true, "");
    assert_eq!(started_ids(&events), vec![queued[1].clone()]);
}

#[test]
fn fifo_within_a_priority() {
    let (mut manager, _clock) = manager();
    manager.set_max_concurrent(1);
    manager.start_deployment(&fan_out_mapping(3));

    let running = manager.active_jobs()[0].job_id.clone();
    let queued: Vec<String> = manager
        .jobs()
        .iter()
        .filter(|j| j.status == JobStatus::Queued)
        .map(|j| j.job_id.clone())
        .collect();

    let events = manager.mark_job_complete(&running, true, "");
    assert_eq!(started_ids(&events), vec![queued[0].clone()]);
}

#[test]
fn retry_backoff_stays_within_documented_bounds() {
    let (mut manager, clock) = manager();
    manager.set_max_concurrent(1);
    manager.set_retry_backoff(50, 200);
    manager.start_deployment(&fan_out_mapping(2));

    // First job fails; the freed slot starts the second, which succeeds.
    let job_id = manager.active_jobs()[0].job_id.clone();
    manager.mark_job_complete(&job_id, false, "network dropped");
    let second = manager.active_jobs()[0].job_id.clone();
    manager.mark_job_complete(&second, true, "");

    manager.retry_job(&job_id);

    let deadline = manager.next_retry_deadline().unwrap();
    let delay = deadline - clock.now();
    assert!(delay >= Duration::from_millis(50), "delay {delay:?} below base");
    assert!(delay <= Duration::from_millis(250), "delay {delay:?} above max + slack");

    // Not eligible before the deadline.
    assert!(started_ids(&manager.on_retry_timer()).is_empty());

    // Eligible once the clock passes it.
    clock.advance(Duration::from_millis(250));
    let events = manager.on_retry_timer();
    assert_eq!(started_ids(&events), vec![job_id.clone()]);
    assert_eq!(manager.job(&job_id).unwrap().retry_count, 1);
}

#[test]
fn retry_backoff_is_capped_at_retry_max() {
    let (mut manager, clock) = manager();
    manager.set_max_concurrent(1);
    manager.set_retry_backoff(100, 300);
    manager.start_deployment(&fan_out_mapping(1));

    let job_id = manager.active_jobs()[0].job_id.clone();
    for _ in 0..10 {
        manager.mark_job_complete(&job_id, false, "still failing");
        manager.retry_job(&job_id);
        let delay = manager.next_retry_deadline().unwrap() - clock.now();
        assert!(delay <= Duration::from_millis(300));
        clock.advance(Duration::from_millis(300));
        manager.on_retry_timer();
    }
    assert_eq!(manager.job(&job_id).unwrap().retry_count, 10);
}

#[test]
fn retry_clears_error_and_requeues_once() {
    let (mut manager, _clock) = manager();
    manager.set_max_concurrent(1);
    manager.start_deployment(&fan_out_mapping(1));
    let job_id = manager.active_jobs()[0].job_id.clone();

    manager.mark_job_complete(&job_id, false, "boom");
    assert_eq!(manager.failed_jobs(), 1);

    manager.retry_job(&job_id);
    manager.retry_job(&job_id);

    let job = manager.job(&job_id).unwrap();
    assert_eq!(job.status, JobStatus::RetryScheduled);
    assert!(job.error_message.is_empty());
    assert_eq!(job.retry_count, 2);
    assert_eq!(manager.failed_jobs(), 0);
}

#[test]
fn priority_weighted_bandwidth_split() {
    let (mut manager, _clock) = manager();
    manager.start_deployment(&fan_out_mapping(2));
    let jobs = manager.active_jobs();
    let critical = jobs[0].job_id.clone();
    let low = jobs[1].job_id.clone();
    manager.set_job_priority(&critical, JobPriority::Critical);
    manager.set_job_priority(&low, JobPriority::Low);

    let events = manager.set_global_bandwidth_limit(100);
    let by_job = last_bandwidth_by_job(&events);

    let critical_kbps = by_job[&critical];
    let low_kbps = by_job[&low];
    assert!(critical_kbps > low_kbps);
    assert!(critical_kbps + low_kbps <= 100 * 1024);
    // Weights 4:1 over 102400 kbps.
    assert_eq!(critical_kbps, 81_920);
    assert_eq!(low_kbps, 20_480);
}

#[test]
fn per_job_cap_bounds_each_allocation() {
    let (mut manager, _clock) = manager();
    manager.start_deployment(&fan_out_mapping(2));
    manager.set_per_job_bandwidth_limit(4);

    let events = manager.set_global_bandwidth_limit(10);
    let by_job = last_bandwidth_by_job(&events);
    assert_eq!(by_job.len(), 2);
    for kbps in by_job.values() {
        assert_eq!(*kbps, 4 * 1024);
    }
}

#[test]
fn no_global_limit_means_no_bandwidth_events() {
    let (mut manager, _clock) = manager();
    let events = manager.start_deployment(&fan_out_mapping(2));
    assert!(last_bandwidth_by_job(&events).is_empty());
}

#[test]
fn inactive_jobs_receive_no_bandwidth_events() {
    let (mut manager, _clock) = manager();
    manager.set_max_concurrent(1);
    manager.start_deployment(&fan_out_mapping(3));

    let events = manager.set_global_bandwidth_limit(100);
    assert_eq!(last_bandwidth_by_job(&events).len(), 1);
}

#[test]
fn deployment_completes_once_with_failure_accounting() {
    let (mut manager, _clock) = manager();
    manager.start_deployment(&fan_out_mapping(2));
    let jobs: Vec<String> = manager.active_jobs().iter().map(|j| j.job_id.clone()).collect();

    let events = manager.mark_job_complete(&jobs[0], true, "");
    assert!(!events
        .iter()
        .any(|e| matches!(e, ManagerEvent::DeploymentComplete { .. })));

    let events = manager.mark_job_complete(&jobs[1], false, "disk full");
    let complete: Vec<&ManagerEvent> = events
        .iter()
        .filter(|e| matches!(e, ManagerEvent::DeploymentComplete { .. }))
        .collect();
    assert_eq!(complete.len(), 1);
    assert!(matches!(
        complete[0],
        ManagerEvent::DeploymentComplete { success: false, .. }
    ));

    // Double completion is ignored; no second terminal event.
    assert!(manager.mark_job_complete(&jobs[1], true, "").is_empty());
}

#[test]
fn all_success_reports_deployment_success() {
    let (mut manager, _clock) = manager();
    manager.start_deployment(&fan_out_mapping(2));
    let jobs: Vec<String> = manager.active_jobs().iter().map(|j| j.job_id.clone()).collect();

    manager.mark_job_complete(&jobs[0], true, "");
    let events = manager.mark_job_complete(&jobs[1], true, "");
    assert!(events
        .iter()
        .any(|e| matches!(e, ManagerEvent::DeploymentComplete { success: true, .. })));
}

#[test]
fn cancel_job_counts_as_failed_and_emits_both_events() {
    let (mut manager, _clock) = manager();
    manager.start_deployment(&fan_out_mapping(2));
    let job_id = manager.active_jobs()[0].job_id.clone();

    let events = manager.cancel_job(&job_id);
    assert!(events
        .iter()
        .any(|e| matches!(e, ManagerEvent::JobCancelRequested { .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        ManagerEvent::JobCompleted { success: false, error, .. } if error == "Canceled"
    )));
    assert_eq!(manager.job(&job_id).unwrap().status, JobStatus::Canceled);
    assert_eq!(manager.failed_jobs(), 1);
}

#[test]
fn canceled_jobs_never_restart() {
    let (mut manager, _clock) = manager();
    manager.set_max_concurrent(1);
    manager.start_deployment(&fan_out_mapping(2));

    let queued: Vec<String> = manager
        .jobs()
        .iter()
        .filter(|j| j.status == JobStatus::Queued)
        .map(|j| j.job_id.clone())
        .collect();
    manager.cancel_job(&queued[0]);

    let running = manager.active_jobs()[0].job_id.clone();
    let events = manager.mark_job_complete(&running, true, "");
    assert!(started_ids(&events).is_empty());
    assert!(events
        .iter()
        .any(|e| matches!(e, ManagerEvent::DeploymentComplete { success: false, .. })));
}

#[test]
fn cancel_deployment_cancels_queued_and_active() {
    let (mut manager, _clock) = manager();
    manager.set_max_concurrent(1);
    manager.start_deployment(&fan_out_mapping(3));

    let events = manager.cancel_deployment();
    let cancel_requests = events
        .iter()
        .filter(|e| matches!(e, ManagerEvent::JobCancelRequested { .. }))
        .count();
    assert_eq!(cancel_requests, 1, "only the active job gets a cancel request");
    assert!(events
        .iter()
        .any(|e| matches!(e, ManagerEvent::DeploymentComplete { success: false, .. })));
    assert!(manager.jobs().iter().all(|j| j.status == JobStatus::Canceled));
}

#[test]
fn pause_holds_the_queue_and_resume_releases_it() {
    let (mut manager, _clock) = manager();
    manager.set_max_concurrent(1);
    manager.start_deployment(&fan_out_mapping(2));
    let running = manager.active_jobs()[0].job_id.clone();

    let events = manager.pause_deployment();
    assert_eq!(
        events,
        vec![ManagerEvent::JobPauseRequested { job_id: running.clone() }]
    );
    assert_eq!(manager.job(&running).unwrap().status, JobStatus::Paused);

    // Nothing starts while paused.
    assert!(manager.start_next_jobs().is_empty());

    let events = manager.resume_deployment();
    assert!(events
        .iter()
        .any(|e| matches!(e, ManagerEvent::JobResumeRequested { .. })));
    assert_eq!(manager.job(&running).unwrap().status, JobStatus::Transferring);
}

#[test]
fn progress_updates_do_not_resurrect_terminal_jobs() {
    let (mut manager, _clock) = manager();
    manager.start_deployment(&fan_out_mapping(1));
    let job_id = manager.active_jobs()[0].job_id.clone();

    manager.mark_job_complete(&job_id, true, "");
    assert!(manager.update_job_progress(&job_id, 50, 1, 2, 0.5).is_empty());
    assert_eq!(manager.job(&job_id).unwrap().status, JobStatus::Complete);
}

#[test]
fn progress_updates_track_counters() {
    let (mut manager, _clock) = manager();
    manager.start_deployment(&fan_out_mapping(1));
    let job_id = manager.active_jobs()[0].job_id.clone();

    let events = manager.update_job_progress(&job_id, 40, 400, 1000, 12.5);
    assert!(events
        .iter()
        .any(|e| matches!(e, ManagerEvent::JobUpdated { progress_percent: 40, .. })));
    let job = manager.job(&job_id).unwrap();
    assert_eq!(job.bytes_transferred, 400);
    assert_eq!(job.total_bytes, 1000);
    assert!((job.speed_mbps - 12.5).abs() < f64::EPSILON);
}

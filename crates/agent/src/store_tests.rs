// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use convoy_core::JobPriority;

fn assignment(job_id: &str) -> DeploymentAssignment {
    DeploymentAssignment::builder().job_id(job_id).priority(JobPriority::High).build()
}

#[test]
fn save_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = AssignmentQueueStore::new(dir.path().join("queue.json"));

    let mut state = StoredQueue { active: assignment("job-1"), ..StoredQueue::default() };
    state.queue.push(assignment("job-2"));
    state.status_by_job.insert("job-1".into(), "transferring".into());
    state.event_by_job.insert("job-1".into(), "50% complete".into());

    store.save(&state).unwrap();
    assert_eq!(store.load(), state);
}

#[test]
fn missing_file_loads_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let store = AssignmentQueueStore::new(dir.path().join("absent.json"));
    let state = store.load();
    assert_eq!(state, StoredQueue::default());
    assert!(!state.has_active());
}

#[test]
fn corrupt_file_loads_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.json");
    std::fs::write(&path, "][").unwrap();
    let store = AssignmentQueueStore::new(&path);
    assert_eq!(store.load(), StoredQueue::default());
}

#[test]
fn document_uses_the_documented_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.json");
    let store = AssignmentQueueStore::new(&path);
    store.save(&StoredQueue::default()).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    for key in ["active", "queue", "status_by_job", "event_by_job"] {
        assert!(raw.get(key).is_some(), "missing key {key}");
    }
}

#[test]
fn save_into_missing_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let store = AssignmentQueueStore::new(dir.path().join("no/dir/queue.json"));
    assert!(store.save(&StoredQueue::default()).is_err());
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;

fn entry(deployment_id: &str) -> HistoryEntry {
    HistoryEntry {
        deployment_id: deployment_id.into(),
        started_at: Utc.with_ymd_and_hms(2026, 1, 10, 9, 0, 0).unwrap(),
        completed_at: Utc.with_ymd_and_hms(2026, 1, 10, 9, 45, 0).unwrap(),
        total_jobs: 4,
        completed_jobs: 3,
        failed_jobs: 1,
        status: "completed_with_failures".into(),
        template_path: "/templates/wave1.json".into(),
    }
}

#[test]
fn append_then_load_ends_with_the_entry() {
    let dir = tempfile::tempdir().unwrap();
    let history = DeploymentHistory::new(dir.path().join("history.json"));

    history.append(entry("dep-1")).unwrap();
    history.append(entry("dep-2")).unwrap();

    let entries = history.load();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries.last().unwrap().deployment_id, "dep-2");
    assert_eq!(entries[0], entry("dep-1"));
}

#[test]
fn missing_file_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let history = DeploymentHistory::new(dir.path().join("absent.json"));
    assert!(history.load().is_empty());
}

#[test]
fn corrupt_file_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    std::fs::write(&path, "{{{{").unwrap();
    let history = DeploymentHistory::new(&path);
    assert!(history.load().is_empty());

    // A fresh append recovers the file.
    history.append(entry("dep-1")).unwrap();
    assert_eq!(history.load().len(), 1);
}

#[test]
fn append_to_unwritable_path_fails_without_partial_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no/such/history.json");
    let history = DeploymentHistory::new(&path);
    assert!(history.append(entry("dep-1")).is_err());
    assert!(!path.exists());
}

#[test]
fn csv_export_quotes_and_escapes() {
    let dir = tempfile::tempdir().unwrap();
    let history = DeploymentHistory::new(dir.path().join("history.json"));
    let mut quoted = entry("dep-1");
    quoted.status = "say \"done\"".into();
    history.append(quoted).unwrap();

    let csv_path = dir.path().join("history.csv");
    history.export_csv(&csv_path).unwrap();
    let csv = std::fs::read_to_string(&csv_path).unwrap();

    let mut lines = csv.lines();
    assert_eq!(
        lines.next().unwrap(),
        "deployment_id,started_at,completed_at,total_jobs,completed_jobs,failed_jobs,status,template_path"
    );
    let row = lines.next().unwrap();
    assert!(row.starts_with("\"dep-1\","));
    assert!(row.contains("\"say \"\"done\"\"\""));
    assert!(row.contains(",4,3,1,"));
}

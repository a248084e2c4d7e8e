// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn write_atomic_replaces_contents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    write_atomic(&path, b"first").unwrap();
    assert_eq!(fs::read(&path).unwrap(), b"first");

    write_atomic(&path, b"second").unwrap();
    assert_eq!(fs::read(&path).unwrap(), b"second");

    // The temp sibling never lingers.
    assert!(!path.with_extension("tmp").exists());
}

#[test]
fn write_atomic_fails_for_missing_parent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no/such/dir/state.json");
    assert!(write_atomic(&path, b"data").is_err());
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn register_payload_fills_defaults_for_absent_fields() {
    let json = r#"{"hostname":"HOST"}"#;
    let destination: Destination = serde_json::from_str(json).unwrap();
    assert_eq!(destination.hostname, "HOST");
    assert_eq!(destination.control_port, 54322);
    assert_eq!(destination.data_port, 54323);
    assert_eq!(destination.status, "unknown");
    assert!(destination.health.agent_running);
    assert!(destination.health.admin_rights);
}

#[test]
fn health_booleans_default_true() {
    let health: DestinationHealth = serde_json::from_str(r#"{"cpu_usage_percent":12}"#).unwrap();
    assert_eq!(health.cpu_usage_percent, 12);
    assert!(health.agent_running);
    assert!(health.admin_rights);
}

#[test]
fn ensure_id_derives_hostname_at_ip() {
    let mut destination = Destination {
        hostname: "HOST".into(),
        ip_address: "10.0.0.5".into(),
        ..Destination::default()
    };
    destination.ensure_id();
    assert_eq!(destination.destination_id, "HOST@10.0.0.5");

    // An existing id is never overwritten.
    destination.hostname = "OTHER".into();
    destination.ensure_id();
    assert_eq!(destination.destination_id, "HOST@10.0.0.5");
}

#[test]
fn round_trips_through_json() {
    let destination = Destination::builder()
        .destination_id("D1")
        .free_disk(10 * 1024 * 1024 * 1024)
        .build();
    let json = serde_json::to_string(&destination).unwrap();
    let back: Destination = serde_json::from_str(&json).unwrap();
    assert_eq!(back, destination);
}

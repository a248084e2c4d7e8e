// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Destination machine record and its health snapshot.

use serde::{Deserialize, Serialize};

/// Resource snapshot reported by a destination agent.
///
/// Readiness checks treat CPU or RAM at 90% or above as "high".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationHealth {
    #[serde(default)]
    pub cpu_usage_percent: i64,
    #[serde(default)]
    pub ram_usage_percent: i64,
    #[serde(default)]
    pub free_disk_bytes: i64,
    #[serde(default)]
    pub network_latency_ms: i64,
    /// Whether the destination-side agent service is running.
    #[serde(default = "default_true")]
    pub agent_running: bool,
    /// Whether the agent holds administrative rights on the machine.
    #[serde(default = "default_true")]
    pub admin_rights: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DestinationHealth {
    fn default() -> Self {
        Self {
            cpu_usage_percent: 0,
            ram_usage_percent: 0,
            free_disk_bytes: 0,
            network_latency_ms: 0,
            agent_running: true,
            admin_rights: true,
        }
    }
}

/// A machine able to receive profiles.
///
/// Created on first register, mutated by register/health/progress messages,
/// removed when `last_seen` exceeds the stale timeout or the control stream
/// closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    #[serde(default)]
    pub destination_id: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default = "default_control_port")]
    pub control_port: u16,
    #[serde(default = "default_data_port")]
    pub data_port: u16,
    /// Free-form status string for operator display.
    #[serde(default = "default_status")]
    pub status: String,
    /// Epoch seconds of the last liveness signal.
    #[serde(default)]
    pub last_seen: i64,
    #[serde(default)]
    pub health: DestinationHealth,
}

fn default_control_port() -> u16 {
    54322
}

fn default_data_port() -> u16 {
    54323
}

fn default_status() -> String {
    "unknown".to_string()
}

impl Default for Destination {
    fn default() -> Self {
        Self {
            destination_id: String::new(),
            hostname: String::new(),
            ip_address: String::new(),
            control_port: default_control_port(),
            data_port: default_data_port(),
            status: default_status(),
            last_seen: 0,
            health: DestinationHealth::default(),
        }
    }
}

/// Stable fallback id for records that register without one.
pub fn derived_destination_id(hostname: &str, ip_address: &str) -> String {
    format!("{hostname}@{ip_address}")
}

impl Destination {
    /// Fill in the id from hostname and ip when the record carries none.
    pub fn ensure_id(&mut self) {
        if self.destination_id.is_empty() {
            self.destination_id = derived_destination_id(&self.hostname, &self.ip_address);
        }
    }
}

crate::builder! {
    pub struct DestinationBuilder => Destination {
        into {
            destination_id: String = "dest-1",
            hostname: String = "host",
            ip_address: String = "10.0.0.1",
            status: String = "ready",
        }
        set {
            control_port: u16 = 54322,
            data_port: u16 = 54323,
            last_seen: i64 = 0,
            health: DestinationHealth = DestinationHealth::default(),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl DestinationBuilder {
    /// Shorthand for setting only the free-disk reading.
    pub fn free_disk(self, bytes: i64) -> Self {
        self.health(DestinationHealth { free_disk_bytes: bytes, ..DestinationHealth::default() })
    }
}

#[cfg(test)]
#[path = "destination_tests.rs"]
mod tests;

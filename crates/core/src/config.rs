// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration surface shared by the orchestrator and agent.

use serde::{Deserialize, Serialize};

/// Destination placement strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Prefer the ready candidate with the most free disk.
    #[default]
    LargestFree,
    /// Rotate over ready candidates.
    RoundRobin,
}

crate::simple_display! {
    Strategy {
        LargestFree => "largest_free",
        RoundRobin => "round_robin",
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "largest_free" => Ok(Strategy::LargestFree),
            "round_robin" => Ok(Strategy::RoundRobin),
            other => Err(format!("unknown strategy: {other}")),
        }
    }
}

/// Tunables with the documented defaults. All fields are optional in any
/// serialized form; absent values fall back to these defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub discovery_port: u16,
    pub control_port: u16,
    pub data_port: u16,
    pub stale_timeout_secs: u64,
    pub health_interval_ms: u64,
    pub reconnect_interval_ms: u64,
    pub max_concurrent: usize,
    /// 0 means unlimited.
    pub global_bandwidth_mbps: i64,
    /// 0 means no per-job cap.
    pub per_job_bandwidth_mbps: i64,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub strategy: Strategy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discovery_port: 54321,
            control_port: 54322,
            data_port: 54323,
            stale_timeout_secs: 30,
            health_interval_ms: 10_000,
            reconnect_interval_ms: 5_000,
            max_concurrent: 10,
            global_bandwidth_mbps: 0,
            per_job_bandwidth_mbps: 0,
            retry_base_ms: 2_000,
            retry_max_ms: 60_000,
            strategy: Strategy::LargestFree,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

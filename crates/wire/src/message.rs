// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed control-plane messages.
//!
//! Serializes with `{"message_type": "NAME", ...fields}` format. Unknown
//! type tags deserialize to `Unknown` and are ignored by receivers; a live
//! stream is never torn down over a message we don't recognize.

use convoy_core::{
    DeploymentAssignment, DeploymentCompletion, DeploymentProgress, Destination,
    DestinationHealth,
};
use serde::{Deserialize, Serialize};

/// Protocol version stamped into every outgoing message.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Action carried by `ASSIGNMENT_CONTROL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Pause,
    Resume,
    Cancel,
}

convoy_core::simple_display! {
    ControlAction {
        Pause => "pause",
        Resume => "resume",
        Cancel => "cancel",
    }
}

/// Messages exchanged over the control stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message_type")]
pub enum Message {
    /// Destination → orchestrator, first message after connect.
    #[serde(rename = "DESTINATION_REGISTER")]
    DestinationRegister { destination_info: Destination },

    /// Orchestrator → destination.
    #[serde(rename = "HEALTH_CHECK_REQUEST")]
    HealthCheckRequest {
        #[serde(default)]
        destination_id: String,
    },

    /// Destination → orchestrator.
    #[serde(rename = "HEALTH_CHECK_RESPONSE")]
    HealthCheckResponse {
        #[serde(default)]
        destination_id: String,
        health_metrics: DestinationHealth,
    },

    /// Orchestrator → destination.
    #[serde(rename = "DEPLOYMENT_ASSIGN")]
    DeploymentAssign {
        #[serde(default)]
        destination_id: String,
        assignment: DeploymentAssignment,
    },

    /// Orchestrator → destination.
    #[serde(rename = "ASSIGNMENT_CONTROL")]
    AssignmentControl {
        #[serde(default)]
        destination_id: String,
        #[serde(default)]
        deployment_id: String,
        #[serde(default)]
        job_id: String,
        action: ControlAction,
    },

    /// Destination → orchestrator.
    #[serde(rename = "PROGRESS_UPDATE")]
    ProgressUpdate {
        #[serde(flatten)]
        progress: DeploymentProgress,
    },

    /// Destination → orchestrator.
    #[serde(rename = "DEPLOYMENT_COMPLETE")]
    DeploymentComplete {
        #[serde(flatten)]
        completion: DeploymentCompletion,
    },

    /// Either direction.
    #[serde(rename = "ERROR")]
    Error {
        #[serde(default)]
        message: String,
    },

    /// Either direction.
    #[serde(rename = "HEARTBEAT")]
    Heartbeat,

    /// Catch-all for unrecognized message types (forward compatibility).
    #[serde(other, skip_serializing)]
    Unknown,
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Discovery datagram payloads.

use convoy_core::Destination;
use serde::{Deserialize, Serialize};

/// Protocol version stamped into every outgoing datagram.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Discovery messages, tagged like the control protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message_type")]
pub enum Datagram {
    /// Orchestrator probe, broadcast every few seconds.
    #[serde(rename = "ORCH_DISCOVERY")]
    OrchDiscovery {
        /// Epoch seconds at send time.
        #[serde(default)]
        timestamp: i64,
        /// Control-plane port the orchestrator listens on.
        orchestrator_port: u16,
    },

    /// Destination presence announcement.
    #[serde(rename = "DESTINATION_ANNOUNCE")]
    DestinationAnnounce {
        #[serde(default)]
        timestamp: i64,
        destination_info: Destination,
    },

    /// Foreign datagrams that happen to parse as tagged JSON.
    #[serde(other, skip_serializing)]
    Unknown,
}

/// Encode a datagram as compact JSON, stamping `protocol_version`.
pub fn encode_datagram(datagram: &Datagram) -> Result<Vec<u8>, serde_json::Error> {
    let mut value = serde_json::to_value(datagram)?;
    if let Some(object) = value.as_object_mut() {
        object.insert("protocol_version".to_string(), PROTOCOL_VERSION.into());
    }
    serde_json::to_vec(&value)
}

/// Decode a datagram; `None` for anything that is not valid tagged JSON.
pub fn decode_datagram(bytes: &[u8]) -> Option<Datagram> {
    serde_json::from_slice(bytes).ok()
}

#[cfg(test)]
#[path = "datagram_tests.rs"]
mod tests;

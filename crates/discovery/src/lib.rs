// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! UDP discovery for orchestrator ↔ destination auto-registration.
//!
//! The orchestrator broadcasts `ORCH_DISCOVERY` probes; destinations
//! broadcast `DESTINATION_ANNOUNCE` and also reply unicast to probes.
//! Datagrams are compact JSON, unframed.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod datagram;
mod service;

pub use datagram::{decode_datagram, encode_datagram, Datagram};
pub use service::{DiscoveryError, DiscoveryEvent, DiscoveryService, BROADCAST_INTERVAL};

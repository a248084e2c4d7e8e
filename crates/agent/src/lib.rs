// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! convoy-agent: the destination-side agent.
//!
//! Keeps one control stream to the orchestrator (reconnecting as needed),
//! answers health checks, accepts assignments into a durable local queue,
//! and relays pause/resume/cancel to the data plane.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod agent;
pub mod client;
pub mod store;

pub use agent::AgentState;
pub use client::{connect, ClientEvent, ClientHandle, ClientOptions};
pub use store::{AssignmentQueueStore, PersistError, StoredQueue};

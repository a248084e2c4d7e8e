// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control protocol for orchestrator ↔ destination communication.
//!
//! Wire format: 4-byte length prefix (big-endian) + compact JSON payload

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod codec;
mod message;

pub use codec::{
    encode, read_message, read_messages, write_message, ProtocolError, MAX_FRAME_LEN,
};
pub use message::{ControlAction, Message, PROTOCOL_VERSION};

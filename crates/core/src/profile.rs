// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Source profile descriptor.

use serde::{Deserialize, Serialize};

/// A user profile on a source machine, selected for migration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceProfile {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub source_hostname: String,
    #[serde(default)]
    pub source_ip: String,
    #[serde(default)]
    pub profile_size_bytes: i64,
}

crate::builder! {
    pub struct SourceProfileBuilder => SourceProfile {
        into {
            username: String = "alice",
            source_hostname: String = "src-host",
            source_ip: String = "10.0.0.2",
        }
        set {
            profile_size_bytes: i64 = 1024,
        }
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deployment mapping: how source profiles bind to destinations.

use crate::destination::Destination;
use crate::profile::SourceProfile;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Shape of a mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappingKind {
    /// Exactly one source replicated to every destination.
    #[default]
    #[serde(rename = "one_to_many")]
    OneToMany,
    /// Sources and destinations paired by index; counts must match.
    #[serde(rename = "many_to_many")]
    ManyToMany,
    /// Explicit source-username → destination-id rules.
    #[serde(rename = "custom")]
    Custom,
}

crate::simple_display! {
    MappingKind {
        OneToMany => "one_to_many",
        ManyToMany => "many_to_many",
        Custom => "custom",
    }
}

/// A user-defined or derived binding pattern, turned into assignments at
/// deployment time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    #[serde(default)]
    pub deployment_id: String,
    #[serde(rename = "type", default)]
    pub kind: MappingKind,
    #[serde(default)]
    pub sources: Vec<SourceProfile>,
    #[serde(default)]
    pub destinations: Vec<Destination>,
    /// Custom rules: source username → destination id (insertion order kept).
    #[serde(default)]
    pub custom_rules: IndexMap<String, String>,
}

impl Mapping {
    /// Expand into (source, destination) transfer pairs.
    ///
    /// OneToMany replicates the single source across every destination;
    /// ManyToMany pairs by index up to the shorter list; Custom follows the
    /// rules, skipping rules that reference an unknown destination.
    pub fn expand(&self) -> Vec<(SourceProfile, Destination)> {
        match self.kind {
            MappingKind::OneToMany => {
                let Some(source) = self.sources.first() else {
                    return Vec::new();
                };
                self.destinations.iter().map(|d| (source.clone(), d.clone())).collect()
            }
            MappingKind::ManyToMany => self
                .sources
                .iter()
                .zip(self.destinations.iter())
                .map(|(s, d)| (s.clone(), d.clone()))
                .collect(),
            MappingKind::Custom => {
                let by_id: IndexMap<&str, &Destination> = self
                    .destinations
                    .iter()
                    .map(|d| (d.destination_id.as_str(), d))
                    .collect();
                self.sources
                    .iter()
                    .filter_map(|source| {
                        let id = self.custom_rules.get(&source.username)?;
                        let destination = by_id.get(id.as_str())?;
                        Some((source.clone(), (*destination).clone()))
                    })
                    .collect()
            }
        }
    }

    /// Bytes each destination must hold for this mapping.
    pub fn required_bytes_by_destination(&self) -> IndexMap<String, i64> {
        let mut required = IndexMap::new();
        match self.kind {
            MappingKind::OneToMany => {
                let bytes = self.sources.first().map(|s| s.profile_size_bytes).unwrap_or(0);
                for destination in &self.destinations {
                    required.insert(destination.destination_id.clone(), bytes);
                }
            }
            MappingKind::ManyToMany => {
                for (source, destination) in self.sources.iter().zip(self.destinations.iter()) {
                    required
                        .insert(destination.destination_id.clone(), source.profile_size_bytes);
                }
            }
            MappingKind::Custom => {
                for source in &self.sources {
                    if let Some(id) = self.custom_rules.get(&source.username) {
                        *required.entry(id.clone()).or_insert(0) += source.profile_size_bytes;
                    }
                }
            }
        }
        required
    }
}

#[cfg(test)]
#[path = "mapping_tests.rs"]
mod tests;

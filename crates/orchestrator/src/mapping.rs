// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mapping engine: builds and validates mappings, checks capacity, and
//! places assignments on destinations.

use crate::registry::check_readiness;
use convoy_core::{
    DeploymentAssignment, Destination, Mapping, MappingKind, SourceProfile, Strategy,
};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Why a mapping was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("No source profiles selected")]
    NoSources,
    #[error("No destinations available")]
    NoDestinations,
    #[error("One-to-many requires exactly one source")]
    OneToManySourceCount,
    #[error("Many-to-many requires sources and destinations to match in count")]
    ManyToManySizeMismatch,
    #[error("Custom mapping rules are empty")]
    EmptyCustomRules,
    #[error("Custom mapping references unknown source: {0}")]
    UnknownSource(String),
    #[error("Custom mapping references unknown destination: {0}")]
    UnknownDestination(String),
}

/// Errors from template persistence.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("template parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] MappingError),
}

/// Stateless validation plus a rotating placement cursor.
#[derive(Default)]
pub struct MappingEngine {
    strategy: Strategy,
    round_robin_cursor: usize,
}

impl MappingEngine {
    pub fn new(strategy: Strategy) -> Self {
        Self { strategy, round_robin_cursor: 0 }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn set_strategy(&mut self, strategy: Strategy) {
        self.strategy = strategy;
    }

    /// Build a one-to-many mapping (single source fanned out).
    pub fn one_to_many(
        &self,
        source: SourceProfile,
        destinations: Vec<Destination>,
    ) -> Result<Mapping, MappingError> {
        let mapping = Mapping {
            deployment_id: convoy_core::deployment_id(),
            kind: MappingKind::OneToMany,
            sources: vec![source],
            destinations,
            custom_rules: IndexMap::new(),
        };
        validate(&mapping)?;
        Ok(mapping)
    }

    /// Build a many-to-many mapping (paired by index).
    pub fn many_to_many(
        &self,
        sources: Vec<SourceProfile>,
        destinations: Vec<Destination>,
    ) -> Result<Mapping, MappingError> {
        let mapping = Mapping {
            deployment_id: convoy_core::deployment_id(),
            kind: MappingKind::ManyToMany,
            sources,
            destinations,
            custom_rules: IndexMap::new(),
        };
        validate(&mapping)?;
        Ok(mapping)
    }

    /// Build a custom mapping from explicit username → destination-id rules.
    pub fn custom(
        &self,
        sources: Vec<SourceProfile>,
        destinations: Vec<Destination>,
        rules: IndexMap<String, String>,
    ) -> Result<Mapping, MappingError> {
        let mapping = Mapping {
            deployment_id: convoy_core::deployment_id(),
            kind: MappingKind::Custom,
            sources,
            destinations,
            custom_rules: rules,
        };
        validate(&mapping)?;
        Ok(mapping)
    }

    /// Pick a destination for an assignment, or `None` when nothing
    /// qualifies (the scheduler backs off until the registry changes).
    ///
    /// Candidates must have a non-empty id, no in-flight assignment, and
    /// pass the readiness check for the required bytes.
    pub fn select_destination(
        &mut self,
        _assignment: &DeploymentAssignment,
        destinations: &[Destination],
        active: &HashSet<String>,
        required_free_bytes: i64,
    ) -> Option<String> {
        let candidates: Vec<&Destination> = destinations
            .iter()
            .filter(|d| !d.destination_id.is_empty())
            .filter(|d| !active.contains(&d.destination_id))
            .filter(|d| check_readiness(d, required_free_bytes).is_ok())
            .collect();

        if candidates.is_empty() {
            return None;
        }

        match self.strategy {
            Strategy::RoundRobin => {
                let index = self.round_robin_cursor % candidates.len();
                self.round_robin_cursor = (index + 1) % candidates.len();
                Some(candidates[index].destination_id.clone())
            }
            Strategy::LargestFree => {
                // Strict > keeps the first-seen candidate on ties.
                let mut selected: Option<&Destination> = None;
                let mut best_free: i64 = -1;
                for &candidate in &candidates {
                    if candidate.health.free_disk_bytes > best_free {
                        best_free = candidate.health.free_disk_bytes;
                        selected = Some(candidate);
                    }
                }
                selected.map(|d| d.destination_id.clone())
            }
        }
    }
}

/// Validate a mapping against its kind's invariants.
pub fn validate(mapping: &Mapping) -> Result<(), MappingError> {
    if mapping.sources.is_empty() {
        return Err(MappingError::NoSources);
    }
    if mapping.destinations.is_empty() {
        return Err(MappingError::NoDestinations);
    }

    match mapping.kind {
        MappingKind::OneToMany => {
            if mapping.sources.len() != 1 {
                return Err(MappingError::OneToManySourceCount);
            }
        }
        MappingKind::ManyToMany => {
            if mapping.sources.len() != mapping.destinations.len() {
                return Err(MappingError::ManyToManySizeMismatch);
            }
        }
        MappingKind::Custom => {
            if mapping.custom_rules.is_empty() {
                return Err(MappingError::EmptyCustomRules);
            }

            let source_names: HashSet<&str> =
                mapping.sources.iter().map(|s| s.username.as_str()).collect();
            let destination_ids: HashSet<&str> = mapping
                .destinations
                .iter()
                .filter(|d| !d.destination_id.is_empty())
                .map(|d| d.destination_id.as_str())
                .collect();

            for (username, destination_id) in &mapping.custom_rules {
                if !source_names.contains(username.as_str()) {
                    return Err(MappingError::UnknownSource(username.clone()));
                }
                if !destination_ids.contains(destination_id.as_str()) {
                    return Err(MappingError::UnknownDestination(destination_id.clone()));
                }
            }
        }
    }

    Ok(())
}

/// Whether every destination has the free disk its share requires.
pub fn check_disk_space(mapping: &Mapping) -> bool {
    let required = mapping.required_bytes_by_destination();
    mapping.destinations.iter().all(|destination| {
        let needed = required.get(&destination.destination_id).copied().unwrap_or(0);
        needed == 0 || destination.health.free_disk_bytes >= needed
    })
}

/// Disk space plus the full readiness check for every destination.
pub fn check_destination_readiness(mapping: &Mapping) -> bool {
    let required = mapping.required_bytes_by_destination();
    mapping.destinations.iter().all(|destination| {
        let needed = required.get(&destination.destination_id).copied().unwrap_or(0);
        check_readiness(destination, needed).is_ok()
    })
}

/// Persist a mapping as a JSON template (atomic write).
pub fn save_template(mapping: &Mapping, path: &Path) -> Result<(), TemplateError> {
    let json = serde_json::to_vec_pretty(mapping)?;
    convoy_core::fsio::write_atomic(path, &json)?;
    Ok(())
}

/// Load a mapping template, validating it on the way in.
pub fn load_template(path: &Path) -> Result<Mapping, TemplateError> {
    let data = fs::read(path)?;
    let mapping: Mapping = serde_json::from_slice(&data)?;
    validate(&mapping)?;
    Ok(mapping)
}

#[cfg(test)]
#[path = "mapping_tests.rs"]
mod tests;

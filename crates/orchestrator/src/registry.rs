// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory registry of live destinations with staleness pruning.

use convoy_core::{Clock, Destination, DestinationHealth, SystemClock};
use indexmap::IndexMap;

/// Events raised by registry mutations.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    /// First time this id was seen.
    Registered(Destination),
    /// Existing record re-registered or refreshed with health.
    Updated(Destination),
    /// Record removed (stale prune or stream close).
    Removed(String),
}

struct Entry {
    destination: Destination,
    /// Liveness is tracked in milliseconds; the record's `last_seen` field
    /// stays whole epoch seconds for the wire.
    last_seen_ms: u64,
}

/// Insertion-ordered map of destination id → record.
///
/// Insertion order doubles as the first-seen order used by placement
/// tie-breaking.
pub struct DestinationRegistry<C: Clock = SystemClock> {
    entries: IndexMap<String, Entry>,
    stale_timeout_ms: u64,
    clock: C,
}

impl<C: Clock> DestinationRegistry<C> {
    pub fn new(stale_timeout_secs: u64, clock: C) -> Self {
        Self {
            entries: IndexMap::new(),
            stale_timeout_ms: stale_timeout_secs * 1000,
            clock,
        }
    }

    /// Upsert a record, stamping `last_seen` with the current time.
    pub fn register(&mut self, destination: Destination) -> RegistryEvent {
        let now_ms = self.clock.epoch_ms();
        let mut updated = destination;
        updated.last_seen = (now_ms / 1000) as i64;

        let existed = self.entries.contains_key(&updated.destination_id);
        self.entries.insert(
            updated.destination_id.clone(),
            Entry { destination: updated.clone(), last_seen_ms: now_ms },
        );

        if existed {
            RegistryEvent::Updated(updated)
        } else {
            tracing::info!(
                destination_id = %updated.destination_id,
                hostname = %updated.hostname,
                "destination registered"
            );
            RegistryEvent::Registered(updated)
        }
    }

    /// Merge a health report. Unknown ids are a silent no-op.
    pub fn update_health(
        &mut self,
        destination_id: &str,
        health: DestinationHealth,
    ) -> Option<RegistryEvent> {
        let now_ms = self.clock.epoch_ms();
        let entry = self.entries.get_mut(destination_id)?;
        entry.destination.health = health;
        entry.destination.last_seen = (now_ms / 1000) as i64;
        entry.last_seen_ms = now_ms;
        Some(RegistryEvent::Updated(entry.destination.clone()))
    }

    /// Snapshot of all records in first-seen order.
    pub fn destinations(&self) -> Vec<Destination> {
        self.entries.values().map(|e| e.destination.clone()).collect()
    }

    pub fn get(&self, destination_id: &str) -> Option<&Destination> {
        self.entries.get(destination_id).map(|e| &e.destination)
    }

    pub fn contains(&self, destination_id: &str) -> bool {
        self.entries.contains_key(destination_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove a record out-of-band (stream close).
    pub fn remove(&mut self, destination_id: &str) -> Option<RegistryEvent> {
        self.entries
            .shift_remove(destination_id)
            .map(|_| RegistryEvent::Removed(destination_id.to_string()))
    }

    /// Drop every record whose last liveness signal is older than the stale
    /// timeout. A record exactly at the threshold is kept.
    pub fn prune_stale(&mut self) -> Vec<RegistryEvent> {
        let now_ms = self.clock.epoch_ms();
        let timeout_ms = self.stale_timeout_ms;
        let stale: Vec<String> = self
            .entries
            .values()
            .filter(|e| now_ms.saturating_sub(e.last_seen_ms) > timeout_ms)
            .map(|e| e.destination.destination_id.clone())
            .collect();

        stale
            .into_iter()
            .map(|id| {
                self.entries.shift_remove(&id);
                tracing::info!(destination_id = %id, "destination pruned (stale)");
                RegistryEvent::Removed(id)
            })
            .collect()
    }
}

/// Pure readiness check: a destination can accept an assignment iff it has
/// admin rights, a running agent, enough free disk, and CPU/RAM below 90%.
///
/// Returns the first violated predicate as a human-readable reason.
pub fn check_readiness(
    destination: &Destination,
    required_free_bytes: i64,
) -> Result<(), String> {
    let health = &destination.health;
    if !health.admin_rights {
        return Err("Admin rights required".to_string());
    }
    if !health.agent_running {
        return Err("Agent not running".to_string());
    }
    if required_free_bytes > 0 && health.free_disk_bytes < required_free_bytes {
        return Err("Insufficient disk space".to_string());
    }
    if health.cpu_usage_percent >= 90 {
        return Err("High CPU usage".to_string());
    }
    if health.ram_usage_percent >= 90 {
        return Err("High memory usage".to_string());
    }
    Ok(())
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

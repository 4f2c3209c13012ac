//! State synchronisation: the bounded logs and the payloads served to
//! clients.
//!
//! Clients poll `get_delta(since_tick, generation)`. If anything newer
//! than `since_tick` has already been evicted from the ring, the delta is
//! incomplete and the response says so with `full_state_needed`; the
//! caller then sends a full snapshot instead.
//!
//! Tick numbers restart at 0 on every reset, so a tick alone cannot tell
//! the old game from the new one. Every reset bumps the generation;
//! clients echo the generation of their last full state and any mismatch
//! forces a resync.

use crate::{
    clock::SimSpeed,
    cycle::CycleStatus,
    entity::Entity,
    error::SimResult,
    event::{now_millis, ChangeLogEntry, NarrationEntry, SimEvent},
    ring::BoundedLog,
    transit::Fleet,
    types::Tick,
    universe::Planet,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Delta {
    pub changes:           Vec<ChangeLogEntry>,
    pub current_tick:      Tick,
    pub generation:        u64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub full_state_needed: bool,
}

/// Complete authoritative snapshot. Decodes back into a live engine via
/// `SimEngine::load_state`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FullState {
    pub tick:              Tick,
    /// Reset counter of the run this state belongs to.
    #[serde(default)]
    pub generation:        u64,
    #[serde(default)]
    pub paused:            bool,
    #[serde(default)]
    pub speed:             SimSpeed,
    /// Persisted cycle state. Kept as raw JSON so a damaged cycle block
    /// degrades to defaults instead of rejecting the whole snapshot.
    #[serde(default)]
    pub cycle:             serde_json::Value,
    #[serde(default)]
    pub fleets_in_transit: Vec<Fleet>,
    #[serde(default)]
    pub entities:          Vec<Entity>,
    #[serde(default)]
    pub planets:           Vec<Planet>,
    #[serde(default)]
    pub recent_events:     Vec<NarrationEntry>,
}

/// Bandwidth-reduced snapshot: no planet surfaces, optionally fewer entities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LightState {
    pub tick:              Tick,
    pub generation:        u64,
    pub paused:            bool,
    pub speed:             SimSpeed,
    pub cycle:             CycleStatus,
    pub fleets_in_transit: Vec<Fleet>,
    pub entities:          Vec<Entity>,
    /// Entity count before truncation.
    pub entity_total:      usize,
    pub planets:           Vec<Planet>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LightStateOptions {
    #[serde(default)]
    pub entity_limit: Option<usize>,
}

pub struct StateSync {
    changes:         BoundedLog<ChangeLogEntry>,
    events:          BoundedLog<NarrationEntry>,
    /// Highest tick among evicted change entries. Deltas from before this
    /// tick cannot be reconstructed.
    evicted_through: Option<Tick>,
    generation:      u64,
}

impl StateSync {
    pub fn new(change_capacity: usize, event_capacity: usize) -> Self {
        Self {
            changes:         BoundedLog::new(change_capacity),
            events:          BoundedLog::new(event_capacity),
            evicted_through: None,
            generation:      0,
        }
    }

    /// Append a change stamped with `tick` and the wall clock. Returns a
    /// copy of the stored entry for persistence.
    pub fn record_change(&mut self, change_type: &str, data: serde_json::Value, tick: Tick) -> ChangeLogEntry {
        let entry = ChangeLogEntry {
            change_type: change_type.to_string(),
            data,
            tick,
            timestamp: now_millis(),
        };
        if let Some(evicted) = self.changes.push(entry.clone()) {
            self.mark_history_lost(evicted.tick);
        }
        entry
    }

    /// Record an engine event in the change log, and narrate it if it is
    /// player-facing.
    pub fn record_event(&mut self, event: &SimEvent, tick: Tick) -> SimResult<ChangeLogEntry> {
        let data = serde_json::to_value(event)?;
        let entry = self.record_change(event.type_name(), data, tick);
        if let Some(message) = event.narration() {
            self.log(event.type_name(), &message, tick);
        }
        Ok(entry)
    }

    /// Declare that changes up to and including `through` are no longer
    /// available, e.g. after loading a snapshot.
    pub fn mark_history_lost(&mut self, through: Tick) {
        self.evicted_through = Some(self.evicted_through.map_or(through, |t| t.max(through)));
    }

    /// Append a human-readable line to the narration log.
    pub fn log(&mut self, kind: &str, message: &str, tick: Tick) {
        self.events.push(NarrationEntry {
            kind: kind.to_string(),
            message: message.to_string(),
            tick,
            timestamp: now_millis(),
        });
    }

    /// Every change with `tick > since_tick`.
    ///
    /// `full_state_needed` is set when history newer than `since_tick` was
    /// evicted, when the client synced against another generation, or
    /// when it claims a tick from the future.
    pub fn get_delta(&self, since_tick: Tick, current_tick: Tick, generation: u64) -> Delta {
        let history_lost = self.evicted_through.is_some_and(|t| t > since_tick);
        let other_game = generation != self.generation;
        let client_ahead = since_tick > current_tick;
        let changes = self
            .changes
            .iter()
            .filter(|c| c.tick > since_tick)
            .cloned()
            .collect();
        Delta {
            changes,
            current_tick,
            generation: self.generation,
            full_state_needed: history_lost || other_game || client_ahead,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Adopt the generation of a loaded state.
    pub fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    pub fn changes(&self) -> impl Iterator<Item = &ChangeLogEntry> {
        self.changes.iter()
    }

    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    /// Most recent `n` narration entries, oldest first.
    pub fn recent_events(&self, n: usize) -> Vec<NarrationEntry> {
        let skip = self.events.len().saturating_sub(n);
        self.events.iter().skip(skip).cloned().collect()
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Drop both logs and all eviction history. The generation is kept.
    pub fn clear(&mut self) {
        self.changes.clear();
        self.events.clear();
        self.evicted_through = None;
    }
}

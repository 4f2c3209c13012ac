//! Snapshot serialization: full simulation state to/from JSON.
//!
//! A snapshot is written every `snapshot_interval` ticks and on demand.
//! It captures everything needed to resume the run from that tick; the
//! change log is not part of it (clients holding an older tick get
//! `full_state_needed` on their next delta).
//!
//! Decoding never fails. Each section is read on its own and a bad
//! record is dropped with a warning, so one damaged fleet or entity
//! does not cost the rest of the run.

use crate::{
    sync::FullState,
    types::{RunId, Tick},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimSnapshot {
    pub run_id: RunId,
    pub tick:   Tick,
    pub state:  FullState,
}

impl SimSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Best-effort decode of a stored snapshot's state. Unreadable JSON
    /// yields an empty state at tick 0.
    pub fn decode_state(json: &str) -> FullState {
        let root: Value = match serde_json::from_str(json) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("snapshot is not valid JSON, starting empty: {e}");
                return FullState::default();
            }
        };
        let Some(state) = root.get("state").filter(|s| s.is_object()) else {
            log::warn!("snapshot has no state object, starting empty");
            return FullState::default();
        };

        FullState {
            tick:              field(state, "tick").unwrap_or(0),
            generation:        field(state, "generation").unwrap_or(0),
            paused:            field(state, "paused").unwrap_or(false),
            speed:             field(state, "speed").unwrap_or_default(),
            cycle:             state.get("cycle").cloned().unwrap_or(Value::Null),
            fleets_in_transit: records(state, "fleets_in_transit"),
            entities:          records(state, "entities"),
            planets:           records(state, "planets"),
            recent_events:     records(state, "recent_events"),
        }
    }
}

fn field<T: DeserializeOwned>(state: &Value, key: &str) -> Option<T> {
    let raw = state.get(key)?;
    match T::deserialize(raw) {
        Ok(v) => Some(v),
        Err(e) => {
            log::warn!("snapshot field '{key}' unreadable, using default: {e}");
            None
        }
    }
}

fn records<T: DeserializeOwned>(state: &Value, key: &str) -> Vec<T> {
    let Some(raw) = state.get(key) else {
        return Vec::new();
    };
    let Some(items) = raw.as_array() else {
        log::warn!("snapshot section '{key}' is not a list, skipping it");
        return Vec::new();
    };
    items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| match T::deserialize(item) {
            Ok(v) => Some(v),
            Err(e) => {
                log::warn!("dropping {key}[{i}] from snapshot: {e}");
                None
            }
        })
        .collect()
}

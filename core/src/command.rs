use crate::{
    clock::SimSpeed,
    error::SimError,
    types::{EmpireId, EntityId, FleetId, LocationId, Tick},
};
use serde::{Deserialize, Serialize};

/// All player-issued commands.
/// Variants are append-only; never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum PlayerCommand {
    // ── Clock control ─────────────────────────────
    Pause,
    Resume,
    SetSpeed { speed: SimSpeed },

    // ── Fleets ────────────────────────────────────
    LaunchFleet {
        empire:      EmpireId,
        origin:      LocationId,
        destination: LocationId,
        ship_ids:    Vec<EntityId>,
        #[serde(default)]
        escort_ids:  Vec<EntityId>,
    },

    // ── Combat ────────────────────────────────────
    SetTarget {
        empire: EmpireId,
        entity: EntityId,
        target: EntityId,
    },
    ClearTarget {
        empire: EmpireId,
        entity: EntityId,
    },
    Invade {
        empire:       EmpireId,
        planet:       LocationId,
        attacker_ids: Vec<EntityId>,
    },

    // ── Admin ─────────────────────────────────────
    ForceCycle {
        cycle:    String,
        #[serde(default)]
        duration: Option<Tick>,
    },
}

/// Structured reply to a command. Rejections carry a message instead of
/// an error so the session layer can forward them verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActionResult {
    pub success:  bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error:    Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fleet_id: Option<FleetId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conquered: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub battle_log: Vec<String>,
}

impl ActionResult {
    pub fn ok() -> Self {
        Self { success: true, ..Self::default() }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self { success: false, error: Some(error.into()), ..Self::default() }
    }
}

impl From<SimError> for ActionResult {
    fn from(e: SimError) -> Self {
        Self::rejected(e.to_string())
    }
}

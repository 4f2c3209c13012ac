//! Everything the engine records about a tick.
//!
//! RULE: Components communicate results to the engine ONLY through events.
//! The engine stamps each one into the change log; nothing else writes it.

use crate::{
    combat::DamageRecord,
    cycle::{Cycle, CycleEffects},
    types::{EmpireId, EntityId, FleetId, LocationId, Tick},
};
use serde::{Deserialize, Serialize};

/// Every state mutation the engine can record.
/// Variants are append-only; clients match on the `type` tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    // ── Engine ─────────────────────────────────────
    GameReset {
        tick: Tick,
    },
    EnginePaused {
        tick: Tick,
    },
    EngineResumed {
        tick: Tick,
    },

    // ── Cycle ──────────────────────────────────────
    CycleWarning {
        tick: Tick,
        current: Cycle,
        upcoming: Cycle,
        remaining: Tick,
    },
    CycleStarted {
        tick: Tick,
        cycle: Cycle,
        previous: Cycle,
        duration: Tick,
        effects: CycleEffects,
    },

    // ── Transit ────────────────────────────────────
    FleetLaunched {
        tick: Tick,
        fleet_id: FleetId,
        owner: EmpireId,
        origin: LocationId,
        destination: LocationId,
        ship_count: usize,
        travel_time: Tick,
    },
    FleetArrived {
        tick: Tick,
        fleet_id: FleetId,
        owner: EmpireId,
        destination: LocationId,
        ship_ids: Vec<EntityId>,
    },
    StormDamage {
        tick: Tick,
        ships_damaged: usize,
        total_damage: f64,
    },

    // ── Combat ─────────────────────────────────────
    SkirmishResolved {
        tick: Tick,
        location: LocationId,
        sides: Vec<EmpireId>,
        damages: Vec<DamageRecord>,
        destroyed: Vec<EntityId>,
    },
    AttackResolved {
        tick: Tick,
        attacker: EntityId,
        target: EntityId,
        damage: f64,
        destroyed: bool,
    },
    InvasionResolved {
        tick: Tick,
        planet: LocationId,
        attacker: EmpireId,
        conquered: bool,
        attacker_losses: usize,
        defender_losses: usize,
        rounds: u32,
    },
    PlanetConquered {
        tick: Tick,
        planet: LocationId,
        new_owner: EmpireId,
        previous_owner: Option<EmpireId>,
    },

    // ── Player orders ──────────────────────────────
    TargetAssigned {
        tick: Tick,
        entity: EntityId,
        target: Option<EntityId>,
    },

    // ── Collaborator hooks ─────────────────────────
    /// Opaque event from a registered per-tick hook (resource accrual,
    /// research progress, ...).
    HookEvent {
        tick: Tick,
        source: String,
        kind: String,
        data: serde_json::Value,
    },
}

impl SimEvent {
    /// Stable name for the change log's `type` column. Matches the serde tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::GameReset { .. }        => "game_reset",
            Self::EnginePaused { .. }     => "engine_paused",
            Self::EngineResumed { .. }    => "engine_resumed",
            Self::CycleWarning { .. }     => "cycle_warning",
            Self::CycleStarted { .. }     => "cycle_started",
            Self::FleetLaunched { .. }    => "fleet_launched",
            Self::FleetArrived { .. }     => "fleet_arrived",
            Self::StormDamage { .. }      => "storm_damage",
            Self::SkirmishResolved { .. } => "skirmish_resolved",
            Self::AttackResolved { .. }   => "attack_resolved",
            Self::InvasionResolved { .. } => "invasion_resolved",
            Self::PlanetConquered { .. }  => "planet_conquered",
            Self::TargetAssigned { .. }   => "target_assigned",
            Self::HookEvent { .. }        => "hook_event",
        }
    }

    /// Human-readable line for the narration log, if the event is worth
    /// telling players about.
    pub fn narration(&self) -> Option<String> {
        match self {
            Self::GameReset { .. } => Some("The galaxy has been reset.".into()),
            Self::CycleWarning { upcoming, remaining, .. } => Some(format!(
                "Astronomers predict {} in {remaining} ticks.",
                upcoming.display_name()
            )),
            Self::CycleStarted { cycle, duration, .. } => Some(format!(
                "{} begins and will last {duration} ticks.",
                cycle.display_name()
            )),
            Self::FleetLaunched { owner, origin, destination, ship_count, travel_time, .. } => {
                Some(format!(
                    "{owner} launched {ship_count} ships from {origin} to {destination} (ETA {travel_time} ticks)."
                ))
            }
            Self::FleetArrived { owner, destination, ship_ids, .. } => Some(format!(
                "{owner}'s fleet of {} arrived at {destination}.",
                ship_ids.len()
            )),
            Self::SkirmishResolved { location, destroyed, .. } => Some(format!(
                "Battle at {location}: {} units destroyed.",
                destroyed.len()
            )),
            Self::AttackResolved { attacker, target, destroyed: true, .. } => {
                Some(format!("{attacker} destroyed {target}."))
            }
            Self::InvasionResolved { planet, attacker, conquered, .. } => Some(if *conquered {
                format!("{attacker} invaded {planet} successfully.")
            } else {
                format!("{attacker}'s invasion of {planet} was repelled.")
            }),
            Self::PlanetConquered { planet, new_owner, .. } => {
                Some(format!("{planet} is now held by {new_owner}."))
            }
            _ => None,
        }
    }
}

/// One entry of the machine-oriented change log sent to clients as deltas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeLogEntry {
    #[serde(rename = "type")]
    pub change_type: String,
    pub data:        serde_json::Value,
    pub tick:        Tick,
    /// Unix milliseconds.
    pub timestamp:   i64,
}

/// One entry of the human-readable narration log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NarrationEntry {
    #[serde(rename = "type")]
    pub kind:      String,
    pub message:   String,
    pub tick:      Tick,
    pub timestamp: i64,
}

/// Wall-clock stamp for log entries. Never feeds back into simulation.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

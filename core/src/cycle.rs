//! Galactic cycle manager: the galaxy-wide modifier state machine.
//!
//! Exactly one cycle is active at a time; the next one is pre-rolled so
//! the warning can name it. Transitions follow a fixed weight table that
//! pulls every extreme state back towards equilibrium.
//!
//! Lookup of unknown cycles or effects never fails: it falls back to
//! equilibrium semantics (no effects, caller-supplied default).

use crate::{
    config::SimConfig,
    event::SimEvent,
    ring::BoundedLog,
    rng::RandomSource,
    types::Tick,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Cycle {
    Equilibrium,
    VoidStorm,
    GoldenAge,
    DarkEra,
    WarpResonance,
}

impl Cycle {
    /// Row/column order of the transition table.
    pub const ALL: [Cycle; 5] = [
        Self::Equilibrium,
        Self::VoidStorm,
        Self::GoldenAge,
        Self::DarkEra,
        Self::WarpResonance,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Self::Equilibrium   => "equilibrium",
            Self::VoidStorm     => "void_storm",
            Self::GoldenAge     => "golden_age",
            Self::DarkEra       => "dark_era",
            Self::WarpResonance => "warp_resonance",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.id() == id)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Equilibrium   => "Equilibrium",
            Self::VoidStorm     => "Void Storm",
            Self::GoldenAge     => "Golden Age",
            Self::DarkEra       => "Dark Era",
            Self::WarpResonance => "Warp Resonance",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }

    pub fn definition(&self) -> CycleDefinition {
        let none = CycleEffects::default();
        match self {
            Self::Equilibrium => CycleDefinition {
                min_duration: 300,
                max_duration: 600,
                effects: none,
                description: "The galaxy is calm.",
            },
            Self::VoidStorm => CycleDefinition {
                min_duration: 100,
                max_duration: 200,
                effects: CycleEffects {
                    travel_time_modifier: Some(1.5),
                    fleet_damage_per_tick: Some(2.0),
                    ..none
                },
                description: "Void storms slow travel and wear down fleets in transit.",
            },
            Self::GoldenAge => CycleDefinition {
                min_duration: 150,
                max_duration: 300,
                effects: CycleEffects {
                    production_modifier: Some(1.5),
                    research_modifier: Some(1.25),
                    ..none
                },
                description: "Prosperity boosts production and research.",
            },
            Self::DarkEra => CycleDefinition {
                min_duration: 150,
                max_duration: 250,
                effects: CycleEffects {
                    production_modifier: Some(0.75),
                    combat_modifier: Some(1.25),
                    stealth_bonus: Some(0.2),
                    ..none
                },
                description: "Scarcity breeds conflict; fleets hide in the dark.",
            },
            Self::WarpResonance => CycleDefinition {
                min_duration: 100,
                max_duration: 200,
                effects: CycleEffects {
                    travel_time_modifier: Some(0.5),
                    ..none
                },
                description: "Warp lanes resonate; travel times halve.",
            },
        }
    }
}

/// Transition weights, rows = from, columns = to, in `Cycle::ALL` order.
/// Every row favours returning to equilibrium; no cycle repeats itself.
const TRANSITION_WEIGHTS: [[f64; 5]; 5] = [
    // eq    void  gold  dark  warp
    [0.00, 0.30, 0.25, 0.20, 0.25], // equilibrium
    [0.60, 0.00, 0.10, 0.20, 0.10], // void_storm
    [0.60, 0.10, 0.00, 0.20, 0.10], // golden_age
    [0.60, 0.15, 0.10, 0.00, 0.15], // dark_era
    [0.60, 0.15, 0.10, 0.15, 0.00], // warp_resonance
];

/// The fixed set of named modifiers a cycle may carry. Absent means
/// "no effect"; callers supply their own default.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CycleEffects {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub travel_time_modifier:  Option<f64>,
    /// Percent of current hp lost per tick by ships in transit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fleet_damage_per_tick: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production_modifier:   Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub research_modifier:     Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combat_modifier:       Option<f64>,
    /// Additive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stealth_bonus:         Option<f64>,
}

impl CycleEffects {
    pub fn get(&self, effect: Effect) -> Option<f64> {
        match effect {
            Effect::TravelTimeModifier => self.travel_time_modifier,
            Effect::FleetDamagePerTick => self.fleet_damage_per_tick,
            Effect::ProductionModifier => self.production_modifier,
            Effect::ResearchModifier   => self.research_modifier,
            Effect::CombatModifier     => self.combat_modifier,
            Effect::StealthBonus       => self.stealth_bonus,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    TravelTimeModifier,
    FleetDamagePerTick,
    ProductionModifier,
    ResearchModifier,
    CombatModifier,
    StealthBonus,
}

impl Effect {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "travelTimeModifier" => Some(Self::TravelTimeModifier),
            "fleetDamagePerTick" => Some(Self::FleetDamagePerTick),
            "productionModifier" => Some(Self::ProductionModifier),
            "researchModifier"   => Some(Self::ResearchModifier),
            "combatModifier"     => Some(Self::CombatModifier),
            "stealthBonus"       => Some(Self::StealthBonus),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleDefinition {
    pub min_duration: Tick,
    pub max_duration: Tick,
    pub effects:      CycleEffects,
    pub description:  &'static str,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CycleRecord {
    pub cycle:    Cycle,
    pub end_tick: Tick,
    pub duration: Tick,
}

/// Point-in-time view of the active cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleStatus {
    pub cycle:          Cycle,
    pub next_cycle:     Cycle,
    pub start_tick:     Tick,
    pub duration:       Tick,
    pub elapsed:        Tick,
    /// Never negative; zero once the cycle is due to end.
    pub remaining:      Tick,
    /// elapsed / duration, capped at 1.0.
    pub progress:       f64,
    pub warning_issued: bool,
    pub effects:        CycleEffects,
}

/// Persisted form. Cycles are stored by id so unknown ids from newer or
/// corrupted saves degrade to defaults instead of failing the load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleSnapshot {
    pub current_cycle:    String,
    pub next_cycle:       String,
    pub cycle_start_tick: Tick,
    pub cycle_duration:   Tick,
    pub warning_issued:   bool,
    pub history:          Vec<CycleRecord>,
}

#[derive(Debug, Clone)]
pub struct CycleManager {
    current:           Cycle,
    next:              Cycle,
    cycle_start_tick:  Tick,
    duration:          Tick,
    warning_issued:    bool,
    history:           BoundedLog<CycleRecord>,
    warning_lead_time: Tick,
}

impl CycleManager {
    /// A manager in equilibrium starting at `tick`.
    pub fn new(config: &SimConfig, tick: Tick, rng: &mut dyn RandomSource) -> Self {
        let mut manager = Self {
            current:           Cycle::Equilibrium,
            next:              Cycle::Equilibrium,
            cycle_start_tick:  tick,
            duration:          0,
            warning_issued:    false,
            history:           BoundedLog::new(config.cycle_history_capacity),
            warning_lead_time: config.cycle_warning_lead_time,
        };
        manager.initialize(tick, rng);
        manager
    }

    /// Reset to equilibrium at `tick` with fresh rolls. History is kept.
    pub fn initialize(&mut self, tick: Tick, rng: &mut dyn RandomSource) {
        self.current = Cycle::Equilibrium;
        self.cycle_start_tick = tick;
        self.duration = roll_duration(Cycle::Equilibrium, rng);
        self.next = roll_next(Cycle::Equilibrium, rng);
        self.warning_issued = false;
    }

    /// Advance to `current_tick`. Emits at most one event.
    pub fn tick(&mut self, current_tick: Tick, rng: &mut dyn RandomSource) -> Vec<SimEvent> {
        let elapsed = current_tick as i64 - self.cycle_start_tick as i64;
        let remaining = self.duration as i64 - elapsed;

        if remaining <= 0 {
            return vec![self.transition(current_tick, rng)];
        }

        if (remaining as Tick) <= self.warning_lead_time && !self.warning_issued {
            self.warning_issued = true;
            log::debug!(
                "tick={current_tick} cycle warning: {} in {remaining} ticks",
                self.next.id()
            );
            return vec![SimEvent::CycleWarning {
                tick:      current_tick,
                current:   self.current,
                upcoming:  self.next,
                remaining: remaining as Tick,
            }];
        }

        vec![]
    }

    fn transition(&mut self, tick: Tick, rng: &mut dyn RandomSource) -> SimEvent {
        let previous = self.current;
        self.history.push(CycleRecord {
            cycle:    previous,
            end_tick: tick,
            duration: self.duration,
        });

        self.current = self.next;
        self.cycle_start_tick = tick;
        self.duration = roll_duration(self.current, rng);
        self.next = roll_next(self.current, rng);
        self.warning_issued = false;

        log::info!(
            "tick={tick} cycle transition: {} -> {} ({} ticks)",
            previous.id(),
            self.current.id(),
            self.duration
        );

        SimEvent::CycleStarted {
            tick,
            cycle: self.current,
            previous,
            duration: self.duration,
            effects: self.effects(),
        }
    }

    /// Start `cycle` immediately. The previous cycle goes to history.
    pub fn force_cycle(
        &mut self,
        cycle: Cycle,
        tick: Tick,
        duration: Option<Tick>,
        rng: &mut dyn RandomSource,
    ) -> SimEvent {
        self.next = cycle;
        let event = self.transition(tick, rng);
        if let Some(d) = duration {
            self.duration = d;
        }
        match event {
            SimEvent::CycleStarted { tick, cycle, previous, effects, .. } => SimEvent::CycleStarted {
                tick,
                cycle,
                previous,
                duration: self.duration,
                effects,
            },
            other => other,
        }
    }

    pub fn current(&self) -> Cycle {
        self.current
    }

    pub fn next(&self) -> Cycle {
        self.next
    }

    pub fn effects(&self) -> CycleEffects {
        self.current.definition().effects
    }

    /// The named effect of the current cycle, or `default`.
    pub fn get_effect_modifier(&self, effect: Effect, default: f64) -> f64 {
        self.effects().get(effect).unwrap_or(default)
    }

    /// String-keyed lookup for wire-level callers. Unknown names yield `default`.
    pub fn effect_by_name(&self, name: &str, default: f64) -> f64 {
        Effect::from_name(name)
            .map(|e| self.get_effect_modifier(e, default))
            .unwrap_or(default)
    }

    /// Apply the travel-time modifier: floored, never below one tick.
    pub fn modify_travel_time(&self, base: Tick) -> Tick {
        modify_travel_time(&self.effects(), base)
    }

    pub fn get_state(&self, tick: Tick) -> CycleStatus {
        let elapsed = tick.saturating_sub(self.cycle_start_tick);
        let remaining = self.duration.saturating_sub(elapsed);
        let progress = if self.duration == 0 {
            1.0
        } else {
            (elapsed as f64 / self.duration as f64).min(1.0)
        };
        CycleStatus {
            cycle: self.current,
            next_cycle: self.next,
            start_tick: self.cycle_start_tick,
            duration: self.duration,
            elapsed,
            remaining,
            progress,
            warning_issued: self.warning_issued,
            effects: self.effects(),
        }
    }

    /// Most recent transitions, oldest first.
    pub fn history(&self) -> Vec<CycleRecord> {
        self.history.iter().copied().collect()
    }

    pub fn snapshot(&self) -> CycleSnapshot {
        CycleSnapshot {
            current_cycle:    self.current.id().to_string(),
            next_cycle:       self.next.id().to_string(),
            cycle_start_tick: self.cycle_start_tick,
            cycle_duration:   self.duration,
            warning_issued:   self.warning_issued,
            history:          self.history(),
        }
    }

    /// Rebuild from persisted JSON. `null`, missing, or malformed fields
    /// each fall back to what `new(config, 0, rng)` would have produced.
    pub fn restore(config: &SimConfig, value: &Value, rng: &mut dyn RandomSource) -> Self {
        let mut manager = Self::new(config, 0, rng);
        if !value.is_object() {
            if !value.is_null() {
                log::warn!("cycle snapshot is not an object; starting from equilibrium");
            }
            return manager;
        }

        let cycle_field = |key: &str| {
            value.get(key).and_then(Value::as_str).and_then(Cycle::from_id)
        };
        if let Some(c) = cycle_field("current_cycle") {
            manager.current = c;
        }
        if let Some(c) = cycle_field("next_cycle") {
            manager.next = c;
        }
        if let Some(t) = value.get("cycle_start_tick").and_then(Value::as_u64) {
            manager.cycle_start_tick = t;
        }
        if let Some(d) = value.get("cycle_duration").and_then(Value::as_u64) {
            manager.duration = d;
        }
        if let Some(w) = value.get("warning_issued").and_then(Value::as_bool) {
            manager.warning_issued = w;
        }
        if let Some(records) = value.get("history").and_then(Value::as_array) {
            records
                .iter()
                .filter_map(|r| serde_json::from_value::<CycleRecord>(r.clone()).ok())
                .for_each(|r| {
                    manager.history.push(r);
                });
        }
        manager
    }
}

/// Floor(base × travelTimeModifier), minimum 1 tick.
pub fn modify_travel_time(effects: &CycleEffects, base: Tick) -> Tick {
    let modifier = effects.travel_time_modifier.unwrap_or(1.0);
    ((base as f64 * modifier).floor() as Tick).max(1)
}

fn roll_duration(cycle: Cycle, rng: &mut dyn RandomSource) -> Tick {
    let def = cycle.definition();
    rng.range_u64(def.min_duration, def.max_duration)
}

fn roll_next(from: Cycle, rng: &mut dyn RandomSource) -> Cycle {
    let row = &TRANSITION_WEIGHTS[from.index()];
    Cycle::ALL[rng.weighted_index(row)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{SequenceRng, SubsystemRng};

    fn manager(rng: &mut dyn RandomSource) -> CycleManager {
        CycleManager::new(&SimConfig::default(), 0, rng)
    }

    #[test]
    fn rolled_durations_stay_in_range() {
        let mut rng = SubsystemRng::new(1234, 0);
        let mut m = manager(&mut rng);
        let mut tick = 0;
        for _ in 0..200 {
            let def = m.current().definition();
            let state = m.get_state(tick);
            assert!(state.duration >= def.min_duration && state.duration <= def.max_duration);
            tick += state.duration;
            let events = m.tick(tick, &mut rng);
            assert!(matches!(events.as_slice(), [SimEvent::CycleStarted { .. }]));
        }
    }

    #[test]
    fn golden_age_production_and_equilibrium_defaults() {
        let mut rng = SequenceRng::constant(0.5);
        let mut m = manager(&mut rng);
        assert_eq!(m.effect_by_name("anything", 1.0), 1.0);
        assert_eq!(m.get_effect_modifier(Effect::ProductionModifier, 1.0), 1.0);

        m.force_cycle(Cycle::GoldenAge, 10, None, &mut rng);
        assert_eq!(m.effect_by_name("productionModifier", 1.0), 1.5);
        assert_eq!(m.get_effect_modifier(Effect::ProductionModifier, 1.0), 1.5);
        assert_eq!(m.get_effect_modifier(Effect::TravelTimeModifier, 1.0), 1.0);
    }

    #[test]
    fn state_progress_and_clamped_remaining() {
        let mut rng = SequenceRng::constant(0.5);
        let mut m = manager(&mut rng);
        m.force_cycle(Cycle::Equilibrium, 0, Some(1000), &mut rng);

        let s = m.get_state(300);
        assert_eq!(s.elapsed, 300);
        assert_eq!(s.remaining, 700);
        assert!((s.progress - 0.3).abs() < 1e-9);

        let late = m.get_state(1500);
        assert_eq!(late.remaining, 0);
        assert_eq!(late.progress, 1.0);
    }

    #[test]
    fn warning_fires_once_then_transition() {
        let mut rng = SequenceRng::constant(0.0);
        let mut m = manager(&mut rng);
        m.force_cycle(Cycle::Equilibrium, 0, Some(100), &mut rng);
        let upcoming = m.next();

        assert!(m.tick(49, &mut rng).is_empty());
        let warn = m.tick(50, &mut rng);
        assert_eq!(
            warn,
            vec![SimEvent::CycleWarning {
                tick: 50,
                current: Cycle::Equilibrium,
                upcoming,
                remaining: 50,
            }]
        );
        for t in 51..100 {
            assert!(m.tick(t, &mut rng).is_empty(), "duplicate warning at {t}");
        }
        let started = m.tick(100, &mut rng);
        assert!(matches!(
            started.as_slice(),
            [SimEvent::CycleStarted { cycle, previous: Cycle::Equilibrium, .. }] if *cycle == upcoming
        ));
        assert!(!m.get_state(100).warning_issued);
    }

    #[test]
    fn history_is_capped() {
        let mut rng = SubsystemRng::new(5, 0);
        let mut m = manager(&mut rng);
        for t in 1..=30 {
            m.force_cycle(Cycle::ALL[t as usize % 5], t, Some(10), &mut rng);
        }
        let history = m.history();
        assert_eq!(history.len(), 20);
        assert_eq!(history.last().map(|r| r.end_tick), Some(30));
    }

    #[test]
    fn travel_time_floor_and_minimum() {
        let storm = Cycle::VoidStorm.definition().effects;
        let warp = Cycle::WarpResonance.definition().effects;
        assert_eq!(modify_travel_time(&storm, 5), 7);
        assert_eq!(modify_travel_time(&warp, 1), 1);
        assert_eq!(modify_travel_time(&CycleEffects::default(), 0), 1);
    }

    #[test]
    fn equilibrium_never_rolls_itself() {
        let mut rng = SubsystemRng::new(77, 0);
        for _ in 0..500 {
            assert_ne!(roll_next(Cycle::Equilibrium, &mut rng), Cycle::Equilibrium);
        }
    }

    #[test]
    fn snapshot_round_trip() {
        let mut rng = SubsystemRng::new(9, 0);
        let mut m = manager(&mut rng);
        m.force_cycle(Cycle::DarkEra, 40, Some(120), &mut rng);
        m.tick(100, &mut rng);

        let json = serde_json::to_value(m.snapshot()).unwrap();
        let restored = CycleManager::restore(&SimConfig::default(), &json, &mut rng);
        assert_eq!(restored.snapshot(), m.snapshot());
    }

    #[test]
    fn restore_tolerates_null_and_garbage() {
        let mut rng = SequenceRng::constant(0.5);
        let from_null = CycleManager::restore(&SimConfig::default(), &Value::Null, &mut rng);
        assert_eq!(from_null.current(), Cycle::Equilibrium);
        assert_eq!(from_null.get_state(0).start_tick, 0);

        let garbage = serde_json::json!({
            "current_cycle": "solar_flare",
            "next_cycle": null,
            "cycle_start_tick": "soon",
            "cycle_duration": 250,
            "history": [{ "cycle": "nope" }]
        });
        let m = CycleManager::restore(&SimConfig::default(), &garbage, &mut rng);
        assert_eq!(m.current(), Cycle::Equilibrium);
        assert_eq!(m.get_state(0).duration, 250);
        assert_eq!(m.get_state(0).start_tick, 0);
        assert!(m.history().is_empty());
    }
}

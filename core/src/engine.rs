//! The simulation engine: the authoritative tick loop.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Cycle manager       (may warn or transition)
//!   2. Fleet transit       (storm attrition, arrivals)
//!   3. Combat              (skirmishes, targeted attacks)
//!   4. Registered hooks    (resource accrual, research, ... in order)
//!
//! RULES:
//!   - Every mutation goes through `&mut SimEngine`: ticks, player
//!     commands and resets are serialised by the borrow checker.
//!   - A paused engine's tick() changes nothing and records nothing.
//!   - Components get an explicit TickContext; none reach into the engine.
//!   - All randomness flows through the RngBank.
//!   - Every event lands in the change log, then in the database.
//!   - reset() clears tick, fleets, entities, planets, cycle and both
//!     logs together, in memory and on disk, or not at all.

use crate::{
    clock::{SimClock, SimSpeed},
    combat::{CombatResolver, InvasionOutcome},
    command::{ActionResult, PlayerCommand},
    config::SimConfig,
    cycle::{Cycle, CycleManager},
    entity::{EntityRegistry, EntityStore},
    error::{SimError, SimResult},
    event::{ChangeLogEntry, SimEvent},
    rng::{RngBank, SubsystemSlot},
    snapshot::SimSnapshot,
    store::SimStore,
    subsystem::{SimSubsystem, TickContext},
    sync::{Delta, FullState, LightState, LightStateOptions, StateSync},
    transit::{Fleet, FleetOrder, FleetTransit},
    types::{EntityId, FleetId, RunId, Tick},
    universe::{Galaxy, Universe},
};

/// Narration entries carried in a full state.
const RECENT_EVENTS_IN_STATE: usize = 50;

pub struct SimEngine {
    pub run_id: RunId,
    pub clock:  SimClock,
    rng_bank:   RngBank,
    config:     SimConfig,
    cycle:      CycleManager,
    transit:    FleetTransit,
    combat:     CombatResolver,
    hooks:      Vec<Box<dyn SimSubsystem>>,
    entities:   EntityRegistry,
    galaxy:     Galaxy,
    sync:       StateSync,
    store:      SimStore,
}

impl SimEngine {
    /// An empty galaxy at tick 0. The run row must already exist in `store`.
    pub fn new(run_id: RunId, seed: u64, config: SimConfig, store: SimStore) -> Self {
        let mut rng_bank = RngBank::new(seed);
        let cycle = CycleManager::new(&config, 0, rng_bank.for_subsystem(SubsystemSlot::Cycle));
        Self {
            run_id,
            clock: SimClock::new(),
            rng_bank,
            transit: FleetTransit::new(config.fleet_speed),
            combat: CombatResolver::new(&config),
            sync: StateSync::new(config.change_log_capacity, config.event_log_capacity),
            hooks: Vec::new(),
            entities: EntityRegistry::new(),
            galaxy: Galaxy::new(),
            cycle,
            config,
            store,
        }
    }

    /// Seed the world. Intended for setup before the first tick.
    pub fn with_world(mut self, galaxy: Galaxy, entities: EntityRegistry) -> Self {
        self.galaxy = galaxy;
        self.entities = entities;
        self
    }

    /// Rebuild a run from its latest persisted snapshot. A run with no
    /// snapshot yet starts empty at tick 0.
    pub fn restore(run_id: RunId, config: SimConfig, store: SimStore) -> SimResult<Self> {
        let seed = store.run_seed(&run_id)?;
        let latest = store.latest_snapshot(&run_id)?;
        let mut engine = Self::new(run_id, seed, config, store);
        if let Some((tick, json)) = latest {
            engine.load_state(SimSnapshot::decode_state(&json));
            log::info!("run {} restored from snapshot at tick {tick}", engine.run_id);
        }
        Ok(engine)
    }

    /// Register a per-tick collaborator hook. Hooks run after combat,
    /// in registration order.
    pub fn register_hook(&mut self, hook: Box<dyn SimSubsystem>) {
        self.hooks.push(hook);
    }

    // ── Tick loop ──────────────────────────────────────────────

    /// Advance one tick. A no-op returning no events while paused.
    pub fn tick(&mut self) -> SimResult<Vec<SimEvent>> {
        if self.clock.paused {
            return Ok(vec![]);
        }

        let tick = self.clock.advance();
        let mut tick_events = self
            .cycle
            .tick(tick, self.rng_bank.for_subsystem(SubsystemSlot::Cycle));

        {
            let mut ctx = TickContext::new(
                tick,
                self.cycle.effects(),
                &mut self.entities,
                &mut self.galaxy,
            );

            let arrivals = self.transit.update(
                &mut ctx,
                &tick_events,
                self.rng_bank.for_subsystem(SubsystemSlot::Transit),
            )?;
            tick_events.extend(arrivals);

            let combat = self.combat.update(
                &mut ctx,
                &tick_events,
                self.rng_bank.for_subsystem(SubsystemSlot::Combat),
            )?;
            tick_events.extend(combat);

            for hook in &mut self.hooks {
                let new_events = hook.update(
                    &mut ctx,
                    &tick_events,
                    self.rng_bank.for_subsystem(SubsystemSlot::Hooks),
                )?;
                tick_events.extend(new_events);
            }
        }

        for event in &tick_events {
            self.record(event)?;
        }

        if self.config.snapshot_interval > 0 && tick % self.config.snapshot_interval == 0 {
            self.save()?;
        }

        log::debug!("tick={tick} complete: {} events", tick_events.len());
        Ok(tick_events)
    }

    /// Run n ticks. Stops early (without error) if the engine is paused.
    pub fn run_ticks(&mut self, n: u64) -> SimResult<()> {
        for _ in 0..n {
            if self.clock.paused {
                break;
            }
            self.tick()?;
        }
        Ok(())
    }

    pub fn pause(&mut self) -> SimResult<()> {
        if !self.clock.paused {
            self.clock.pause();
            self.record(&SimEvent::EnginePaused { tick: self.clock.current_tick })?;
        }
        Ok(())
    }

    pub fn resume(&mut self) -> SimResult<()> {
        if self.clock.paused {
            self.clock.resume();
            self.record(&SimEvent::EngineResumed { tick: self.clock.current_tick })?;
        }
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.clock.paused
    }

    pub fn tick_count(&self) -> Tick {
        self.clock.current_tick
    }

    // ── Logs ───────────────────────────────────────────────────

    /// Append an arbitrary change, stamped with the current tick.
    pub fn record_change(&mut self, change_type: &str, data: serde_json::Value) -> SimResult<()> {
        let entry = self.sync.record_change(change_type, data, self.clock.current_tick);
        self.persist_change(&entry)
    }

    /// Append a line to the narration log.
    pub fn log(&mut self, kind: &str, message: &str) {
        self.sync.log(kind, message, self.clock.current_tick);
    }

    fn record(&mut self, event: &SimEvent) -> SimResult<()> {
        let entry = self.sync.record_event(event, self.clock.current_tick)?;
        self.persist_change(&entry)
    }

    fn persist_change(&self, entry: &ChangeLogEntry) -> SimResult<()> {
        self.store.append_change(&self.run_id, entry)
    }

    // ── Sync ───────────────────────────────────────────────────

    /// Changes after `since_tick`. `generation` is the one the client got
    /// with its last full state; a stale generation forces a resync.
    pub fn get_delta(&self, since_tick: Tick, generation: u64) -> Delta {
        self.sync.get_delta(since_tick, self.clock.current_tick, generation)
    }

    /// Bumped by every reset.
    pub fn generation(&self) -> u64 {
        self.sync.generation()
    }

    pub fn get_full_state(&self) -> FullState {
        FullState {
            tick:              self.clock.current_tick,
            generation:        self.sync.generation(),
            paused:            self.clock.paused,
            speed:             self.clock.speed,
            cycle:             serde_json::to_value(self.cycle.snapshot()).unwrap_or_default(),
            fleets_in_transit: self.transit.fleets_in_transit(),
            entities:          self.entities.all_entities(),
            planets:           self.galaxy.planets().cloned().collect(),
            recent_events:     self.sync.recent_events(RECENT_EVENTS_IN_STATE),
        }
    }

    /// Surfaces stripped, entity list optionally truncated. The store
    /// itself is never touched.
    pub fn get_light_state(&self, options: LightStateOptions) -> LightState {
        let entity_total = self.entities.len();
        let limit = options.entity_limit.unwrap_or(entity_total);
        LightState {
            tick:              self.clock.current_tick,
            generation:        self.sync.generation(),
            paused:            self.clock.paused,
            speed:             self.clock.speed,
            cycle:             self.cycle.get_state(self.clock.current_tick),
            fleets_in_transit: self.transit.fleets_in_transit(),
            entities:          self.entities.iter().take(limit).cloned().collect(),
            entity_total,
            planets:           self.galaxy.planets().map(|p| p.without_surface()).collect(),
        }
    }

    pub fn serialize(&self) -> SimResult<String> {
        Ok(serde_json::to_string(&self.get_full_state())?)
    }

    pub fn serialize_light(&self, options: LightStateOptions) -> SimResult<String> {
        Ok(serde_json::to_string(&self.get_light_state(options))?)
    }

    /// Replace the whole simulation with `state`. Nothing is merged:
    /// fleets, entities and planets not in `state` are gone afterwards.
    /// Clients holding an earlier tick are told to fetch full state.
    pub fn load_state(&mut self, state: FullState) {
        self.clock.current_tick = state.tick;
        self.clock.paused = state.paused;
        self.clock.speed = state.speed;
        self.cycle = CycleManager::restore(
            &self.config,
            &state.cycle,
            self.rng_bank.for_subsystem(SubsystemSlot::Cycle),
        );
        self.transit.load_state(state.fleets_in_transit);
        self.entities = EntityRegistry::from_entities(state.entities);
        self.galaxy = Galaxy::from_planets(state.planets);

        self.sync.clear();
        self.sync.set_generation(state.generation);
        self.sync.mark_history_lost(state.tick);
        for entry in state.recent_events {
            self.sync.log(&entry.kind, &entry.message, entry.tick);
        }
        log::info!("state loaded at tick {}", state.tick);
    }

    // ── Persistence ────────────────────────────────────────────

    /// Persist a full snapshot of the current tick.
    pub fn save(&self) -> SimResult<()> {
        let snapshot = SimSnapshot {
            run_id: self.run_id.clone(),
            tick:   self.clock.current_tick,
            state:  self.get_full_state(),
        };
        self.store.save_snapshot(&self.run_id, snapshot.tick, &snapshot.to_json()?)?;
        log::debug!("snapshot saved at tick {}", snapshot.tick);
        Ok(())
    }

    /// Start the run over with a new world.
    ///
    /// The fresh state is built first and committed to the database in
    /// one transaction that also drops every old snapshot and change.
    /// Only then is the in-memory state swapped. If the commit fails the
    /// engine is untouched and keeps running the old game.
    pub fn reset(&mut self, galaxy: Galaxy, entities: EntityRegistry) -> SimResult<()> {
        let cycle = CycleManager::new(&self.config, 0, self.rng_bank.for_subsystem(SubsystemSlot::Cycle));
        let generation = self.sync.generation() + 1;
        let fresh = FullState {
            tick:              0,
            generation,
            paused:            self.clock.paused,
            speed:             self.clock.speed,
            cycle:             serde_json::to_value(cycle.snapshot())?,
            fleets_in_transit: Vec::new(),
            entities:          entities.all_entities(),
            planets:           galaxy.planets().cloned().collect(),
            recent_events:     Vec::new(),
        };
        let snapshot = SimSnapshot { run_id: self.run_id.clone(), tick: 0, state: fresh };
        self.store.reset_run(&self.run_id, &snapshot.to_json()?)?;

        self.clock.rewind();
        self.cycle = cycle;
        self.transit.clear();
        self.entities = entities;
        self.galaxy = galaxy;
        self.sync.clear();
        self.sync.set_generation(generation);

        log::info!("run {} reset (generation {generation})", self.run_id);
        self.record(&SimEvent::GameReset { tick: 0 })
    }

    // ── Fleets and combat ──────────────────────────────────────

    /// Launch a fleet departing now.
    pub fn launch_fleet(&mut self, order: FleetOrder) -> SimResult<FleetId> {
        let tick = self.clock.current_tick;
        let mut ctx = TickContext::new(tick, self.cycle.effects(), &mut self.entities, &mut self.galaxy);
        let event = self.transit.launch_fleet(order, &mut ctx)?;
        let fleet_id = match &event {
            SimEvent::FleetLaunched { fleet_id, .. } => fleet_id.clone(),
            _ => return Err(SimError::invalid("fleet launch produced no fleet")),
        };
        self.record(&event)?;
        Ok(fleet_id)
    }

    pub fn fleets_in_transit(&self) -> Vec<Fleet> {
        self.transit.fleets_in_transit()
    }

    /// One out-of-band combat pass at the current tick, for action
    /// handlers that need fights settled before the next tick.
    pub fn resolve_all_combat(&mut self) -> SimResult<Vec<SimEvent>> {
        let tick = self.clock.current_tick;
        let mut ctx = TickContext::new(tick, self.cycle.effects(), &mut self.entities, &mut self.galaxy);
        let events = self
            .combat
            .resolve_all(&mut ctx, self.rng_bank.for_subsystem(SubsystemSlot::Combat));
        for event in &events {
            self.record(event)?;
        }
        Ok(events)
    }

    /// Run an invasion of `planet` and record the outcome. Ownership is
    /// left to the caller; see `apply_command` for the full order.
    pub fn resolve_planetary_invasion(
        &mut self,
        attacker_ids: &[EntityId],
        defender_ids: &[EntityId],
        planet: &str,
    ) -> SimResult<InvasionOutcome> {
        if self.galaxy.planet(planet).is_none() {
            return Err(SimError::UnknownPlanet { id: planet.to_string() });
        }
        let attacker = attacker_ids
            .first()
            .and_then(|id| self.entities.entity(id))
            .map(|e| e.owner.clone())
            .unwrap_or_default();

        let outcome = self.combat.resolve_planetary_invasion(
            attacker_ids,
            defender_ids,
            planet,
            &mut self.entities,
            self.rng_bank.for_subsystem(SubsystemSlot::Invasion),
        );

        for line in &outcome.battle_log {
            self.log("battle", line);
        }
        self.record(&SimEvent::InvasionResolved {
            tick:            self.clock.current_tick,
            planet:          planet.to_string(),
            attacker,
            conquered:       outcome.conquered,
            attacker_losses: outcome.attacker_losses,
            defender_losses: outcome.defender_losses,
            rounds:          outcome.rounds,
        })?;
        Ok(outcome)
    }

    // ── Player commands ────────────────────────────────────────

    /// Apply a player command. Never fails: rejections come back as
    /// `ActionResult { success: false, error }`.
    pub fn apply_command(&mut self, command: PlayerCommand) -> ActionResult {
        match self.try_apply(command) {
            Ok(result) => result,
            Err(e) => {
                log::warn!("tick={} command rejected: {e}", self.clock.current_tick);
                e.into()
            }
        }
    }

    fn try_apply(&mut self, command: PlayerCommand) -> SimResult<ActionResult> {
        match command {
            PlayerCommand::Pause => {
                self.pause()?;
                Ok(ActionResult::ok())
            }
            PlayerCommand::Resume => {
                self.resume()?;
                Ok(ActionResult::ok())
            }
            PlayerCommand::SetSpeed { speed } => {
                self.set_speed(speed);
                Ok(ActionResult::ok())
            }
            PlayerCommand::LaunchFleet { empire, origin, destination, ship_ids, escort_ids } => {
                self.require_empire(&empire)?;
                let fleet_id = self.launch_fleet(FleetOrder {
                    owner: empire,
                    origin,
                    destination,
                    ship_ids,
                    escort_ids,
                })?;
                Ok(ActionResult { fleet_id: Some(fleet_id), ..ActionResult::ok() })
            }
            PlayerCommand::SetTarget { empire, entity, target } => {
                self.require_empire(&empire)?;
                self.require_owned(&empire, &entity)?;
                let target_owner = self
                    .entities
                    .entity(&target)
                    .map(|t| t.owner.clone())
                    .ok_or_else(|| SimError::UnknownEntity { id: target.clone() })?;
                if target_owner == empire {
                    return Err(SimError::invalid("cannot target your own units"));
                }
                self.entities.set_target(&entity, Some(target.clone()))?;
                self.record(&SimEvent::TargetAssigned {
                    tick: self.clock.current_tick,
                    entity,
                    target: Some(target),
                })?;
                Ok(ActionResult::ok())
            }
            PlayerCommand::ClearTarget { empire, entity } => {
                self.require_empire(&empire)?;
                self.require_owned(&empire, &entity)?;
                self.entities.set_target(&entity, None)?;
                self.record(&SimEvent::TargetAssigned {
                    tick: self.clock.current_tick,
                    entity,
                    target: None,
                })?;
                Ok(ActionResult::ok())
            }
            PlayerCommand::Invade { empire, planet, attacker_ids } => {
                self.invade(empire, planet, attacker_ids)
            }
            PlayerCommand::ForceCycle { cycle, duration } => {
                let cycle = Cycle::from_id(&cycle)
                    .ok_or_else(|| SimError::invalid(format!("unknown cycle '{cycle}'")))?;
                let event = self.cycle.force_cycle(
                    cycle,
                    self.clock.current_tick,
                    duration,
                    self.rng_bank.for_subsystem(SubsystemSlot::Cycle),
                );
                self.record(&event)?;
                Ok(ActionResult::ok())
            }
        }
    }

    fn invade(
        &mut self,
        empire: String,
        planet: String,
        attacker_ids: Vec<EntityId>,
    ) -> SimResult<ActionResult> {
        self.require_empire(&empire)?;
        let defender_owner = self
            .galaxy
            .planet(&planet)
            .ok_or_else(|| SimError::UnknownPlanet { id: planet.clone() })?
            .owner
            .clone();
        if defender_owner.as_deref() == Some(empire.as_str()) {
            return Err(SimError::invalid(format!("{empire} already holds {planet}")));
        }
        if attacker_ids.is_empty() {
            return Err(SimError::invalid("an invasion needs at least one attacker"));
        }
        for id in &attacker_ids {
            self.require_owned(&empire, id)?;
            let here = self.entities.entity(id).and_then(|e| e.location.as_deref()) == Some(planet.as_str());
            if !here {
                return Err(SimError::invalid(format!("{id} is not at {planet}")));
            }
        }

        let defender_ids: Vec<EntityId> = match &defender_owner {
            Some(owner) => self
                .entities
                .entities_at_location(&planet)
                .into_iter()
                .filter(|e| &e.owner == owner)
                .map(|e| e.id)
                .collect(),
            None => Vec::new(),
        };

        let outcome = self.resolve_planetary_invasion(&attacker_ids, &defender_ids, &planet)?;
        if outcome.conquered {
            let previous_owner = self.galaxy.set_planet_owner(&planet, Some(empire.clone()))?;
            self.record(&SimEvent::PlanetConquered {
                tick: self.clock.current_tick,
                planet,
                new_owner: empire,
                previous_owner,
            })?;
        }

        Ok(ActionResult {
            conquered: Some(outcome.conquered),
            battle_log: outcome.battle_log,
            ..ActionResult::ok()
        })
    }

    fn require_empire(&self, empire: &str) -> SimResult<()> {
        let known = !self.galaxy.planets_owned_by(empire).is_empty()
            || self.entities.iter().any(|e| e.owner == empire);
        if known {
            Ok(())
        } else {
            Err(SimError::invalid(format!("unknown empire '{empire}'")))
        }
    }

    fn require_owned(&self, empire: &str, entity: &str) -> SimResult<()> {
        let owner = self
            .entities
            .entity(entity)
            .map(|e| e.owner.as_str())
            .ok_or_else(|| SimError::UnknownEntity { id: entity.to_string() })?;
        if owner != empire {
            return Err(SimError::invalid(format!("{entity} is not owned by {empire}")));
        }
        Ok(())
    }

    pub fn set_speed(&mut self, speed: SimSpeed) {
        self.clock.set_speed(speed);
    }

    // ── Accessors ──────────────────────────────────────────────

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn cycle(&self) -> &CycleManager {
        &self.cycle
    }

    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    pub fn galaxy(&self) -> &Galaxy {
        &self.galaxy
    }

    pub fn store(&self) -> &SimStore {
        &self.store
    }

    /// Find a registered hook by concrete type.
    pub fn hook<T: 'static>(&self) -> Option<&T> {
        self.hooks.iter().find_map(|h| h.as_any().downcast_ref::<T>())
    }
}

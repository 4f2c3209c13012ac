//! Subsystem trait and the per-tick context.
//!
//! RULE: Every per-tick component implements SimSubsystem.
//! The engine hands each one an explicit TickContext; components never
//! reach into engine state on their own. Execution order is fixed and
//! documented in engine.rs.

use crate::{
    cycle::CycleEffects,
    entity::EntityStore,
    error::SimResult,
    event::SimEvent,
    rng::RandomSource,
    types::Tick,
    universe::Universe,
};
use std::any::Any;

/// Everything a component may read or mutate during one step.
pub struct TickContext<'a> {
    pub tick:     Tick,
    /// Effects of the cycle active for this tick (after the cycle advance).
    pub effects:  CycleEffects,
    pub entities: &'a mut dyn EntityStore,
    pub universe: &'a mut dyn Universe,
}

impl<'a> TickContext<'a> {
    pub fn new(
        tick: Tick,
        effects: CycleEffects,
        entities: &'a mut dyn EntityStore,
        universe: &'a mut dyn Universe,
    ) -> Self {
        Self { tick, effects, entities, universe }
    }
}

/// The contract every per-tick component must fulfill.
pub trait SimSubsystem: Send {
    /// Unique stable name for this subsystem.
    fn name(&self) -> &'static str;

    /// Called once per tick by the engine.
    ///
    /// - `ctx`:       the tick number, active effects and collaborators
    /// - `events_in`: events emitted by earlier subsystems this tick
    /// - `rng`:       this subsystem's random stream
    ///
    /// Returns new events to append to the change log.
    fn update(
        &mut self,
        ctx: &mut TickContext<'_>,
        events_in: &[SimEvent],
        rng: &mut dyn RandomSource,
    ) -> SimResult<Vec<SimEvent>>;

    /// For downcasting in tests and tooling only.
    /// Production sim code never uses this.
    fn as_any(&self) -> &dyn Any;
}

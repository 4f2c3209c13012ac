//! Fleet transit: ships travelling between planets.
//!
//! A fleet owns its ships from launch until arrival. While travelling the
//! ships have no location, so they take no part in skirmishes. Each tick:
//!   1. Void-storm attrition hits every ship in flight (never lethal).
//!   2. Fleets whose progress reached 1.0 land at their destination.

use crate::{
    cycle::{modify_travel_time, CycleEffects},
    entity::EntityStore,
    error::{SimError, SimResult},
    event::SimEvent,
    rng::RandomSource,
    subsystem::{SimSubsystem, TickContext},
    types::{EmpireId, EntityId, FleetId, LocationId, Tick},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fleet {
    pub id:             FleetId,
    pub owner:          EmpireId,
    pub origin_id:      LocationId,
    pub destination_id: LocationId,
    pub ship_ids:       BTreeSet<EntityId>,
    pub departure_tick: Tick,
    pub travel_time:    Tick,
    pub in_transit:     bool,
}

impl Fleet {
    /// (current − departure) / travel_time, unclamped. Negative only if
    /// the tick counter was rewound without clearing this fleet.
    pub fn raw_progress(&self, current_tick: Tick) -> f64 {
        let travel = self.travel_time.max(1) as f64;
        (current_tick as f64 - self.departure_tick as f64) / travel
    }

    /// Progress clamped to [0, 1].
    pub fn progress(&self, current_tick: Tick) -> f64 {
        self.raw_progress(current_tick).clamp(0.0, 1.0)
    }

    pub fn arrival_tick(&self) -> Tick {
        self.departure_tick + self.travel_time
    }
}

/// A request to move ships from one planet to another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FleetOrder {
    pub owner:       EmpireId,
    pub origin:      LocationId,
    pub destination: LocationId,
    pub ship_ids:    Vec<EntityId>,
    #[serde(default)]
    pub escort_ids:  Vec<EntityId>,
}

pub struct FleetTransit {
    fleets:      BTreeMap<FleetId, Fleet>,
    fleet_speed: f64,
}

impl FleetTransit {
    pub fn new(fleet_speed: f64) -> Self {
        Self {
            fleets: BTreeMap::new(),
            fleet_speed: if fleet_speed > 0.0 { fleet_speed } else { 1.0 },
        }
    }

    /// Base journey length before cycle modifiers.
    pub fn base_travel_time(&self, distance: f64) -> Tick {
        ((distance / self.fleet_speed).ceil() as Tick).max(1)
    }

    /// Validate and dispatch a fleet departing at `ctx.tick`.
    pub fn launch_fleet(&mut self, order: FleetOrder, ctx: &mut TickContext<'_>) -> SimResult<SimEvent> {
        if order.origin == order.destination {
            return Err(SimError::invalid("origin and destination are the same"));
        }
        let distance = ctx
            .universe
            .distance(&order.origin, &order.destination)
            .ok_or_else(|| {
                let missing = if ctx.universe.planet(&order.origin).is_none() {
                    &order.origin
                } else {
                    &order.destination
                };
                SimError::UnknownPlanet { id: missing.clone() }
            })?;

        let ship_ids: BTreeSet<EntityId> = order
            .ship_ids
            .iter()
            .chain(order.escort_ids.iter())
            .cloned()
            .collect();
        if ship_ids.is_empty() {
            return Err(SimError::invalid("a fleet needs at least one ship"));
        }
        for id in &ship_ids {
            let ship = ctx
                .entities
                .entity(id)
                .ok_or_else(|| SimError::UnknownEntity { id: id.clone() })?;
            if ship.owner != order.owner {
                return Err(SimError::invalid(format!("{id} is not owned by {}", order.owner)));
            }
            if ship.location.as_deref() != Some(order.origin.as_str()) {
                return Err(SimError::invalid(format!("{id} is not stationed at {}", order.origin)));
            }
        }

        let travel_time = modify_travel_time(&ctx.effects, self.base_travel_time(distance));
        for id in &ship_ids {
            ctx.entities.set_location(id, None)?;
        }

        let fleet = Fleet {
            id:             format!("fleet-{}", Uuid::new_v4()),
            owner:          order.owner,
            origin_id:      order.origin,
            destination_id: order.destination,
            ship_ids,
            departure_tick: ctx.tick,
            travel_time,
            in_transit:     true,
        };

        log::info!(
            "tick={} fleet {} launched: {} ships {} -> {} ({} ticks)",
            ctx.tick, fleet.id, fleet.ship_ids.len(), fleet.origin_id, fleet.destination_id, travel_time
        );

        let event = SimEvent::FleetLaunched {
            tick:        ctx.tick,
            fleet_id:    fleet.id.clone(),
            owner:       fleet.owner.clone(),
            origin:      fleet.origin_id.clone(),
            destination: fleet.destination_id.clone(),
            ship_count:  fleet.ship_ids.len(),
            travel_time,
        };
        self.fleets.insert(fleet.id.clone(), fleet);
        Ok(event)
    }

    /// Storm attrition then arrivals for `ctx.tick`.
    pub fn advance(&mut self, ctx: &mut TickContext<'_>) -> SimResult<Vec<SimEvent>> {
        let mut events = Vec::new();

        if let Some(event) = self.apply_storm_damage(&ctx.effects, ctx.tick, ctx.entities) {
            events.push(event);
        }

        let arrived: Vec<FleetId> = self
            .fleets
            .values()
            .filter(|f| {
                if f.departure_tick > ctx.tick {
                    log::warn!(
                        "fleet {} departs at tick {} but clock is at {}; tick was rewound without clearing fleets",
                        f.id, f.departure_tick, ctx.tick
                    );
                }
                f.in_transit && f.raw_progress(ctx.tick) >= 1.0
            })
            .map(|f| f.id.clone())
            .collect();

        for fleet_id in arrived {
            let Some(fleet) = self.fleets.remove(&fleet_id) else {
                continue;
            };
            let mut landed = Vec::with_capacity(fleet.ship_ids.len());
            for ship_id in &fleet.ship_ids {
                if ctx.entities.entity(ship_id).is_some() {
                    ctx.entities.set_location(ship_id, Some(fleet.destination_id.clone()))?;
                    landed.push(ship_id.clone());
                }
            }
            log::info!(
                "tick={} fleet {} arrived at {} with {} ships",
                ctx.tick, fleet.id, fleet.destination_id, landed.len()
            );
            events.push(SimEvent::FleetArrived {
                tick:        ctx.tick,
                fleet_id:    fleet.id,
                owner:       fleet.owner,
                destination: fleet.destination_id,
                ship_ids:    landed,
            });
        }

        Ok(events)
    }

    /// max(1, floor(hp × pct / 100)) per ship, capped so no ship drops
    /// below 1 hp. Only combat destroys ships.
    fn apply_storm_damage(
        &self,
        effects: &CycleEffects,
        tick: Tick,
        entities: &mut dyn EntityStore,
    ) -> Option<SimEvent> {
        let pct = effects.fleet_damage_per_tick.filter(|p| *p > 0.0)?;
        let mut ships_damaged = 0;
        let mut total_damage = 0.0;

        for fleet in self.fleets.values().filter(|f| f.in_transit) {
            for ship_id in &fleet.ship_ids {
                let Some(hp) = entities.entity(ship_id).map(|s| s.hp) else {
                    continue;
                };
                let damage = (hp * pct / 100.0).floor().max(1.0).min(hp - 1.0);
                if damage <= 0.0 {
                    continue;
                }
                entities.damage_entity(ship_id, damage);
                ships_damaged += 1;
                total_damage += damage;
            }
        }

        if ships_damaged == 0 {
            return None;
        }
        log::debug!("tick={tick} void storm: {ships_damaged} ships lost {total_damage} hp");
        Some(SimEvent::StormDamage { tick, ships_damaged, total_damage })
    }

    /// Replace every in-transit fleet with `fleets`. Never merges.
    pub fn load_state(&mut self, fleets: Vec<Fleet>) {
        self.fleets = fleets.into_iter().map(|f| (f.id.clone(), f)).collect();
    }

    pub fn fleets_in_transit(&self) -> Vec<Fleet> {
        self.fleets.values().filter(|f| f.in_transit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.fleets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fleets.is_empty()
    }

    pub fn clear(&mut self) {
        self.fleets.clear();
    }
}

impl SimSubsystem for FleetTransit {
    fn name(&self) -> &'static str {
        "transit"
    }

    fn update(
        &mut self,
        ctx: &mut TickContext<'_>,
        _events_in: &[SimEvent],
        _rng: &mut dyn RandomSource,
    ) -> SimResult<Vec<SimEvent>> {
        self.advance(ctx)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

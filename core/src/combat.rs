//! Combat resolution.
//!
//! Per tick (in this order):
//!   1. Skirmishes: every location hosting more than one empire fights
//!      all-vs-all. Each side splits its total attack evenly across the
//!      entities of every other side.
//!   2. Targeted attacks: entities with an explicit target fire once if
//!      the target is alive and within `range × range_multiplier`.
//!
//! Planetary invasion is a separate, explicit call: a bounded multi-round
//! battle simulated on local copies, with the final losses written back
//! through the entity store.
//!
//! Both passes iterate a snapshot of the store taken before any damage
//! lands, so destruction mid-pass never shifts the iteration.

use crate::{
    config::SimConfig,
    entity::{Entity, EntityStore},
    error::SimResult,
    event::SimEvent,
    rng::RandomSource,
    subsystem::{SimSubsystem, TickContext},
    types::{EmpireId, EntityId, LocationId, Tick},
    universe::Universe,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DamageRecord {
    pub entity:    EntityId,
    pub amount:    f64,
    pub destroyed: bool,
}

/// Result of a planetary invasion. Only ever recorded as a change-log
/// entry; never persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvasionOutcome {
    pub conquered:       bool,
    pub attacker_losses: usize,
    pub defender_losses: usize,
    pub rounds:          u32,
    pub battle_log:      Vec<String>,
}

pub struct CombatResolver {
    attack_variance:   f64,
    range_multiplier:  f64,
    max_rounds:        u32,
    invasion_variance: f64,
}

impl CombatResolver {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            attack_variance:   config.targeted_attack_variance,
            range_multiplier:  config.range_multiplier,
            max_rounds:        config.invasion_max_rounds,
            invasion_variance: config.invasion_variance,
        }
    }

    /// Skirmishes then targeted attacks for `ctx.tick`.
    pub fn resolve_all(&self, ctx: &mut TickContext<'_>, rng: &mut dyn RandomSource) -> Vec<SimEvent> {
        let modifier = ctx.effects.combat_modifier.unwrap_or(1.0);
        let mut events = self.resolve_skirmishes(ctx.tick, modifier, ctx.entities);
        events.extend(self.resolve_targeted_attacks(ctx.tick, modifier, ctx.entities, ctx.universe, rng));
        events
    }

    fn resolve_skirmishes(
        &self,
        tick: Tick,
        modifier: f64,
        entities: &mut dyn EntityStore,
    ) -> Vec<SimEvent> {
        let mut by_location: BTreeMap<LocationId, BTreeMap<EmpireId, Vec<Entity>>> = BTreeMap::new();
        for entity in entities.all_entities() {
            if let Some(loc) = entity.location.clone() {
                by_location
                    .entry(loc)
                    .or_default()
                    .entry(entity.owner.clone())
                    .or_default()
                    .push(entity);
            }
        }

        let mut events = Vec::new();
        for (location, sides) in by_location {
            if sides.len() < 2 {
                continue;
            }

            let totals: Vec<(&EmpireId, f64, f64)> = sides
                .iter()
                .map(|(owner, members)| {
                    let attack: f64 = members.iter().filter(|e| e.is_armed()).map(|e| e.attack).sum();
                    let hp: f64 = members.iter().map(|e| e.hp).sum();
                    (owner, attack * modifier, hp)
                })
                .collect();

            let mut damages = Vec::new();
            let mut destroyed: BTreeSet<EntityId> = BTreeSet::new();

            for (attacker, total_attack, _) in &totals {
                if *total_attack <= 0.0 {
                    continue;
                }
                for (defender, members) in sides.iter().filter(|(owner, _)| owner != attacker) {
                    let per_entity = total_attack / members.len() as f64;
                    log::debug!(
                        "tick={tick} skirmish at {location}: {attacker} deals {per_entity:.1} to each of {} {defender} units",
                        members.len()
                    );
                    for target in members {
                        if destroyed.contains(&target.id) {
                            continue;
                        }
                        let killed = entities.damage_entity(&target.id, per_entity);
                        if killed {
                            destroyed.insert(target.id.clone());
                        }
                        damages.push(DamageRecord {
                            entity:    target.id.clone(),
                            amount:    per_entity,
                            destroyed: killed,
                        });
                    }
                }
            }

            if destroyed.is_empty() {
                continue;
            }
            log::info!(
                "tick={tick} skirmish at {location}: {} units destroyed ({})",
                destroyed.len(),
                totals
                    .iter()
                    .map(|(owner, atk, hp)| format!("{owner} atk={atk:.0} hp={hp:.0}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            events.push(SimEvent::SkirmishResolved {
                tick,
                location,
                sides: sides.keys().cloned().collect(),
                damages,
                destroyed: destroyed.into_iter().collect(),
            });
        }
        events
    }

    fn resolve_targeted_attacks(
        &self,
        tick: Tick,
        modifier: f64,
        entities: &mut dyn EntityStore,
        universe: &dyn Universe,
        rng: &mut dyn RandomSource,
    ) -> Vec<SimEvent> {
        let attackers: Vec<Entity> = entities
            .all_entities()
            .into_iter()
            .filter(|e| e.target.is_some() && e.is_armed())
            .collect();

        let mut events = Vec::new();
        for attacker in attackers {
            // Destroyed earlier in this pass.
            if entities.entity(&attacker.id).is_none() {
                continue;
            }
            let Some(target_id) = attacker.target.clone() else {
                continue;
            };
            let Some(target) = entities.entity(&target_id) else {
                log::debug!("tick={tick} {} lost its target {target_id}", attacker.id);
                if let Err(e) = entities.set_target(&attacker.id, None) {
                    log::warn!("tick={tick} could not clear target of {}: {e}", attacker.id);
                }
                continue;
            };
            if target.owner == attacker.owner || !target.is_alive() {
                continue;
            }
            let (Some(from), Some(to)) = (attacker.location.as_deref(), target.location.as_deref()) else {
                continue;
            };
            let distance = if from == to { Some(0.0) } else { universe.distance(from, to) };
            let Some(distance) = distance else {
                continue;
            };
            if distance > attacker.range * self.range_multiplier {
                continue;
            }

            let damage = attacker.attack * rng.variance(self.attack_variance) * modifier;
            let destroyed = entities.damage_entity(&target_id, damage);
            if destroyed {
                if let Err(e) = entities.set_target(&attacker.id, None) {
                    log::warn!("tick={tick} could not clear target of {}: {e}", attacker.id);
                }
                log::info!("tick={tick} {} destroyed {target_id}", attacker.id);
            }
            events.push(SimEvent::AttackResolved {
                tick,
                attacker: attacker.id.clone(),
                target: target_id,
                damage,
                destroyed,
            });
        }
        events
    }

    /// Fight for one planet: up to `max_rounds` simultaneous exchanges.
    /// Ids that are not in the store are ignored.
    pub fn resolve_planetary_invasion(
        &self,
        attacker_ids: &[EntityId],
        defender_ids: &[EntityId],
        planet: &str,
        entities: &mut dyn EntityStore,
        rng: &mut dyn RandomSource,
    ) -> InvasionOutcome {
        let roster = |ids: &[EntityId], entities: &dyn EntityStore| -> Vec<Combatant> {
            ids.iter()
                .filter_map(|id| entities.entity(id))
                .map(Combatant::from)
                .collect()
        };
        let mut attackers = roster(attacker_ids, &*entities);
        let mut defenders = roster(defender_ids, &*entities);
        let mut battle_log = vec![format!(
            "Invasion of {planet}: {} attackers vs {} defenders",
            attackers.len(),
            defenders.len()
        )];

        let defender_hp: f64 = defenders.iter().map(|d| d.hp.max(0.0)).sum();
        if defenders.is_empty() || defender_hp <= 0.0 {
            battle_log.push(format!("{planet} is undefended and falls without a fight"));
            return InvasionOutcome {
                conquered: true,
                attacker_losses: 0,
                defender_losses: 0,
                rounds: 0,
                battle_log,
            };
        }

        let original_attackers = attackers.clone();
        let original_defenders = defenders.clone();
        let mut rounds = 0;

        while rounds < self.max_rounds && !attackers.is_empty() && !defenders.is_empty() {
            rounds += 1;
            let attack_total: f64 = attackers.iter().map(|c| c.attack).sum();
            let defense_total: f64 = defenders.iter().map(|c| c.attack).sum();
            let per_defender = attack_total / defenders.len() as f64;
            let per_attacker = defense_total / attackers.len() as f64;

            for d in defenders.iter_mut() {
                d.hp -= (per_defender * rng.variance(self.invasion_variance)).round();
            }
            for a in attackers.iter_mut() {
                a.hp -= (per_attacker * rng.variance(self.invasion_variance)).round();
            }
            battle_log.push(format!(
                "Round {rounds}: attackers deal {per_defender:.0} per defender, defenders deal {per_attacker:.0} per attacker"
            ));

            for fallen in remove_fallen(&mut defenders) {
                battle_log.push(format!("Round {rounds}: defender {fallen} destroyed"));
            }
            for fallen in remove_fallen(&mut attackers) {
                battle_log.push(format!("Round {rounds}: attacker {fallen} destroyed"));
            }
        }

        let conquered = defenders.is_empty() && !attackers.is_empty();
        if conquered {
            battle_log.push(format!("{planet} conquered after {rounds} rounds"));
        } else if attackers.is_empty() {
            battle_log.push(format!("Invasion force wiped out; {planet} holds"));
        } else {
            battle_log.push(format!("Stalemate after {rounds} rounds; {planet} remains defended"));
        }

        let attacker_losses = write_back(&original_attackers, &attackers, entities);
        let defender_losses = write_back(&original_defenders, &defenders, entities);

        log::info!(
            "invasion of {planet}: conquered={conquered} rounds={rounds} losses a={attacker_losses} d={defender_losses}"
        );

        InvasionOutcome {
            conquered,
            attacker_losses,
            defender_losses,
            rounds,
            battle_log,
        }
    }
}

impl SimSubsystem for CombatResolver {
    fn name(&self) -> &'static str {
        "combat"
    }

    fn update(
        &mut self,
        ctx: &mut TickContext<'_>,
        _events_in: &[SimEvent],
        rng: &mut dyn RandomSource,
    ) -> SimResult<Vec<SimEvent>> {
        Ok(self.resolve_all(ctx, rng))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[derive(Debug, Clone)]
struct Combatant {
    id:     EntityId,
    hp:     f64,
    attack: f64,
}

impl From<&Entity> for Combatant {
    fn from(e: &Entity) -> Self {
        Self {
            id:     e.id.clone(),
            hp:     e.hp,
            attack: if e.is_armed() { e.attack } else { 0.0 },
        }
    }
}

fn remove_fallen(side: &mut Vec<Combatant>) -> Vec<EntityId> {
    let fallen = side.iter().filter(|c| c.hp <= 0.0).map(|c| c.id.clone()).collect();
    side.retain(|c| c.hp > 0.0);
    fallen
}

/// Apply simulated losses to the store. Returns the number destroyed.
fn write_back(before: &[Combatant], after: &[Combatant], entities: &mut dyn EntityStore) -> usize {
    let survivors: BTreeMap<&str, f64> = after.iter().map(|c| (c.id.as_str(), c.hp)).collect();
    let mut losses = 0;
    for c in before {
        match survivors.get(c.id.as_str()) {
            Some(hp) => {
                entities.damage_entity(&c.id, c.hp - hp);
            }
            None => {
                let current = entities.entity(&c.id).map(|e| e.hp).unwrap_or(0.0);
                entities.damage_entity(&c.id, current.max(f64::MIN_POSITIVE));
                losses += 1;
            }
        }
    }
    losses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cycle::CycleEffects,
        entity::{EntityKind, EntityRegistry},
        rng::SequenceRng,
        universe::{Galaxy, Planet},
    };

    fn galaxy() -> Galaxy {
        Galaxy::from_planets([
            Planet::new("sol", "Sol", 0.0, 0.0),
            Planet::new("vega", "Vega", 30.0, 40.0),
        ])
    }

    fn ship(id: &str, owner: &str, loc: &str, hp: f64, attack: f64) -> Entity {
        Entity::new(id, owner, EntityKind::Ship, loc, hp, attack)
    }

    fn resolver() -> CombatResolver {
        CombatResolver::new(&SimConfig::default())
    }

    #[test]
    fn three_way_skirmish_hits_everyone() {
        let mut entities = EntityRegistry::from_entities([
            ship("r1", "red", "sol", 100.0, 10.0),
            ship("g1", "green", "sol", 100.0, 20.0),
            ship("b1", "blue", "sol", 100.0, 0.0),
            ship("b2", "blue", "sol", 100.0, 0.0),
        ]);
        let mut g = galaxy();
        let mut rng = SequenceRng::constant(0.5);
        let mut ctx = TickContext::new(1, CycleEffects::default(), &mut entities, &mut g);
        let events = resolver().resolve_all(&mut ctx, &mut rng);
        assert!(events.is_empty(), "no kills, no summary");

        // red: 20 from green. green: 10 from red. blue: 10/2 + 20/2 each.
        assert_eq!(entities.entity("r1").unwrap().hp, 80.0);
        assert_eq!(entities.entity("g1").unwrap().hp, 90.0);
        assert_eq!(entities.entity("b1").unwrap().hp, 85.0);
        assert_eq!(entities.entity("b2").unwrap().hp, 85.0);
    }

    #[test]
    fn skirmish_reports_destruction() {
        let mut entities = EntityRegistry::from_entities([
            ship("r1", "red", "sol", 100.0, 50.0),
            ship("b1", "blue", "sol", 20.0, 1.0),
            ship("b2", "blue", "sol", 30.0, 1.0),
            ship("x1", "blue", "vega", 30.0, 1.0),
        ]);
        let mut g = galaxy();
        let mut rng = SequenceRng::constant(0.5);
        let mut ctx = TickContext::new(3, CycleEffects::default(), &mut entities, &mut g);
        let events = resolver().resolve_all(&mut ctx, &mut rng);

        match events.as_slice() {
            [SimEvent::SkirmishResolved { location, destroyed, sides, .. }] => {
                assert_eq!(location, "sol");
                assert_eq!(destroyed, &vec!["b1".to_string()]);
                assert_eq!(sides, &vec!["blue".to_string(), "red".to_string()]);
            }
            other => panic!("unexpected events: {other:?}"),
        }
        assert_eq!(entities.entity("b2").unwrap().hp, 5.0);
        assert_eq!(entities.entity("r1").unwrap().hp, 98.0);
        assert_eq!(entities.entity("x1").unwrap().hp, 30.0);
    }

    #[test]
    fn targeted_attack_respects_range_and_clears_on_kill() {
        let mut near = ship("r1", "red", "sol", 50.0, 10.0).with_range(5.0);
        near.target = Some("b1".into());
        let mut far = ship("r2", "red", "sol", 50.0, 10.0).with_range(1.0);
        far.target = Some("b1".into());
        let mut entities = EntityRegistry::from_entities([near, far, ship("b1", "blue", "vega", 15.0, 0.0)]);
        let mut g = galaxy();

        // variance roll 1.0 → +10%
        let mut rng = SequenceRng::constant(0.999_999);
        let mut ctx = TickContext::new(2, CycleEffects::default(), &mut entities, &mut g);
        let events = resolver().resolve_all(&mut ctx, &mut rng);
        assert_eq!(events.len(), 1);
        assert_eq!(entities.entity("b1").unwrap().hp.round(), 4.0);

        let mut ctx = TickContext::new(3, CycleEffects::default(), &mut entities, &mut g);
        let events = resolver().resolve_all(&mut ctx, &mut rng);
        assert!(matches!(events.as_slice(), [SimEvent::AttackResolved { destroyed: true, .. }]));
        assert!(entities.entity("b1").is_none());
        assert!(entities.entity("r1").unwrap().target.is_none());
        // r2 comes later in the same pass and drops the dead target.
        assert!(entities.entity("r2").unwrap().target.is_none());
    }

    #[test]
    fn vanished_target_is_dropped() {
        let mut hunter = ship("r1", "red", "sol", 50.0, 10.0).with_range(100.0);
        hunter.target = Some("ghost".into());
        let mut entities = EntityRegistry::from_entities([hunter]);
        let mut g = galaxy();
        let mut rng = SequenceRng::constant(0.5);
        let mut ctx = TickContext::new(4, CycleEffects::default(), &mut entities, &mut g);
        assert!(resolver().resolve_all(&mut ctx, &mut rng).is_empty());
        assert!(entities.entity("r1").unwrap().target.is_none());
    }

    #[test]
    fn unarmed_units_never_attack() {
        let mut pacifist = ship("r1", "red", "sol", 50.0, 0.0).with_range(100.0);
        pacifist.target = Some("b1".into());
        let mut entities = EntityRegistry::from_entities([pacifist, ship("b1", "blue", "vega", 15.0, 0.0)]);
        let mut g = galaxy();
        let mut rng = SequenceRng::constant(0.5);
        let mut ctx = TickContext::new(2, CycleEffects::default(), &mut entities, &mut g);
        assert!(resolver().resolve_all(&mut ctx, &mut rng).is_empty());
        assert_eq!(entities.entity("b1").unwrap().hp, 15.0);
    }

    #[test]
    fn undefended_planet_falls_immediately() {
        let mut entities = EntityRegistry::from_entities([ship("r1", "red", "vega", 50.0, 10.0)]);
        let mut rng = SequenceRng::constant(0.5);
        let outcome = resolver().resolve_planetary_invasion(
            &["r1".into()],
            &[],
            "vega",
            &mut entities,
            &mut rng,
        );
        assert!(outcome.conquered);
        assert_eq!(outcome.attacker_losses, 0);
        assert_eq!(outcome.defender_losses, 0);
        assert_eq!(outcome.rounds, 0);
        assert_eq!(entities.entity("r1").unwrap().hp, 50.0);
    }

    #[test]
    fn overwhelming_invasion_conquers() {
        let mut entities = EntityRegistry::from_entities([
            ship("r1", "red", "vega", 100.0, 40.0),
            ship("r2", "red", "vega", 100.0, 40.0),
            ship("b1", "blue", "vega", 30.0, 5.0),
        ]);
        let mut rng = SequenceRng::constant(0.5);
        let outcome = resolver().resolve_planetary_invasion(
            &["r1".into(), "r2".into()],
            &["b1".into()],
            "vega",
            &mut entities,
            &mut rng,
        );
        assert!(outcome.conquered);
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.defender_losses, 1);
        assert_eq!(outcome.attacker_losses, 0);
        assert!(entities.entity("b1").is_none());
        // 5 attack split over 2 attackers, rounded: 3 each (2.5 rounds away from zero).
        assert_eq!(entities.entity("r1").unwrap().hp, 97.0);
    }

    #[test]
    fn stalemate_after_max_rounds() {
        let mut entities = EntityRegistry::from_entities([
            ship("r1", "red", "vega", 1000.0, 1.0),
            ship("b1", "blue", "vega", 1000.0, 1.0),
        ]);
        let mut rng = SequenceRng::constant(0.5);
        let outcome = resolver().resolve_planetary_invasion(
            &["r1".into()],
            &["b1".into()],
            "vega",
            &mut entities,
            &mut rng,
        );
        assert!(!outcome.conquered);
        assert_eq!(outcome.rounds, 10);
        assert!(outcome.battle_log.last().unwrap().contains("Stalemate"));
        assert_eq!(entities.entity("r1").unwrap().hp, 990.0);
        assert_eq!(entities.entity("b1").unwrap().hp, 990.0);
    }

    #[test]
    fn mutual_destruction_is_not_a_conquest() {
        let mut entities = EntityRegistry::from_entities([
            ship("r1", "red", "vega", 10.0, 50.0),
            ship("b1", "blue", "vega", 10.0, 50.0),
        ]);
        let mut rng = SequenceRng::constant(0.5);
        let outcome = resolver().resolve_planetary_invasion(
            &["r1".into()],
            &["b1".into()],
            "vega",
            &mut entities,
            &mut rng,
        );
        assert!(!outcome.conquered);
        assert_eq!((outcome.attacker_losses, outcome.defender_losses), (1, 1));
        assert!(entities.is_empty());
    }
}

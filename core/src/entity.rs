//! Units and structures, and the store the core reads them through.
//!
//! RULE: Components never hold references to entities across calls.
//! They look entities up by id every time, so a reset can never leave
//! a component pointing at a record that no longer exists.

use crate::{
    error::{SimError, SimResult},
    types::{EmpireId, EntityId, LocationId},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Ship,
    Troops,
    Structure,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub id:       EntityId,
    pub owner:    EmpireId,
    pub kind:     EntityKind,
    /// `None` while travelling with a fleet.
    #[serde(default)]
    pub location: Option<LocationId>,
    pub hp:       f64,
    pub max_hp:   f64,
    #[serde(default)]
    pub attack:   f64,
    #[serde(default)]
    pub range:    f64,
    #[serde(default)]
    pub target:   Option<EntityId>,
}

impl Entity {
    pub fn new(id: &str, owner: &str, kind: EntityKind, location: &str, hp: f64, attack: f64) -> Self {
        Self {
            id: id.to_string(),
            owner: owner.to_string(),
            kind,
            location: Some(location.to_string()),
            hp,
            max_hp: hp,
            attack,
            range: 1.0,
            target: None,
        }
    }

    pub fn with_range(mut self, range: f64) -> Self {
        self.range = range;
        self
    }

    /// Units with no (or nonsensical) attack power never start a fight.
    pub fn is_armed(&self) -> bool {
        self.attack.is_finite() && self.attack > 0.0
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0.0
    }
}

/// What the core needs from whoever owns unit records.
pub trait EntityStore {
    /// Owned copy of every entity, in stable id order. Callers iterate
    /// this snapshot, never the live collection.
    fn all_entities(&self) -> Vec<Entity>;

    fn entity(&self, id: &str) -> Option<&Entity>;

    fn entities_at_location(&self, location: &str) -> Vec<Entity>;

    /// Subtract `amount` hp. Returns true iff this call destroyed the
    /// entity. Destroyed entities leave the store. Unknown ids and
    /// non-positive amounts are no-ops.
    fn damage_entity(&mut self, id: &str, amount: f64) -> bool;

    fn set_location(&mut self, id: &str, location: Option<LocationId>) -> SimResult<()>;

    fn set_target(&mut self, id: &str, target: Option<EntityId>) -> SimResult<()>;
}

/// In-memory entity store used by the engine and tests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityRegistry {
    entities: BTreeMap<EntityId, Entity>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        Self {
            entities: entities.into_iter().map(|e| (e.id.clone(), e)).collect(),
        }
    }

    pub fn insert(&mut self, entity: Entity) {
        self.entities.insert(entity.id.clone(), entity);
    }

    pub fn remove(&mut self, id: &str) -> Option<Entity> {
        self.entities.remove(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }
}

impl EntityStore for EntityRegistry {
    fn all_entities(&self) -> Vec<Entity> {
        self.entities.values().cloned().collect()
    }

    fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    fn entities_at_location(&self, location: &str) -> Vec<Entity> {
        self.entities
            .values()
            .filter(|e| e.location.as_deref() == Some(location))
            .cloned()
            .collect()
    }

    fn damage_entity(&mut self, id: &str, amount: f64) -> bool {
        if !(amount > 0.0) {
            return false;
        }
        let Some(entity) = self.entities.get_mut(id) else {
            return false;
        };
        entity.hp -= amount;
        if entity.hp <= 0.0 {
            self.entities.remove(id);
            return true;
        }
        false
    }

    fn set_location(&mut self, id: &str, location: Option<LocationId>) -> SimResult<()> {
        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| SimError::UnknownEntity { id: id.to_string() })?;
        entity.location = location;
        Ok(())
    }

    fn set_target(&mut self, id: &str, target: Option<EntityId>) -> SimResult<()> {
        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| SimError::UnknownEntity { id: id.to_string() })?;
        entity.target = target;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn damage_reports_destruction_once() {
        let mut reg = EntityRegistry::from_entities([Entity::new(
            "s1", "red", EntityKind::Ship, "p1", 10.0, 2.0,
        )]);
        assert!(!reg.damage_entity("s1", 4.0));
        assert_eq!(reg.entity("s1").map(|e| e.hp), Some(6.0));
        assert!(reg.damage_entity("s1", 6.0));
        assert!(reg.entity("s1").is_none());
        assert!(!reg.damage_entity("s1", 6.0));
    }

    #[test]
    fn zero_or_nan_damage_is_ignored() {
        let mut reg = EntityRegistry::from_entities([Entity::new(
            "s1", "red", EntityKind::Ship, "p1", 10.0, 2.0,
        )]);
        assert!(!reg.damage_entity("s1", 0.0));
        assert!(!reg.damage_entity("s1", f64::NAN));
        assert_eq!(reg.entity("s1").map(|e| e.hp), Some(10.0));
    }

    #[test]
    fn location_query_skips_travellers() {
        let mut reg = EntityRegistry::from_entities([
            Entity::new("a", "red", EntityKind::Ship, "p1", 10.0, 1.0),
            Entity::new("b", "red", EntityKind::Ship, "p1", 10.0, 1.0),
        ]);
        reg.set_location("b", None).unwrap();
        let here: Vec<_> = reg.entities_at_location("p1").into_iter().map(|e| e.id).collect();
        assert_eq!(here, vec!["a".to_string()]);
        assert!(reg.set_location("zzz", None).is_err());
    }

    #[test]
    fn unarmed_units() {
        let mut e = Entity::new("t", "red", EntityKind::Structure, "p1", 5.0, 0.0);
        assert!(!e.is_armed());
        e.attack = f64::NAN;
        assert!(!e.is_armed());
    }
}

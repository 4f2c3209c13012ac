//! Built-in demo galaxy for headless runs: two empires, a contested
//! neutral world between them.

use galaxy_core::{
    entity::{Entity, EntityKind, EntityRegistry},
    universe::{Galaxy, Planet},
};

pub fn demo_galaxy() -> Galaxy {
    Galaxy::from_planets([
        Planet::new("sol", "Sol", 0.0, 0.0).owned_by("terran"),
        Planet::new("vega", "Vega", 120.0, 40.0),
        Planet::new("rigel", "Rigel", 240.0, 0.0).owned_by("zhar"),
    ])
}

pub fn demo_entities() -> EntityRegistry {
    let mut entities = Vec::new();
    for i in 0..6 {
        entities.push(
            Entity::new(&format!("terran-ship-{i}"), "terran", EntityKind::Ship, "sol", 100.0, 12.0)
                .with_range(2.0),
        );
        entities.push(
            Entity::new(&format!("zhar-ship-{i}"), "zhar", EntityKind::Ship, "rigel", 110.0, 10.0)
                .with_range(2.0),
        );
    }
    for i in 0..4 {
        entities.push(Entity::new(&format!("terran-troop-{i}"), "terran", EntityKind::Troops, "sol", 40.0, 8.0));
        entities.push(Entity::new(&format!("zhar-troop-{i}"), "zhar", EntityKind::Troops, "rigel", 45.0, 7.0));
    }
    entities.push(Entity::new("sol-battery", "terran", EntityKind::Structure, "sol", 300.0, 20.0));
    entities.push(Entity::new("rigel-battery", "zhar", EntityKind::Structure, "rigel", 300.0, 20.0));
    EntityRegistry::from_entities(entities)
}

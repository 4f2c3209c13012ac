use galaxy_core::{
    command::PlayerCommand,
    config::SimConfig,
    engine::SimEngine,
    entity::{Entity, EntityKind, EntityRegistry, EntityStore},
    store::SimStore,
    universe::{Galaxy, Planet, Universe},
};

fn build_engine(entities: Vec<Entity>) -> SimEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = SimStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store.insert_run("invasion-test", 3, "0.1.0-test").expect("insert run");

    let galaxy = Galaxy::from_planets([
        Planet::new("sol", "Sol", 0.0, 0.0).owned_by("terran"),
        Planet::new("vega", "Vega", 30.0, 40.0),
        Planet::new("rigel", "Rigel", 90.0, 0.0).owned_by("zhar"),
    ]);
    SimEngine::new("invasion-test".into(), 3, SimConfig::default(), store)
        .with_world(galaxy, EntityRegistry::from_entities(entities))
}

fn troop(id: &str, owner: &str, at: &str, hp: f64, attack: f64) -> Entity {
    Entity::new(id, owner, EntityKind::Troops, at, hp, attack)
}

fn invade(engine: &mut SimEngine, planet: &str, attackers: &[&str]) -> galaxy_core::command::ActionResult {
    engine.apply_command(PlayerCommand::Invade {
        empire:       "terran".into(),
        planet:       planet.into(),
        attacker_ids: attackers.iter().map(|s| s.to_string()).collect(),
    })
}

#[test]
fn undefended_planet_falls_without_a_fight() {
    let mut engine = build_engine(vec![troop("a1", "terran", "vega", 50.0, 5.0)]);
    engine.tick().unwrap();

    let result = invade(&mut engine, "vega", &["a1"]);
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.conquered, Some(true));
    assert_eq!(engine.galaxy().planet("vega").unwrap().owner.as_deref(), Some("terran"));

    let types: Vec<_> = engine
        .get_delta(0, 0)
        .changes
        .iter()
        .map(|c| c.change_type.clone())
        .collect();
    assert_eq!(types, vec!["invasion_resolved", "planet_conquered"]);
}

#[test]
fn overwhelming_force_takes_a_defended_planet() {
    let mut engine = build_engine(vec![
        troop("a1", "terran", "rigel", 100.0, 50.0),
        troop("a2", "terran", "rigel", 100.0, 50.0),
        troop("a3", "terran", "rigel", 100.0, 50.0),
        troop("d1", "zhar", "rigel", 30.0, 5.0),
    ]);

    let result = invade(&mut engine, "rigel", &["a1", "a2", "a3"]);
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.conquered, Some(true));
    assert!(result.battle_log.len() >= 3);

    assert_eq!(engine.galaxy().planet("rigel").unwrap().owner.as_deref(), Some("terran"));
    assert!(engine.entities().entity("d1").is_none());
    for id in ["a1", "a2", "a3"] {
        let hp = engine.entities().entity(id).unwrap().hp;
        assert!(hp < 100.0 && hp >= 97.0, "{id} hp {hp}");
    }
}

#[test]
fn repelled_invasion_keeps_ownership() {
    let mut engine = build_engine(vec![
        troop("a1", "terran", "rigel", 5.0, 1.0),
        troop("d1", "zhar", "rigel", 500.0, 100.0),
    ]);

    let result = invade(&mut engine, "rigel", &["a1"]);
    assert!(result.success);
    assert_eq!(result.conquered, Some(false));
    assert_eq!(engine.galaxy().planet("rigel").unwrap().owner.as_deref(), Some("zhar"));
    assert!(engine.entities().entity("a1").is_none());
    assert_eq!(engine.entities().entity("d1").unwrap().hp, 499.0);
}

#[test]
fn invalid_invasions_are_rejected() {
    let mut engine = build_engine(vec![
        troop("a1", "terran", "sol", 50.0, 5.0),
        troop("z1", "zhar", "rigel", 50.0, 5.0),
    ]);
    engine.tick().unwrap();

    let not_there = invade(&mut engine, "rigel", &["a1"]);
    assert!(!not_there.success);

    let own_planet = invade(&mut engine, "sol", &["a1"]);
    assert!(!own_planet.success);

    let borrowed = invade(&mut engine, "rigel", &["z1"]);
    assert!(!borrowed.success);

    let nobody = invade(&mut engine, "rigel", &[]);
    assert!(!nobody.success);

    let nowhere = invade(&mut engine, "atlantis", &["a1"]);
    assert!(!nowhere.success);

    assert_eq!(engine.galaxy().planet("rigel").unwrap().owner.as_deref(), Some("zhar"));
    assert!(engine.get_delta(0, 0).changes.is_empty());
}

//! Two engines, same seed, same orders.
//! They must produce identical change logs. Fleet ids are random uuids
//! and are the only field allowed to differ.

use galaxy_core::{
    config::SimConfig,
    engine::SimEngine,
    entity::{Entity, EntityKind, EntityRegistry},
    store::SimStore,
    transit::FleetOrder,
    universe::{Galaxy, Planet},
};

const RUN_ID: &str = "det-test";

fn build_engine(seed: u64) -> SimEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = SimStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store.insert_run(RUN_ID, seed, "0.1.0-test").expect("insert run");

    let galaxy = Galaxy::from_planets([
        Planet::new("sol", "Sol", 0.0, 0.0).owned_by("terran"),
        Planet::new("vega", "Vega", 60.0, 80.0),
        Planet::new("rigel", "Rigel", 200.0, 0.0).owned_by("zhar"),
    ]);
    let mut entities = Vec::new();
    for i in 0..4 {
        entities.push(Entity::new(&format!("t{i}"), "terran", EntityKind::Ship, "sol", 400.0, 6.0));
        entities.push(Entity::new(&format!("z{i}"), "zhar", EntityKind::Ship, "rigel", 380.0, 7.0));
    }
    SimEngine::new(RUN_ID.to_string(), seed, SimConfig::default(), store)
        .with_world(galaxy, EntityRegistry::from_entities(entities))
}

fn play(engine: &mut SimEngine) {
    for (owner, home, ships) in [("terran", "sol", ["t0", "t1"]), ("zhar", "rigel", ["z0", "z1"])] {
        engine
            .launch_fleet(FleetOrder {
                owner:       owner.into(),
                origin:      home.into(),
                destination: "vega".into(),
                ship_ids:    ships.iter().map(|s| s.to_string()).collect(),
                escort_ids:  vec![],
            })
            .expect("launch");
    }
    engine.run_ticks(1_500).expect("run");
}

fn change_log(engine: &SimEngine) -> Vec<String> {
    engine
        .store()
        .changes_since(RUN_ID, 0)
        .expect("read changes")
        .into_iter()
        .map(|mut c| {
            if let Some(obj) = c.data.as_object_mut() {
                obj.remove("fleet_id");
            }
            format!("{}|{}|{}", c.tick, c.change_type, c.data)
        })
        .collect()
}

#[test]
fn same_seed_produces_identical_change_logs() {
    const SEED: u64 = 0xDEAD_BEEF_CAFE_1234;

    let mut engine_a = build_engine(SEED);
    let mut engine_b = build_engine(SEED);
    play(&mut engine_a);
    play(&mut engine_b);

    let log_a = change_log(&engine_a);
    let log_b = change_log(&engine_b);

    assert_eq!(log_a.len(), log_b.len(), "change log lengths differ");
    for (i, (a, b)) in log_a.iter().zip(log_b.iter()).enumerate() {
        assert_eq!(a, b, "change log diverged at entry {i}:\n  A: {a}\n  B: {b}");
    }

    // 1500 ticks always spans at least two cycle transitions.
    assert!(log_a.iter().filter(|l| l.contains("|cycle_started|")).count() >= 2);
    assert!(log_a.iter().any(|l| l.contains("|fleet_arrived|")));
}

#[test]
fn different_seeds_roll_different_cycles() {
    let a = build_engine(1);
    let b = build_engine(2);
    let sa = a.cycle().get_state(0);
    let sb = b.cycle().get_state(0);
    let c = build_engine(3);
    let sc = c.cycle().get_state(0);
    // Three independent 300..=600 rolls all colliding would point at a
    // seeding bug rather than bad luck.
    assert!(
        !(sa.duration == sb.duration && sb.duration == sc.duration),
        "seeds 1, 2, 3 all rolled duration {}",
        sa.duration
    );
}

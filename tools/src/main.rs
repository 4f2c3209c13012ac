//! galaxy-runner: headless tick engine runner.
//!
//! Usage:
//!   galaxy-runner --seed 12345 --ticks 600 --db run.db
//!   galaxy-runner --seed 12345 --ipc-mode
//!
//! In IPC mode one JSON request per stdin line, one JSON reply per
//! stdout line.

mod scenario;

use anyhow::Result;
use galaxy_core::{
    command::PlayerCommand,
    config::SimConfig,
    engine::SimEngine,
    store::SimStore,
    sync::LightStateOptions,
    transit::FleetOrder,
    types::Tick,
};
use std::env;
use std::io::{self, BufRead, Write};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcRequest {
    GetState,
    GetLightState {
        #[serde(default)]
        entity_limit: Option<usize>,
    },
    GetDelta {
        since: Tick,
        /// Generation from the client's last full state.
        #[serde(default)]
        generation: u64,
    },
    Tick {
        count: u64,
    },
    Command {
        command: PlayerCommand,
    },
    Reset,
    Quit,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let ticks = parse_arg(&args, "--ticks", 600u64);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = string_arg(&args, "--db").unwrap_or(":memory:");
    let data_dir = string_arg(&args, "--data-dir").unwrap_or("./data");

    if !ipc_mode {
        println!("galaxy-runner");
        println!("  seed:      {seed}");
        println!("  ticks:     {ticks}");
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!();
    }

    let config = SimConfig::load(data_dir).unwrap_or_else(|e| {
        log::warn!("{e}; using default config");
        SimConfig::default()
    });

    let store = SimStore::open(db)?;
    store.migrate()?;
    let run_id = format!("run-{seed}-{}", chrono::Utc::now().timestamp());
    store.insert_run(&run_id, seed, env!("CARGO_PKG_VERSION"))?;

    let mut engine = SimEngine::new(run_id.clone(), seed, config, store)
        .with_world(scenario::demo_galaxy(), scenario::demo_entities());

    if ipc_mode {
        run_ipc_loop(&mut engine)?;
    } else {
        opening_moves(&mut engine)?;
        engine.run_ticks(ticks)?;
        engine.save()?;
        print_summary(&engine, ticks);
    }

    Ok(())
}

/// Both empires send half their ships to the neutral world so the
/// headless run has something to fight over.
fn opening_moves(engine: &mut SimEngine) -> Result<()> {
    for (empire, home) in [("terran", "sol"), ("zhar", "rigel")] {
        let ship_ids = (0..3).map(|i| format!("{empire}-ship-{i}")).collect();
        let fleet_id = engine.launch_fleet(FleetOrder {
            owner:       empire.to_string(),
            origin:      home.to_string(),
            destination: "vega".to_string(),
            ship_ids,
            escort_ids:  Vec::new(),
        })?;
        log::info!("{empire} launched {fleet_id} toward vega");
    }
    Ok(())
}

fn run_ipc_loop(engine: &mut SimEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let request: IpcRequest = match serde_json::from_str(&buffer) {
            Ok(r) => r,
            Err(e) => {
                writeln!(stdout, "{}", serde_json::json!({ "error": e.to_string() }))?;
                stdout.flush()?;
                continue;
            }
        };

        match handle_request(engine, request) {
            Ok(Some(reply)) => writeln!(stdout, "{reply}")?,
            Ok(None) => break,
            Err(e) => {
                log::warn!("ipc request failed: {e:#}");
                writeln!(stdout, "{}", serde_json::json!({ "error": format!("{e:#}") }))?;
            }
        }
        stdout.flush()?;
    }
    Ok(())
}

/// One reply line per request. `None` ends the session.
fn handle_request(engine: &mut SimEngine, request: IpcRequest) -> Result<Option<String>> {
    let reply = match request {
        IpcRequest::Quit => return Ok(None),
        IpcRequest::GetState => engine.serialize()?,
        IpcRequest::GetLightState { entity_limit } => engine.serialize_light(LightStateOptions { entity_limit })?,
        IpcRequest::GetDelta { since, generation } => serde_json::to_string(&engine.get_delta(since, generation))?,
        IpcRequest::Tick { count } => {
            engine.run_ticks(count)?;
            let since = engine.tick_count().saturating_sub(count);
            serde_json::to_string(&engine.get_delta(since, engine.generation()))?
        }
        IpcRequest::Command { command } => serde_json::to_string(&engine.apply_command(command))?,
        IpcRequest::Reset => {
            engine.reset(scenario::demo_galaxy(), scenario::demo_entities())?;
            engine.serialize()?
        }
    };
    Ok(Some(reply))
}

fn print_summary(engine: &SimEngine, ticks: u64) {
    let cycle = engine.cycle().get_state(engine.tick_count());
    let state = engine.get_light_state(LightStateOptions::default());

    println!("=== RUN SUMMARY ===");
    println!("  run_id:         {}", engine.run_id);
    println!("  ticks run:      {ticks}");
    println!("  final tick:     {}", engine.tick_count());
    println!("  cycle:          {} ({} ticks left)", cycle.cycle.display_name(), cycle.remaining);
    println!("  next cycle:     {}", cycle.next_cycle.display_name());
    println!("  fleets moving:  {}", state.fleets_in_transit.len());
    println!("  entities alive: {}", state.entity_total);

    println!();
    println!("=== PLANETS ===");
    for planet in &state.planets {
        let owner = planet.owner.as_deref().unwrap_or("-");
        println!("  {:<8} owner: {owner}", planet.name);
    }

    println!();
    println!("=== RECENT EVENTS ===");
    for entry in engine.get_full_state().recent_events.iter().rev().take(10).rev() {
        println!("  [{:>5}] {}", entry.tick, entry.message);
    }
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(migrated: bool) -> SimEngine {
        let store = SimStore::in_memory().unwrap();
        if migrated {
            store.migrate().unwrap();
            store.insert_run("ipc", 3, "test").unwrap();
        }
        SimEngine::new("ipc".into(), 3, SimConfig::default(), store)
            .with_world(scenario::demo_galaxy(), scenario::demo_entities())
    }

    fn request(json: &str) -> IpcRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn failed_request_leaves_engine_usable() {
        // No schema: the reset transaction fails.
        let mut engine = engine(false);
        assert!(handle_request(&mut engine, request(r#"{"type":"reset"}"#)).is_err());

        let reply = handle_request(&mut engine, request(r#"{"type":"get_state"}"#)).unwrap().unwrap();
        let state: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(state["tick"], 0);
    }

    #[test]
    fn delta_request_echoes_generation() {
        let mut engine = engine(true);
        handle_request(&mut engine, request(r#"{"type":"tick","count":4}"#)).unwrap();
        handle_request(&mut engine, request(r#"{"type":"reset"}"#)).unwrap();
        handle_request(&mut engine, request(r#"{"type":"tick","count":6}"#)).unwrap();

        let stale = handle_request(&mut engine, request(r#"{"type":"get_delta","since":4}"#)).unwrap().unwrap();
        assert!(stale.contains("\"full_state_needed\":true"), "{stale}");
        let fresh = handle_request(&mut engine, request(r#"{"type":"get_delta","since":4,"generation":1}"#))
            .unwrap()
            .unwrap();
        assert!(!fresh.contains("full_state_needed"), "{fresh}");
        assert!(handle_request(&mut engine, IpcRequest::Quit).unwrap().is_none());
    }
}

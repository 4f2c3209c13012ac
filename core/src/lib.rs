//! galaxy-core: deterministic tick engine for a galactic strategy game.
//!
//! The engine owns the clock, the cosmic cycle, fleets in transit and
//! combat resolution. Entity and planet storage sit behind the
//! `EntityStore` and `Universe` traits.

pub mod clock;
pub mod combat;
pub mod command;
pub mod config;
pub mod cycle;
pub mod engine;
pub mod entity;
pub mod error;
pub mod event;
pub mod ring;
pub mod rng;
pub mod snapshot;
pub mod store;
pub mod subsystem;
pub mod sync;
pub mod transit;
pub mod types;
pub mod universe;

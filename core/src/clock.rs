//! Simulation clock: the tick counter and its pause state.

use crate::types::Tick;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimClock {
    pub current_tick: Tick,
    pub speed:        SimSpeed,
    pub paused:       bool,
}

impl SimClock {
    /// A running clock at tick 0.
    pub fn new() -> Self {
        Self {
            current_tick: 0,
            speed: SimSpeed::Normal,
            paused: false,
        }
    }

    /// Advance one tick. Returns the new tick number.
    /// The engine checks `paused` before calling this.
    pub fn advance(&mut self) -> Tick {
        self.current_tick += 1;
        self.current_tick
    }

    pub fn pause(&mut self)  { self.paused = true;  }
    pub fn resume(&mut self) { self.paused = false; }

    pub fn set_speed(&mut self, speed: SimSpeed) {
        self.speed = speed;
    }

    /// Back to tick 0. Only the engine's reset may call this.
    pub(crate) fn rewind(&mut self) {
        self.current_tick = 0;
    }

    /// Advisory cadence for the external scheduler.
    pub fn ticks_per_real_second(&self) -> u32 {
        self.speed.ticks_per_real_second()
    }
}

impl Default for SimClock {
    fn default() -> Self { Self::new() }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SimSpeed {
    #[default]
    Normal,       // 1 tick per wall-clock second
    Accelerated,  // 5
    FastForward,  // 20
}

impl SimSpeed {
    pub fn ticks_per_real_second(&self) -> u32 {
        match self {
            Self::Normal      => 1,
            Self::Accelerated => 5,
            Self::FastForward => 20,
        }
    }
}

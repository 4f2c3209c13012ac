//! Random number sources.
//!
//! RULE: No algorithm in the simulation calls a platform RNG directly.
//! Everything that rolls dice takes a `&mut dyn RandomSource`, so tests
//! can substitute a scripted source.
//!
//! Production runs draw from SubsystemRng instances derived from the
//! run's master seed (master_seed XOR subsystem_index):
//!   - Adding a new subsystem never changes existing subsystems' streams.
//!   - Each subsystem's stream is reproducible in isolation.

use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

/// A source of uniform floats in [0.0, 1.0).
pub trait RandomSource {
    fn next_f64(&mut self) -> f64;

    /// Uniform integer in [lo, hi] (inclusive). Returns `lo` when the
    /// range is empty or inverted.
    fn range_u64(&mut self, lo: u64, hi: u64) -> u64 {
        if hi <= lo {
            return lo;
        }
        let span = (hi - lo + 1) as f64;
        let offset = (self.next_f64() * span).floor() as u64;
        lo + offset.min(hi - lo)
    }

    /// Uniform multiplier in [1 - pct, 1 + pct].
    fn variance(&mut self, pct: f64) -> f64 {
        1.0 + (self.next_f64() * 2.0 - 1.0) * pct
    }

    /// Pick an index proportionally to `weights`. Non-positive weights
    /// are never picked; an all-zero table yields index 0.
    fn weighted_index(&mut self, weights: &[f64]) -> usize {
        let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
        if total <= 0.0 {
            return 0;
        }
        let mut roll = self.next_f64() * total;
        for (i, w) in weights.iter().enumerate() {
            if *w <= 0.0 {
                continue;
            }
            if roll < *w {
                return i;
            }
            roll -= w;
        }
        // Float drift: fall back to the last positive weight.
        weights.iter().rposition(|w| *w > 0.0).unwrap_or(0)
    }
}

/// A named, deterministic RNG for a single subsystem.
pub struct SubsystemRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl SubsystemRng {
    /// Create a subsystem RNG from the master seed and a stable
    /// subsystem index. The index must never change once assigned.
    pub fn new(master_seed: u64, subsystem_index: u64) -> Self {
        let derived_seed = master_seed ^ (subsystem_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self {
            name: "unnamed",
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Draw a raw u64 (full range).
    pub fn next_u64(&mut self) -> u64 {
        use rand::RngCore;
        self.inner.next_u64()
    }
}

impl RandomSource for SubsystemRng {
    fn next_f64(&mut self) -> f64 {
        let bits = self.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }
}

/// Replays a fixed list of rolls, cycling when exhausted.
/// Used by tests that need exact damage or transition outcomes.
#[derive(Debug, Clone)]
pub struct SequenceRng {
    rolls: Vec<f64>,
    pos:   usize,
}

impl SequenceRng {
    pub fn new(rolls: Vec<f64>) -> Self {
        Self { rolls, pos: 0 }
    }

    /// Always returns the same roll.
    pub fn constant(roll: f64) -> Self {
        Self::new(vec![roll])
    }
}

impl RandomSource for SequenceRng {
    fn next_f64(&mut self) -> f64 {
        if self.rolls.is_empty() {
            return 0.0;
        }
        let roll = self.rolls[self.pos % self.rolls.len()];
        self.pos += 1;
        roll.clamp(0.0, 0.999_999_999)
    }
}

/// All subsystem RNGs for a single run. Each stream persists across
/// ticks so a subsystem never sees the same roll twice.
pub struct RngBank {
    master_seed: u64,
    streams:     Vec<SubsystemRng>,
}

impl RngBank {
    pub fn new(master_seed: u64) -> Self {
        let streams = SubsystemSlot::ALL
            .iter()
            .map(|slot| SubsystemRng::new(master_seed, *slot as u64).with_name(slot.name()))
            .collect();
        Self { master_seed, streams }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    pub fn for_subsystem(&mut self, slot: SubsystemSlot) -> &mut SubsystemRng {
        &mut self.streams[slot as usize]
    }
}

/// Stable subsystem slot assignments.
/// NEVER reorder or remove entries; only append.
/// Reordering changes every subsystem's seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum SubsystemSlot {
    Cycle = 0,
    Transit = 1,
    Combat = 2,
    Invasion = 3,
    Hooks = 4,
    // Add new subsystems here; append only.
}

impl SubsystemSlot {
    pub const ALL: [SubsystemSlot; 5] = [
        Self::Cycle,
        Self::Transit,
        Self::Combat,
        Self::Invasion,
        Self::Hooks,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Cycle => "cycle",
            Self::Transit => "transit",
            Self::Combat => "combat",
            Self::Invasion => "invasion",
            Self::Hooks => "hooks",
        }
    }
}

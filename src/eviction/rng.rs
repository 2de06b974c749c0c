//! Random Sources
//!
//! Injectable randomness for the Random and ARC policies. Production code
//! uses [`XorShift64`]; tests can seed it or replay fixed draws with
//! [`ScriptedSource`].

use std::fmt::Debug;

use chrono::Utc;

/// Non-zero fallback seed (golden ratio constant).
const DEFAULT_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

// == Random Source ==
/// Source of uniformly distributed numbers.
pub trait RandomSource: Send + Sync + Debug {
    /// Next raw 64-bit value.
    fn next_u64(&mut self) -> u64;

    /// Next float in `[0, 1)`.
    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Next index in `[0, len)`. `len` must be non-zero.
    fn next_index(&mut self, len: usize) -> usize {
        (self.next_u64() % len as u64) as usize
    }
}

// == XorShift64 ==
/// XorShift64 generator: fast, seedable, no system calls after seeding.
#[derive(Debug, Clone)]
pub struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    /// Creates a generator from a fixed seed (0 is replaced by a constant).
    pub fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { DEFAULT_SEED } else { seed },
        }
    }

    /// Creates a generator seeded from the wall clock.
    pub fn from_clock() -> Self {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
        Self::new(nanos ^ DEFAULT_SEED)
    }
}

impl Default for XorShift64 {
    fn default() -> Self {
        Self::from_clock()
    }
}

impl RandomSource for XorShift64 {
    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

// == Scripted Source ==
/// Replays a fixed cycle of floats in `[0, 1)`.
///
/// `next_index` maps the float onto the index range, so a draw of `0.0`
/// always picks the first slot.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    draws: Vec<f64>,
    position: usize,
}

impl ScriptedSource {
    pub fn new(draws: Vec<f64>) -> Self {
        let draws = if draws.is_empty() { vec![0.0] } else { draws };
        Self { draws, position: 0 }
    }

    fn next_draw(&mut self) -> f64 {
        let draw = self.draws[self.position % self.draws.len()];
        self.position += 1;
        draw.clamp(0.0, 1.0 - f64::EPSILON)
    }
}

impl RandomSource for ScriptedSource {
    fn next_u64(&mut self) -> u64 {
        (self.next_draw() * u64::MAX as f64) as u64
    }

    fn next_f64(&mut self) -> f64 {
        self.next_draw()
    }

    fn next_index(&mut self, len: usize) -> usize {
        ((self.next_draw() * len as f64) as usize).min(len.saturating_sub(1))
    }
}

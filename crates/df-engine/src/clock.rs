//! Audio clocks
//!
//! The scheduler reads time only through [`AudioClock`], so tests can drive it
//! with a [`ManualClock`] instead of a device.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Monotonic output-device time in seconds
pub trait AudioClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall clock, counted from creation
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Clock advanced by hand
#[derive(Default)]
pub struct ManualClock {
    /// f64 seconds stored as bits
    seconds: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(seconds: f64) -> Self {
        let clock = Self::new();
        clock.set(seconds);
        clock
    }

    pub fn set(&self, seconds: f64) {
        self.seconds.store(seconds.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: f64) {
        self.set(self.now() + seconds);
    }
}

impl AudioClock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.seconds.load(Ordering::SeqCst))
    }
}

//! Time conversions between timeline seconds and sample frames

use serde::{Deserialize, Serialize};

/// Frame position on the output timeline
///
/// Conversions from seconds always round to the nearest frame. The live
/// mixer, the offline renderer and the cue writer all place audio through
/// this type, which keeps the three paths sample-identical.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SamplePosition(pub u64);

impl SamplePosition {
    pub const ZERO: Self = Self(0);

    #[inline]
    pub fn from_seconds(seconds: f64, sample_rate: u32) -> Self {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Self::ZERO;
        }
        Self((seconds * sample_rate as f64).round() as u64)
    }

    #[inline]
    pub fn to_seconds(self, sample_rate: u32) -> f64 {
        self.0 as f64 / sample_rate as f64
    }

    #[inline]
    pub fn frames(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn advance(&mut self, frames: u64) {
        self.0 += frames;
    }
}

impl std::ops::Add<u64> for SamplePosition {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl std::ops::Sub for SamplePosition {
    type Output = u64;

    fn sub(self, rhs: Self) -> Self::Output {
        self.0.saturating_sub(rhs.0)
    }
}

/// Number of frames needed to hold `seconds` of audio
#[inline]
pub fn frames_for_duration(seconds: f64, sample_rate: u32) -> usize {
    SamplePosition::from_seconds(seconds, sample_rate).0 as usize
}

//! Silence rules
//!
//! Pure lookups over [`SilenceSettings`]. Nothing here fails: missing pairs
//! fall back to [`FALLBACK_GAP_SECONDS`] and negative values are never applied.

use df_core::{LineType, SilenceSettings};

/// Gap used when a pair has no usable configured value
pub const FALLBACK_GAP_SECONDS: f64 = 1.0;

fn non_negative(seconds: f64) -> f64 {
    if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        0.0
    }
}

/// Silence between a line of type `prev` and the following line of type `next`
pub fn gap_seconds(prev: LineType, next: LineType, settings: &SilenceSettings) -> f64 {
    settings
        .configured_gap(prev, next)
        .map(non_negative)
        .unwrap_or(FALLBACK_GAP_SECONDS)
}

pub fn start_padding(settings: &SilenceSettings) -> f64 {
    non_negative(settings.start_padding)
}

pub fn end_padding(settings: &SilenceSettings) -> f64 {
    non_negative(settings.end_padding)
}

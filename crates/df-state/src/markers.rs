//! Split markers
//!
//! Markers are split points in seconds inside a master recording. A valid set
//! is ascending, finite and strictly inside the span it splits; markers closer
//! than [`MARKER_EPSILON`] to their predecessor are the same marker.

use crate::{RealignError, RealignResult};

/// Markers closer than this are duplicates (seconds)
pub const MARKER_EPSILON: f64 = 1e-6;

/// Validate and deduplicate markers for the span `(start, end)`
pub fn normalize_markers(markers: &[f64], start: f64, end: f64) -> RealignResult<Vec<f64>> {
    let mut normalized: Vec<f64> = Vec::with_capacity(markers.len());

    for (i, &marker) in markers.iter().enumerate() {
        if !marker.is_finite() {
            return Err(RealignError::InvalidMarkers(format!(
                "marker {} is not a finite time",
                i
            )));
        }
        if marker <= start || marker >= end {
            return Err(RealignError::InvalidMarkers(format!(
                "marker {} at {:.6}s lies outside ({:.6}s, {:.6}s)",
                i, marker, start, end
            )));
        }
        if let Some(&last) = normalized.last() {
            if marker < last - MARKER_EPSILON {
                return Err(RealignError::InvalidMarkers(format!(
                    "marker {} at {:.6}s comes before {:.6}s",
                    i, marker, last
                )));
            }
            if marker - last <= MARKER_EPSILON {
                log::debug!("Dropping near-duplicate marker {:.9}s", marker);
                continue;
            }
        }
        normalized.push(marker);
    }

    Ok(normalized)
}

/// Segment spans `[from, to)` cut from `(start, end)` by normalized markers
pub fn segment_bounds(markers: &[f64], start: f64, end: f64) -> Vec<(f64, f64)> {
    let mut edges = Vec::with_capacity(markers.len() + 2);
    edges.push(start);
    edges.extend_from_slice(markers);
    edges.push(end);
    edges.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Replace the markers strictly inside `(start, end)` with `revised`
pub fn merge_window_markers(existing: &[f64], start: f64, end: f64, revised: &[f64]) -> Vec<f64> {
    let mut merged: Vec<f64> = existing
        .iter()
        .copied()
        .filter(|&m| m <= start || m >= end)
        .chain(revised.iter().copied())
        .collect();
    merged.sort_by(f64::total_cmp);
    merged.dedup_by(|b, a| (*b - *a).abs() <= MARKER_EPSILON);
    merged
}

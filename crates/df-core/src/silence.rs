//! Silence settings
//!
//! Gap durations between adjacent line types plus timeline padding.
//! Pair keys have the form `"<fromType>-to-<toType>"`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::LineType;

/// Per-project silence configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SilenceSettings {
    /// Silence before the first clip (seconds)
    pub start_padding: f64,
    /// Silence after the last clip (seconds)
    pub end_padding: f64,
    /// Gap per ordered line-type pair (seconds)
    pub pairs: BTreeMap<String, f64>,
}

impl Default for SilenceSettings {
    fn default() -> Self {
        let mut settings = Self {
            start_padding: 1.0,
            end_padding: 1.0,
            pairs: BTreeMap::new(),
        };
        for (from, to, gap) in [
            (LineType::Narration, LineType::Narration, 0.8),
            (LineType::Narration, LineType::Dialogue, 1.0),
            (LineType::Narration, LineType::Sfx, 0.5),
            (LineType::Dialogue, LineType::Narration, 1.0),
            (LineType::Dialogue, LineType::Dialogue, 0.6),
            (LineType::Dialogue, LineType::Sfx, 0.5),
            (LineType::Sfx, LineType::Narration, 0.5),
            (LineType::Sfx, LineType::Dialogue, 0.5),
            (LineType::Sfx, LineType::Sfx, 0.3),
        ] {
            settings.set_gap(from, to, gap);
        }
        settings
    }
}

impl SilenceSettings {
    /// Settings with padding and no pair entries (every pair falls back)
    pub fn empty(start_padding: f64, end_padding: f64) -> Self {
        Self {
            start_padding,
            end_padding,
            pairs: BTreeMap::new(),
        }
    }

    pub fn pair_key(from: LineType, to: LineType) -> String {
        format!("{}-to-{}", from.as_key(), to.as_key())
    }

    pub fn set_gap(&mut self, from: LineType, to: LineType, seconds: f64) {
        self.pairs.insert(Self::pair_key(from, to), seconds);
    }

    pub fn with_gap(mut self, from: LineType, to: LineType, seconds: f64) -> Self {
        self.set_gap(from, to, seconds);
        self
    }

    /// Raw configured value for a pair, if present and a finite number
    pub fn configured_gap(&self, from: LineType, to: LineType) -> Option<f64> {
        self.pairs
            .get(&Self::pair_key(from, to))
            .copied()
            .filter(|v| v.is_finite())
    }
}

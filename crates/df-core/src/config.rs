//! Studio configuration
//!
//! Persistent settings for the timeline engine:
//! - Output audio format (sample rate, channels, bit depth)
//! - Scheduler timing (tick interval, lookahead window)
//! - Export behaviour (BGM looping, per-scene dialogue tracks, cue labels)
//! - Decoded audio cache budget

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{DfError, DfResult};

/// Output sample format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitDepth {
    Int16,
    Int24,
    Float32,
}

impl BitDepth {
    pub fn bits(self) -> u16 {
        match self {
            Self::Int16 => 16,
            Self::Int24 => 24,
            Self::Float32 => 32,
        }
    }

    pub fn bytes_per_sample(self) -> u16 {
        self.bits() / 8
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::Float32)
    }
}

impl Default for BitDepth {
    fn default() -> Self {
        Self::Int16
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    pub audio: AudioConfig,
    pub playback: PlaybackConfig,
    pub export: ExportConfig,
    pub cache: CacheConfig,
}

/// Output format shared by playback and export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output sample rate (Hz)
    pub sample_rate: u32,
    /// Output channel count
    pub channels: u16,
    /// Sample format of exported WAV files
    pub bit_depth: BitDepth,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            bit_depth: BitDepth::Int16,
        }
    }
}

/// Lookahead scheduler timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Scheduler tick interval (ms)
    pub tick_interval_ms: u64,
    /// How far ahead of the playhead clips get scheduled (ms)
    pub lookahead_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            lookahead_ms: 300,
        }
    }
}

impl PlaybackConfig {
    pub fn tick_interval_secs(&self) -> f64 {
        self.tick_interval_ms as f64 / 1000.0
    }

    pub fn lookahead_secs(&self) -> f64 {
        self.lookahead_ms as f64 / 1000.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Repeat BGM items until the next BGM clip or the end of the timeline
    pub loop_bgm_until_next: bool,
    /// One dialogue track per chapter in multi-track exports
    pub split_dialogue_by_scene: bool,
    /// Prefix for cue labels ("" gives "1", "2", ...)
    pub cue_label_prefix: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            loop_bgm_until_next: true,
            split_dialogue_by_scene: false,
            cue_label_prefix: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Budget for decoded PCM kept in memory (bytes)
    pub max_decoded_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_decoded_bytes: 256 * 1024 * 1024,
        }
    }
}

impl StudioConfig {
    /// Load configuration from standard location
    pub fn load() -> Self {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from specified path, falling back to defaults
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<Self>(&content) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("Ignoring malformed config {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                log::debug!("No config at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Save configuration to specified path
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> DfResult<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Default configuration file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("dramaforge"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.json")
    }

    /// Check invariants the engine relies on
    pub fn validate(&self) -> DfResult<()> {
        if self.audio.sample_rate == 0 {
            return Err(DfError::InvalidConfig("sample rate must be positive".into()));
        }
        if self.audio.channels == 0 {
            return Err(DfError::InvalidConfig("channel count must be positive".into()));
        }
        if self.playback.tick_interval_ms == 0 {
            return Err(DfError::InvalidConfig("tick interval must be positive".into()));
        }
        if self.playback.tick_interval_ms >= self.playback.lookahead_ms {
            return Err(DfError::InvalidConfig(format!(
                "tick interval ({} ms) must be shorter than lookahead ({} ms)",
                self.playback.tick_interval_ms, self.playback.lookahead_ms
            )));
        }
        Ok(())
    }
}

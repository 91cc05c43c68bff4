//! df-offline: Offline rendering and export
//!
//! Renders the same clip list the scheduler plays:
//! - Sample-accurate mixdown (`round(start * sample_rate)` placement)
//! - Single-file WAV export with one cue point per line clip
//! - Multi-track Reaper project bundle
//!
//! ## Architecture
//!
//! ```text
//! ProjectStore ──▶ TimelineBuilder ──▶ TimelineClip[] ──┬──▶ OfflineMixRenderer ──▶ WAV + cues
//!                                                       └──▶ ReaperExporter ─────▶ .rpp + media
//! ```

mod error;
mod mixdown;
mod reaper;
mod renderer;

pub use error::*;
pub use mixdown::*;
pub use reaper::*;
pub use renderer::*;

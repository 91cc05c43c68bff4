//! df-file: Audio File I/O
//!
//! Provides the decode/encode capabilities the timeline consumes:
//! - WAV (via hound) - native, lossless
//! - FLAC, MP3, OGG Vorbis, AAC (via symphonia) - decode only
//! - Duration probing from container metadata without a full decode
//! - WAV export with embedded `cue ` / `LIST adtl` cue points
//!
//! Also handles the on-disk project directory (`project.dfproj` + `audio/`).

mod audio_file;
mod cue_wav;
mod error;
mod project;

pub use audio_file::*;
pub use cue_wav::*;
pub use error::*;
pub use project::*;

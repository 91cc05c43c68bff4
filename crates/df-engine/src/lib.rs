//! df-engine: Playback scheduling
//!
//! Plays a built timeline through an audio output ahead of real time:
//! - `AudioClock` / `AudioOutput` seams (real device, software mixer, fakes)
//! - Lookahead scheduler with seek/stop and epoch-guarded completions
//! - Playhead readout derived from the start anchor, never integrated
//! - Background driver running the scheduling tick and the readout loop
//! - Process-wide output lease
//! - Default audio device output (`device` feature)
//!
//! ## Timing
//!
//! ```text
//! timeline time = timeline_at_start + (clock.now() - clock_at_start)
//! source start  = clock_at_start + (clip.start_time - timeline_at_start)
//! ```

mod clock;
mod device;
mod driver;
mod error;
mod mixer;
mod output;
mod readout;
mod scheduler;
#[cfg(feature = "device")]
mod stream;

pub use clock::*;
pub use device::*;
pub use driver::*;
pub use error::*;
pub use mixer::*;
pub use output::*;
pub use readout::*;
pub use scheduler::*;
#[cfg(feature = "device")]
pub use stream::*;

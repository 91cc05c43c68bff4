//! df-timeline: Timeline assembly
//!
//! Turns ordered script lines into absolutely placed clips:
//! - Silence rules between adjacent line types
//! - Duration resolution (metadata probe first, full decode as fallback)
//! - Decoded PCM cache shared with playback and export
//! - Layout of line clips plus pinned SFX/BGM clips
//!
//! The resulting [`TimelineBuild`] is the single input of both the live
//! scheduler and the offline renderer.

mod builder;
mod cache;
mod error;
mod policy;
mod resolver;

pub use builder::*;
pub use cache::*;
pub use error::*;
pub use policy::*;
pub use resolver::*;

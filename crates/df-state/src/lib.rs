//! df-state: Master recording realignment
//!
//! A master recording is one long take covering several script lines. Split
//! markers cut it into segments, one per mapped line. When the markers are
//! recalibrated, the recording is re-sliced and every affected line gets its
//! new segment, in one atomic commit.
//!
//! - Marker normalization (ordering, range, near-duplicate removal)
//! - Whole-source and windowed (local) resegmentation
//! - `SegmentStore` seam with in-memory and project-directory stores

mod error;
mod markers;
mod realign;
mod store;

pub use error::*;
pub use markers::*;
pub use realign::*;
pub use store::*;

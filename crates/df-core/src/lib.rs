//! df-core: Shared types, traits, and utilities for DramaForge
//!
//! This crate provides the foundational types used across all DramaForge crates:
//! the script data model consumed by the timeline, silence settings, timeline
//! clips, the collaborator traits implemented by the project store, and the
//! studio configuration document.

mod clip;
mod collab;
mod config;
mod error;
mod script;
mod silence;
mod time;

pub use clip::*;
pub use collab::*;
pub use config::*;
pub use error::*;
pub use script::*;
pub use silence::*;
pub use time::*;

/// Tolerance used when comparing timeline positions in seconds
pub const TIME_EPSILON: f64 = 1e-6;

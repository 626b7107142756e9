//! Binary skeleton-animation (`.skel`) decoder for 2D skeletal rigs.
//!
//! The crate turns a compact, versioned byte stream into a plain,
//! serializable [`SkeletonDocument`] (bones, slots, constraints, skins and
//! attachments, animation timelines) whose serialized shape matches the JSON
//! variant of the schema. It does no IO and no playback; those live in the
//! surrounding system.

#![forbid(unsafe_code)]

pub mod binary;
mod error;
pub mod export;
mod model;
mod version;

pub use binary::{DecodeOptions, DecodeStats, Strictness};
pub use error::*;
pub use model::*;
pub use version::*;


#[cfg(test)]
mod export_tests;

//! keytrack Track
//!
//! One camera's timeline of frame records for one item.
//!
//! # Keyframes and spans
//!
//! Keyframes hold authored geometry. Every run of non-key frames strictly
//! between two keyframes of the same shape type is an interpolation span:
//! its geometry is synthesized, never authored. A keyframe of a different
//! shape type ends a span; nothing is synthesized across it.

pub mod track;
pub mod interpolate;
pub mod predict;

pub use track::*;
pub use interpolate::*;
pub use predict::*;

//! keytrack Core - Fundamental types and primitives
//!
//! This crate defines the types shared by every keytrack layer:
//! - Identifiers (InstanceId, ItemId, CameraId, CategoryId)
//! - Shape geometry and type-aware interpolation
//! - Frame records and the persisted payload records
//! - Partial snapshots and deltas (the unit of undo/redo)
//! - Per-(camera, frame) shape-order counters

pub mod id;
pub mod geometry;
pub mod frame;
pub mod record;
pub mod delta;
pub mod snapshot;
pub mod order;
pub mod error;

pub use id::*;
pub use geometry::*;
pub use frame::*;
pub use record::*;
pub use delta::*;
pub use snapshot::*;
pub use order::*;
pub use error::*;

//! keytrack State - The annotation instance tree
//!
//! This crate owns everything above a single camera track:
//! - Items (one labeled part, one track per camera)
//! - Instances (one tracked object, its items and dynamic attributes)
//! - The registry (numbering, selection, cascading deletion)
//! - Change capture into partial snapshots, and their replay
//! - Bulk load and save of the persisted records
//!
//! # Cascade
//!
//! An empty camera track is dropped by its item immediately. An item with
//! no tracks left, and an instance with no items left, are destroyed by
//! the registry's single cascade coordinator at the end of every mutation.

pub mod catalog;
pub mod item;
pub mod instance;
pub mod selection;
pub mod capture;
pub mod registry;
pub mod persist;
pub mod replay;

pub use catalog::*;
pub use item::*;
pub use instance::*;
pub use selection::*;
pub use capture::*;
pub use registry::*;
pub use persist::*;

//! keytrack Runtime - Annotation session orchestration
//!
//! A [`Session`] ties the instance registry to its change log:
//! 1. Run a registry operation
//! 2. Record the resulting delta (empty deltas are dropped)
//! 3. Notify subscribers with the touched instances
//!
//! Undo and redo replay recorded snapshots back into the registry and are
//! suppressed while a modal dialog is open or a shape is being drawn.

pub mod config;
pub mod notify;
pub mod session;

pub use config::*;
pub use notify::*;
pub use session::*;

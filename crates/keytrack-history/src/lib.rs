//! keytrack History - Undo/redo change log
//!
//! A bounded stack of (before, after) snapshot pairs with a pointer that
//! separates applied entries from redoable ones.
//!
//! # Recording
//!
//! - `push(before, after)` records a finished mutation in one step.
//! - `preserve(before)` / `save(token, after)` record an interaction that
//!   settles later. Only the most recently preserved token can be saved;
//!   older tokens belong to superseded interactions and are ignored.
//!
//! # Replay
//!
//! The log does not know what a snapshot is. Undo and redo hand the stored
//! snapshot to a [`Replay`] target that applies it.

pub mod changelog;
pub mod commit;

pub use changelog::*;
pub use commit::*;

/// Something a stored snapshot can be applied to
pub trait Replay<S> {
    /// Bring every path named by `snapshot` to the value it records
    fn replay(&mut self, snapshot: &S);
}

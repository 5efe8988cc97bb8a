//! keytrack Test Harness - Scenario fuzzing and fixtures
//!
//! This crate provides:
//! - Seeded random editing sessions with undo/redo round-trip checks
//! - Structural invariant checks over a registry
//! - Shared fixtures (sample payloads, shape builders)
//! - Tracing setup for test binaries and benches

pub mod fixtures;
pub mod fuzzer;
pub mod logging;

pub use fixtures::*;
pub use fuzzer::*;
pub use logging::*;

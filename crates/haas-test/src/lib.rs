//! Test infrastructure for the HaaS deferred networking engine
//!
//! Provides:
//! - Topology fixtures (the hammernet scenario, multi-switch queues)
//! - `RecordingDriver`: a spy switch driver with fault injection
//! - `CountingDriver`: a queue-depth oracle that fails when an applied
//!   action was not committed before the next one

pub mod drivers;
pub mod fixtures;

pub use drivers::*;
pub use fixtures::*;

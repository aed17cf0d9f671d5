//! Scenario runners.
//!
//! - [`run_serial`]: one handle, strictly sequential, one timing per call
//! - [`run_load`]: a fixed pool of OS threads, one handle each, until a deadline

mod concurrent;
mod serial;

pub use concurrent::{run_load, LoadRun, WorkerOutcome, WorkerTally};
pub use serial::{run_serial, SerialRun};

//! Execution control
//!
//! Runs one process per input under a deadline, an address-space limit and the memory monitor.

pub mod limits;
pub mod monitor;
pub mod runner;
pub mod termination;

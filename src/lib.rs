//! gradebox: a slot-pooled sandbox engine for grading untrusted programs
//!
//! A caller hands over source code, a language and a list of inputs; the engine
//! runs the program once per input and reports, per input, whether it finished,
//! timed out, ran out of memory or crashed, with its output, wall time and peak
//! resident memory.
//!
//! # Architecture
//!
//! ## Slot Pool ([`safety`])
//! - [`safety::slot_store`]: Fixed-capacity slot table with blocking acquisition
//! - [`safety::workspace`]: Per-slot source and input files
//!
//! ## Execution Control ([`exec`])
//! - [`exec::runner`]: One subprocess per input, deadline and combined output capture
//! - [`exec::monitor`]: Fixed-cadence resident memory sampling
//! - [`exec::termination`]: Process-group kill arbitration
//! - [`exec::limits`]: Address-space rlimit applied before exec
//!
//! ## Verdict ([`verdict`])
//! - [`verdict::verdict`]: Run outcome classification and aggregation
//!
//! ## Language Adapters ([`judge`])
//!
//! ## Configuration ([`config`])
//! - [`config::engine`]: Defaults, file loading and environment overrides
//! - [`config::validator`]: Startup validation
//! - [`config::types`]: Shared type definitions and closed enums
//!
//! ## Orchestration ([`grader`])

// Configuration
pub mod config;

// Slot pool
pub mod safety;

// Execution Control
pub mod exec;

// Language adapters
pub mod judge;

// Verdict
pub mod verdict;

// Utilities
pub mod utils;

// Orchestrator
pub mod grader;

// CLI entrypoint for the grader binary
pub mod cli;

// Re-export commonly used types for convenience
pub use config::types::*;
pub use grader::Grader;

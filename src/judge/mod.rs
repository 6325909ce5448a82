//! Language adapters.
//!
//! The runner stays language-agnostic. Adapters name the source file, the run
//! command and the runtime's out-of-memory signature for each language.

pub mod adapter;
pub mod languages;
pub mod registry;

//! Configuration and shared types
//!
//! Engine configuration, validation, and the closed type set shared by every module.

pub mod engine;
pub mod types;
pub mod validator;

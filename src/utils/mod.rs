//! Utilities

pub mod output;

//! Verdict classification
//!
//! Derives per-run outcomes from run evidence and folds them into the request result.

pub mod verdict;

//! Slot pool and workspaces
//!
//! Slots are reused across requests, so release always purges run artifacts.

pub mod slot_store;
pub mod workspace;

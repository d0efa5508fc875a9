// Shared types and small helpers used across the crate

pub mod logging;
pub mod tracker;
pub mod types;

//! Shared types for the Verdict execution engine and its front ends.

pub mod config;
pub mod types;

//! Utilities shared by the core and its binaries.

pub mod bootstrap;
pub mod metrics;
pub mod retry;

//! itemstream server library
//!
//! Exposes the lifecycle and logging modules for the binary and its tests.

pub mod lifecycle;
pub mod logging;

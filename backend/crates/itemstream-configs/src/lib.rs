//! itemstream-configs
//!
//! Server configuration types and loader for itemstream.

pub mod config;

pub use config::defaults;
pub use config::*;

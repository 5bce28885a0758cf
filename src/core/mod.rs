//! Core functionality: error types, configuration, and the shared data
//! structures used by the balancing and discovery subsystems.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

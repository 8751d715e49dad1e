//! Schema module - Configuration types for dispatch runs.

mod config;

pub use config::*;

//! Configuration module
//!
//! YAML configuration with per-field defaults, environment overrides and
//! validation.

pub mod types;
pub mod loader;

pub use types::*;
pub use loader::*;

//! Configuration management module
//!
//! Loading and validating engine configuration from the environment.

pub mod settings;

pub use settings::{AlertThresholds, Settings};

//! Skewer Launcher
//!
//! Loads pipeline descriptions from JSON files and runs them, and offers a
//! standalone skew analysis of `key\tvalue` files.

pub mod analyze;
pub mod config;

pub use analyze::{analyze_file, key_counts};
pub use config::{JobConfig, PipelineConfig};

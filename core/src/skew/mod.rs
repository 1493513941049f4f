//! Skew Handling
//!
//! Detects hot keys from the shuffled per-key value counts and splits their
//! groups into salted sub-groups that are reduced on several partitions and
//! merged back before the final reduce.

pub mod detector;
pub mod plan;

pub use detector::*;
pub use plan::*;

//! Task Scheduler module
//!
//! This module runs the map and reduce work of a job in parallel on a bounded
//! Rayon thread pool.

pub mod local_scheduler;

pub use local_scheduler::*;

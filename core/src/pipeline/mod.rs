//! Multi-job pipelines
//!
//! Jobs run strictly one after another. Each job's output is persisted before
//! the next one starts and the whole run is described by `run_summary.json`.

pub mod orchestrator;
pub mod state;

pub use orchestrator::*;
pub use state::*;

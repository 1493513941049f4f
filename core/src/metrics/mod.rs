//! Job counters and resource sampling
//!
//! Counters are only ever added to (or, for named gauges, set) from parallel
//! workers and read back as a consistent snapshot once a job finishes.

pub mod counters;
pub mod memory;

pub use counters::*;
pub use memory::current_rss_bytes;

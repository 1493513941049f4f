//! Core components for shuffle operations.
//!
//! The shuffle turns the pairs of every map shard into key-ordered groups and
//! decides which reduce partition each group (or salted slice of it) runs on.

pub mod combiner;
pub mod grouping;
pub mod partitioner;

pub use combiner::*;
pub use grouping::*;
pub use partitioner::*;

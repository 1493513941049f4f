//! Skewer Core - a local MapReduce engine with skew-aware reducers
//!
//! This is the core module of the Skewer project. It runs map, combine,
//! shuffle, reduce jobs over line-oriented files on a single machine, detects
//! hot keys after the shuffle and salts them across reducers, and chains jobs
//! into pipelines whose outputs feed one another.

pub mod config;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod pipeline;
pub mod scheduler;
pub mod shuffle;
pub mod skew;
pub mod source;
pub mod traits;

pub use config::{EngineConfig, FailurePolicy, InputRef, JobSpec, SkewConfig, SkewThreshold};
pub use engine::{DynJob, JobContext, JobOutput, run_job};
pub use error::{JobError, JobResult, PipelineError, RecordError, Stage};
pub use jobs::JobKind;
pub use metrics::{Counter, CounterSnapshot, Counters};
pub use pipeline::{JobRun, JobState, Pipeline, RunOutcome, RunSummary};
pub use skew::{SkewAnalysis, SkewDetector, SkewReport};
pub use traits::{Data, Emitter, Group, Key, KeyValue, MapReduceJob, OutputRecord, Record};

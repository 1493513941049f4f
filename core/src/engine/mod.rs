//! Single-job execution engine
//!
//! A job runs as map, shuffle, skew analysis, reduce, merge and finish. The
//! map and reduce phases fan out over a bounded worker pool; every other phase
//! runs on the calling thread behind a barrier.

pub mod map_phase;
pub mod reduce_phase;
pub mod runner;

use std::fmt::Debug;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{DEFAULT_MAX_DISCARD_RATE, EngineConfig, JobSpec, SkewConfig};
use crate::error::JobResult;
use crate::metrics::Counters;
use crate::skew::SkewAnalysis;
use crate::traits::{MapReduceJob, OutputRecord, Record};

pub use runner::run_job;

/// Execution settings of one job run.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub name: String,
    pub workers: usize,
    pub shard_size: usize,
    pub reducer_count: usize,
    pub combiner: bool,
    pub skew: SkewConfig,
    pub max_discard_rate: f64,
    pub counters: Arc<Counters>,
    pub cancel: CancellationToken,
}

impl JobContext {
    /// A context with engine defaults, mostly useful in tests.
    pub fn new(name: impl Into<String>) -> Self {
        let engine = EngineConfig::default();
        Self {
            name: name.into(),
            workers: engine.workers,
            shard_size: engine.shard_size,
            reducer_count: engine.default_reducer_count,
            combiner: false,
            skew: SkewConfig::default(),
            max_discard_rate: DEFAULT_MAX_DISCARD_RATE,
            counters: Arc::new(Counters::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Resolve a job spec against the engine defaults.
    pub fn for_spec(
        spec: &JobSpec,
        engine: &EngineConfig,
        counters: Arc<Counters>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            name: spec.name.clone(),
            workers: engine.workers.max(1),
            shard_size: engine.shard_size.max(1),
            reducer_count: spec.reducer_count.unwrap_or(engine.default_reducer_count).max(1),
            combiner: spec.combiner && spec.job.has_combiner(),
            skew: spec.skew.clone(),
            max_discard_rate: spec.max_discard_rate.unwrap_or(engine.max_discard_rate),
            counters,
            cancel,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_shard_size(mut self, shard_size: usize) -> Self {
        self.shard_size = shard_size.max(1);
        self
    }

    pub fn with_reducer_count(mut self, reducer_count: usize) -> Self {
        self.reducer_count = reducer_count.max(1);
        self
    }

    pub fn with_combiner(mut self, combiner: bool) -> Self {
        self.combiner = combiner;
        self
    }

    pub fn with_skew(mut self, skew: SkewConfig) -> Self {
        self.skew = skew;
        self
    }

    pub fn with_max_discard_rate(mut self, rate: f64) -> Self {
        self.max_discard_rate = rate;
        self
    }
}

/// Result of a successful job run, before it is persisted.
#[derive(Debug, Clone)]
pub struct JobOutput {
    pub records: Vec<OutputRecord>,
    pub skew: SkewAnalysis,
}

/// Object-safe view of a [`MapReduceJob`], so a pipeline can hold jobs with
/// different value and state types.
pub trait DynJob: Send + Sync + Debug {
    fn has_combiner(&self) -> bool;

    fn execute(&self, ctx: &JobContext, records: Vec<Record>) -> JobResult<JobOutput>;
}

impl<J: MapReduceJob> DynJob for J {
    fn has_combiner(&self) -> bool {
        MapReduceJob::has_combiner(self)
    }

    fn execute(&self, ctx: &JobContext, records: Vec<Record>) -> JobResult<JobOutput> {
        run_job(self, ctx, records)
    }
}

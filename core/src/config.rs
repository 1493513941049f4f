//! Engine, job and skew configuration.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::DynJob;
use crate::traits::MapReduceJob;

/// Fraction of discarded records above which a job fails.
pub const DEFAULT_MAX_DISCARD_RATE: f64 = 0.5;

/// Process-wide engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Size of the worker pool used by the map and reduce phases
    pub workers: usize,
    /// Records per map shard; shard boundaries depend only on the input
    pub shard_size: usize,
    /// Reducer count for jobs that don't set their own
    pub default_reducer_count: usize,
    /// Discard limit for jobs that don't set their own
    pub max_discard_rate: f64,
    pub failure_policy: FailurePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            shard_size: 4096,
            default_reducer_count: 4,
            max_discard_rate: DEFAULT_MAX_DISCARD_RATE,
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// What the pipeline does after a job fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failure; later jobs stay pending.
    #[default]
    FailFast,
    /// Keep going; jobs reading a failed job's output are skipped.
    BestEffort,
}

/// How the hot-key threshold is derived from the per-key value counts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkewThreshold {
    /// The p-th percentile (0..=100) of the counts, linearly interpolated
    Percentile(f64),
    /// A multiple of the mean count
    MeanMultiple(f64),
}

impl Default for SkewThreshold {
    fn default() -> Self {
        SkewThreshold::MeanMultiple(5.0)
    }
}

impl fmt::Display for SkewThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkewThreshold::Percentile(p) => write!(f, "p{p}"),
            SkewThreshold::MeanMultiple(m) => write!(f, "{m}x mean"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkewConfig {
    /// When false, keys are still analyzed but never salted
    pub enabled: bool,
    pub strategy: SkewThreshold,
    /// Keys with fewer values are never hot
    pub min_hot_count: u64,
    /// Floor on the threshold as a fraction of all values of the job
    pub min_fraction: f64,
}

impl Default for SkewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: SkewThreshold::default(),
            min_hot_count: 2,
            min_fraction: 0.01,
        }
    }
}

impl SkewConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_strategy(strategy: SkewThreshold) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self.strategy {
            SkewThreshold::Percentile(p) if !(0.0..=100.0).contains(&p) => {
                return Err(format!("skew percentile {p} is outside 0..=100"));
            }
            SkewThreshold::MeanMultiple(m) if m <= 0.0 || !m.is_finite() => {
                return Err(format!("skew mean multiple {m} must be positive"));
            }
            _ => {}
        }
        if !(0.0..=1.0).contains(&self.min_fraction) {
            return Err(format!("skew min fraction {} is outside 0..=1", self.min_fraction));
        }
        Ok(())
    }
}

/// Where a job reads its input from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputRef {
    /// Output of the job before this one, or the pipeline inputs for the first job
    Previous,
    /// Output of the named earlier job
    Job(String),
    /// A file, or a directory of files
    Path(PathBuf),
}

/// A job as scheduled by the pipeline: the job logic plus its execution settings.
///
/// Settings left unset fall back to the engine defaults when the job runs.
#[derive(Clone)]
pub struct JobSpec {
    pub name: String,
    pub job: Arc<dyn DynJob>,
    pub combiner: bool,
    pub reducer_count: Option<usize>,
    pub skew: SkewConfig,
    pub timeout: Option<Duration>,
    pub max_discard_rate: Option<f64>,
    pub inputs: Vec<InputRef>,
}

impl fmt::Debug for JobSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSpec")
            .field("name", &self.name)
            .field("job", &self.job)
            .field("combiner", &self.combiner)
            .field("reducer_count", &self.reducer_count)
            .field("skew", &self.skew)
            .field("timeout", &self.timeout)
            .field("max_discard_rate", &self.max_discard_rate)
            .field("inputs", &self.inputs)
            .finish()
    }
}

impl JobSpec {
    /// Combining is on whenever the job provides a combiner.
    pub fn new<J: MapReduceJob>(name: impl Into<String>, job: J) -> Self {
        let combiner = MapReduceJob::has_combiner(&job);
        Self::from_dyn(name, Arc::new(job), combiner)
    }

    pub fn from_dyn(name: impl Into<String>, job: Arc<dyn DynJob>, combiner: bool) -> Self {
        Self {
            name: name.into(),
            job,
            combiner,
            reducer_count: None,
            skew: SkewConfig::default(),
            timeout: None,
            max_discard_rate: None,
            inputs: vec![InputRef::Previous],
        }
    }

    pub fn with_combiner(mut self, enabled: bool) -> Self {
        self.combiner = enabled;
        self
    }

    pub fn with_reducer_count(mut self, reducers: usize) -> Self {
        self.reducer_count = Some(reducers);
        self
    }

    pub fn with_skew(mut self, skew: SkewConfig) -> Self {
        self.skew = skew;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_discard_rate(mut self, rate: f64) -> Self {
        self.max_discard_rate = Some(rate);
        self
    }

    pub fn with_inputs(mut self, inputs: Vec<InputRef>) -> Self {
        self.inputs = inputs;
        self
    }

    /// Check the settings that don't depend on the rest of the pipeline.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("job name is empty".to_string());
        }
        if self.name.contains(['/', '\\']) {
            return Err(format!("job name `{}` contains a path separator", self.name));
        }
        if self.reducer_count == Some(0) {
            return Err("reducer count must be at least 1".to_string());
        }
        if let Some(rate) = self.max_discard_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(format!("max discard rate {rate} is outside 0..=1"));
            }
        }
        self.skew.validate()?;
        if self.inputs.is_empty() {
            return Err("job has no inputs".to_string());
        }
        if self.combiner && !self.job.has_combiner() {
            tracing::warn!(job = %self.name, "combiner requested but job defines none; values pass through unchanged");
        }
        Ok(())
    }
}

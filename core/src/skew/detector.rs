//! Hot-key detection over per-key value counts.

use serde::{Deserialize, Serialize};

use crate::config::{SkewConfig, SkewThreshold};

/// Number of most frequent keys listed in the analysis.
pub const TOP_KEYS: usize = 10;

/// Verdict for one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkewReport {
    pub key: String,
    pub observed_count: u64,
    pub mean_count: f64,
    pub is_hot: bool,
    /// Number of salted sub-groups; 1 means the group is reduced whole
    pub salt_factor: usize,
}

/// Summary statistics of the per-key counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub min: u64,
    pub max: u64,
    pub median: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyCount {
    pub key: String,
    pub count: u64,
}

/// Full analysis of one job's shuffle, persisted as `<job>.skew.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkewAnalysis {
    pub job: String,
    pub enabled: bool,
    pub strategy: SkewThreshold,
    pub threshold: f64,
    pub min_hot_count: u64,
    pub min_fraction: f64,
    pub reducer_count: usize,
    pub total_values: u64,
    pub unique_keys: usize,
    pub hot_keys: Vec<String>,
    pub distribution: Distribution,
    pub top_keys: Vec<KeyCount>,
    /// One report per key, in key order
    pub reports: Vec<SkewReport>,
}

impl SkewAnalysis {
    pub fn hot_count(&self) -> usize {
        self.hot_keys.len()
    }
}

#[derive(Debug, Clone)]
pub struct SkewDetector {
    config: SkewConfig,
}

impl SkewDetector {
    pub fn new(config: SkewConfig) -> Self {
        Self { config }
    }

    /// Analyze the value count of every key.
    ///
    /// The threshold is the strategy's value, raised to at least
    /// `min_fraction` of all values. A key is hot when its count is strictly
    /// above the threshold and at least `min_hot_count`. Hot keys get a salt factor of
    /// `ceil(count / threshold)` clamped to `2..=min(reducer_count, count)`;
    /// when that range is empty the key stays whole.
    pub fn analyze<'a, I>(&self, job: &str, counts: I, reducer_count: usize) -> SkewAnalysis
    where
        I: IntoIterator<Item = (&'a str, u64)>,
    {
        let counts: Vec<(&str, u64)> = counts.into_iter().collect();
        let mut sorted: Vec<u64> = counts.iter().map(|(_, c)| *c).collect();
        sorted.sort_unstable();

        let distribution = distribution(&sorted);
        let total_values: u64 = sorted.iter().sum();
        let relative = match self.config.strategy {
            SkewThreshold::Percentile(p) => percentile(&sorted, p),
            SkewThreshold::MeanMultiple(m) => distribution.mean * m,
        };
        let threshold = relative.max(self.config.min_fraction * total_values as f64);

        let reports: Vec<SkewReport> = counts
            .iter()
            .map(|&(key, count)| {
                let is_hot = self.config.enabled
                    && count as f64 > threshold
                    && count >= self.config.min_hot_count;
                SkewReport {
                    key: key.to_string(),
                    observed_count: count,
                    mean_count: distribution.mean,
                    is_hot,
                    salt_factor: if is_hot {
                        salt_factor(count, threshold, reducer_count)
                    } else {
                        1
                    },
                }
            })
            .collect();

        let mut top: Vec<&(&str, u64)> = counts.iter().collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        let top_keys = top
            .into_iter()
            .take(TOP_KEYS)
            .map(|(key, count)| KeyCount {
                key: key.to_string(),
                count: *count,
            })
            .collect();

        SkewAnalysis {
            job: job.to_string(),
            enabled: self.config.enabled,
            strategy: self.config.strategy,
            threshold,
            min_hot_count: self.config.min_hot_count,
            min_fraction: self.config.min_fraction,
            reducer_count,
            total_values,
            unique_keys: counts.len(),
            hot_keys: reports
                .iter()
                .filter(|r| r.is_hot)
                .map(|r| r.key.clone())
                .collect(),
            distribution,
            top_keys,
            reports,
        }
    }
}

/// Salt factor of a hot key.
pub fn salt_factor(count: u64, threshold: f64, reducer_count: usize) -> usize {
    let upper = (reducer_count as u64).min(count) as usize;
    if upper < 2 {
        return 1;
    }
    let wanted = (count as f64 / threshold.max(1.0)).ceil() as usize;
    wanted.clamp(2, upper)
}

/// The `p`-th percentile of ascending `sorted`, interpolating linearly
/// between the two closest ranks. Empty input yields 0.
pub fn percentile(sorted: &[u64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = p.clamp(0.0, 100.0) / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let low = sorted[lower] as f64;
    let high = sorted[upper] as f64;
    low + (high - low) * (rank - lower as f64)
}

fn distribution(sorted: &[u64]) -> Distribution {
    if sorted.is_empty() {
        return Distribution::default();
    }
    let n = sorted.len() as f64;
    let mean = sorted.iter().sum::<u64>() as f64 / n;
    let variance = sorted
        .iter()
        .map(|&c| {
            let d = c as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    Distribution {
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        median: percentile(sorted, 50.0),
        mean,
        std_dev: variance.sqrt(),
        p90: percentile(sorted, 90.0),
        p95: percentile(sorted, 95.0),
        p99: percentile(sorted, 99.0),
    }
}

//! Trending content: items whose like+share count reaches a threshold.

use std::collections::BTreeMap;

use anyhow::Context;

use crate::error::RecordError;
use crate::metrics::Counters;
use crate::skew::percentile;
use crate::traits::{Emitter, MapReduceJob, OutputRecord, Record};

/// Percentile used when no fixed threshold is configured.
pub const DYNAMIC_PERCENTILE: f64 = 90.0;
pub const THRESHOLD_COUNTER: &str = "trending.threshold";

#[derive(Debug, Clone, Copy, Default)]
pub struct TrendingContent {
    threshold: Option<u64>,
}

impl TrendingContent {
    pub fn new(threshold: Option<u64>) -> Self {
        Self { threshold }
    }

    pub fn with_threshold(threshold: u64) -> Self {
        Self::new(Some(threshold))
    }
}

impl MapReduceJob for TrendingContent {
    type Value = u64;
    type State = BTreeMap<String, u64>;

    fn map(
        &self,
        record: &Record,
        state: &mut Self::State,
        _emitter: &mut Emitter<u64>,
    ) -> Result<(), RecordError> {
        let fields: Vec<&str> = record.line.trim().split('\t').collect();
        if fields.len() < 4 {
            return Err(RecordError::missing_fields(4, fields.len()));
        }
        let action = fields[2].to_ascii_lowercase();
        if action == "like" || action == "share" {
            *state.entry(fields[3].to_string()).or_insert(0) += 1;
        }
        Ok(())
    }

    fn flush(&self, state: Self::State, emitter: &mut Emitter<u64>) {
        for (content, engagement) in state {
            emitter.emit(content, engagement);
        }
    }

    fn has_combiner(&self) -> bool {
        true
    }

    fn combine(&self, _key: &str, values: Vec<u64>) -> Vec<u64> {
        vec![values.into_iter().sum()]
    }

    fn reduce(&self, key: &str, values: Vec<u64>, output: &mut Vec<OutputRecord>) -> anyhow::Result<()> {
        let engagement: u64 = values.into_iter().sum();
        output.push(OutputRecord::new(key, engagement.to_string()));
        Ok(())
    }

    /// Keep items at or above the threshold, most engaging first.
    fn finish(&self, records: &mut Vec<OutputRecord>, counters: &Counters) -> anyhow::Result<()> {
        let mut scored = Vec::with_capacity(records.len());
        for record in records.drain(..) {
            let engagement: u64 = record
                .value
                .parse()
                .with_context(|| format!("engagement of `{}`", record.key))?;
            scored.push((engagement, record));
        }

        let threshold = match self.threshold {
            Some(fixed) => fixed as f64,
            None => {
                let mut sorted: Vec<u64> = scored.iter().map(|(e, _)| *e).collect();
                sorted.sort_unstable();
                percentile(&sorted, DYNAMIC_PERCENTILE)
            }
        };
        counters.set_named(THRESHOLD_COUNTER, threshold as u64);

        scored.retain(|(engagement, _)| *engagement as f64 >= threshold);
        scored.sort_by(|(a_score, a), (b_score, b)| {
            b_score.cmp(a_score).then_with(|| a.key.cmp(&b.key))
        });
        records.extend(scored.into_iter().map(|(_, record)| record));
        Ok(())
    }
}

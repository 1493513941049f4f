//! Map phase: parallel mapping of input shards with in-mapper state.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::engine::JobContext;
use crate::error::{JobError, JobResult, Stage};
use crate::metrics::Counter;
use crate::scheduler::LocalScheduler;
use crate::shuffle::combine_shard;
use crate::source::shard_records;
use crate::traits::{Emitter, KeyValue, MapReduceJob, Record};

/// Output of one map shard.
#[derive(Debug)]
pub struct ShardOutput<V> {
    pub pairs: Vec<KeyValue<V>>,
    /// Values emitted per primary key, counted before the map-side combine
    pub key_counts: BTreeMap<String, u64>,
    pub read: u64,
    pub discarded: u64,
}

/// Output of the whole map phase.
#[derive(Debug)]
pub struct MapOutput<V> {
    /// Pairs of each shard, in shard order
    pub shards: Vec<Vec<KeyValue<V>>>,
    /// Values emitted per primary key across all shards, before combining
    pub key_counts: BTreeMap<String, u64>,
}

/// Map every record, then check the discard rate once all shards are done.
pub fn run_map_phase<J: MapReduceJob>(
    job: &J,
    ctx: &JobContext,
    scheduler: &LocalScheduler,
    records: Vec<Record>,
) -> JobResult<MapOutput<J::Value>> {
    let shards = shard_records(records, ctx.shard_size);
    debug!(job = %ctx.name, shards = shards.len(), "map phase started");

    let outputs = scheduler.execute_tasks(Stage::Map, shards, &ctx.cancel, |index, shard| {
        map_shard(job, ctx, index, shard)
    })?;

    let read: u64 = outputs.iter().map(|o| o.read).sum();
    let discarded: u64 = outputs.iter().map(|o| o.discarded).sum();
    check_discard_rate(discarded, read, ctx.max_discard_rate)?;

    let mut key_counts = BTreeMap::new();
    let mut shards = Vec::with_capacity(outputs.len());
    for output in outputs {
        for (key, count) in output.key_counts {
            *key_counts.entry(key).or_insert(0) += count;
        }
        shards.push(output.pairs);
    }
    Ok(MapOutput { shards, key_counts })
}

fn map_shard<J: MapReduceJob>(
    job: &J,
    ctx: &JobContext,
    index: usize,
    shard: Vec<Record>,
) -> JobResult<ShardOutput<J::Value>> {
    let mut state = J::State::default();
    let mut emitter = Emitter::new();
    let mut discarded = 0u64;

    for record in &shard {
        if ctx.cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        if let Err(err) = job.map(record, &mut state, &mut emitter) {
            discarded += 1;
            ctx.counters
                .incr_named(&format!("discarded.{}", err.reason), 1);
            trace!(
                job = %ctx.name,
                source = record.source,
                offset = record.offset,
                reason = err.reason,
                detail = %err.detail,
                "record discarded"
            );
        }
    }
    job.flush(state, &mut emitter);

    let mut pairs = emitter.into_pairs();
    ctx.counters.add(Counter::PairsEmitted, pairs.len() as u64);
    let mut key_counts: BTreeMap<String, u64> = BTreeMap::new();
    for pair in &pairs {
        match key_counts.get_mut(pair.key.primary.as_str()) {
            Some(count) => *count += 1,
            None => {
                key_counts.insert(pair.key.primary.clone(), 1);
            }
        }
    }
    if ctx.combiner {
        let before = pairs.len();
        pairs = combine_shard(job, pairs);
        ctx.counters
            .add(Counter::PairsCombinedAway, before.saturating_sub(pairs.len()) as u64);
    }
    ctx.counters.add(Counter::RecordsDiscarded, discarded);

    trace!(job = %ctx.name, shard = index, pairs = pairs.len(), discarded, "shard mapped");
    Ok(ShardOutput {
        pairs,
        key_counts,
        read: shard.len() as u64,
        discarded,
    })
}

/// Fail when strictly more than `max` of the records read were discarded.
pub fn check_discard_rate(discarded: u64, read: u64, max: f64) -> JobResult<()> {
    if read == 0 {
        return Ok(());
    }
    let rate = discarded as f64 / read as f64;
    if rate > max {
        return Err(JobError::DiscardRateExceeded {
            discarded,
            read,
            rate,
            max,
        });
    }
    Ok(())
}

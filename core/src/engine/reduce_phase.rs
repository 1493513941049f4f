//! Reduce phase: partitions run in parallel, the work units of one partition
//! run serially, and salted sub-groups are merged back after the barrier.

use std::collections::BTreeMap;

use tracing::debug;

use crate::engine::JobContext;
use crate::error::{JobError, JobResult, Stage};
use crate::metrics::Counter;
use crate::scheduler::LocalScheduler;
use crate::skew::{WorkUnit, merge_salted};
use crate::traits::{MapReduceJob, OutputRecord};

/// Result of one work unit.
#[derive(Debug)]
enum UnitResult<V> {
    Reduced {
        group: usize,
        records: Vec<OutputRecord>,
    },
    Partial {
        group: usize,
        key: String,
        salt: u32,
        values: Vec<V>,
    },
}

/// Reduce every partition and return the output in group order.
pub fn run_reduce_phase<J: MapReduceJob>(
    job: &J,
    ctx: &JobContext,
    scheduler: &LocalScheduler,
    partitions: Vec<Vec<WorkUnit<J::Value>>>,
    group_count: usize,
) -> JobResult<Vec<OutputRecord>> {
    let results = scheduler.execute_tasks(Stage::Reduce, partitions, &ctx.cancel, |partition, units| {
        reduce_partition(job, ctx, partition, units)
    })?;

    let mut reduced: Vec<Option<Vec<OutputRecord>>> = (0..group_count).map(|_| None).collect();
    let mut partials: BTreeMap<usize, (String, Vec<(u32, Vec<J::Value>)>)> = BTreeMap::new();
    for result in results.into_iter().flatten() {
        match result {
            UnitResult::Reduced { group, records } => reduced[group] = Some(records),
            UnitResult::Partial {
                group,
                key,
                salt,
                values,
            } => partials
                .entry(group)
                .or_insert_with(|| (key, Vec::new()))
                .1
                .push((salt, values)),
        }
    }

    for (group, (key, parts)) in partials {
        if ctx.cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        debug!(job = %ctx.name, key = %key, salts = parts.len(), "merging salted group");
        let merged = merge_salted(parts);
        let mut records = Vec::new();
        job.reduce(&key, merged, &mut records)
            .map_err(|e| JobError::at_key(Stage::Merge, key.as_str(), format!("{e:#}")))?;
        ctx.counters.add(Counter::ReduceGroups, 1);
        reduced[group] = Some(records);
    }

    Ok(reduced.into_iter().flatten().flatten().collect())
}

fn reduce_partition<J: MapReduceJob>(
    job: &J,
    ctx: &JobContext,
    partition: usize,
    units: Vec<WorkUnit<J::Value>>,
) -> JobResult<Vec<UnitResult<J::Value>>> {
    let mut results = Vec::with_capacity(units.len());
    for unit in units {
        if ctx.cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        let values = if ctx.combiner {
            job.combine(&unit.key, unit.values)
        } else {
            unit.values
        };
        match unit.salt {
            Some(salt) => results.push(UnitResult::Partial {
                group: unit.group,
                key: unit.key,
                salt,
                values,
            }),
            None => {
                let mut records = Vec::new();
                job.reduce(&unit.key, values, &mut records).map_err(|e| {
                    JobError::at_key(Stage::Reduce, unit.key.as_str(), format!("{e:#}"))
                })?;
                ctx.counters.add(Counter::ReduceGroups, 1);
                results.push(UnitResult::Reduced {
                    group: unit.group,
                    records,
                });
            }
        }
    }
    debug!(job = %ctx.name, partition, units = results.len(), "partition reduced");
    Ok(results)
}

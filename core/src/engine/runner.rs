//! Phase sequencing of a single job run.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::engine::map_phase::run_map_phase;
use crate::engine::reduce_phase::run_reduce_phase;
use crate::engine::{JobContext, JobOutput};
use crate::error::{JobError, JobResult, Stage};
use crate::metrics::Counter;
use crate::scheduler::LocalScheduler;
use crate::shuffle::{HashPartitioner, group_by_key};
use crate::skew::{PartitionPlan, SkewDetector};
use crate::traits::{MapReduceJob, Record};

/// Run `job` over `records` and return its ordered output.
///
/// Nothing is persisted here; a failed run leaves no trace beyond the counters.
pub fn run_job<J: MapReduceJob>(
    job: &J,
    ctx: &JobContext,
    records: Vec<Record>,
) -> JobResult<JobOutput> {
    let scheduler = LocalScheduler::new(ctx.workers)?;
    let counters = &ctx.counters;
    info!(
        job = %ctx.name,
        records = records.len(),
        workers = scheduler.num_threads(),
        reducers = ctx.reducer_count,
        combiner = ctx.combiner,
        "job started"
    );
    counters.sample_memory();

    let started = Instant::now();
    let map_output = run_map_phase(job, ctx, &scheduler, records)?;
    let (shards, key_counts) = (map_output.shards, map_output.key_counts);
    counters.record_phase(Stage::Map, started.elapsed());
    counters.sample_memory();

    let started = Instant::now();
    let pairs: usize = shards.iter().map(Vec::len).sum();
    counters.add(Counter::PairsShuffled, pairs as u64);
    let groups = scheduler.install(|| group_by_key(shards));
    counters.add(Counter::Groups, groups.len() as u64);
    counters.record_phase(Stage::Shuffle, started.elapsed());
    counters.sample_memory();
    check_cancelled(ctx)?;

    // Skew is judged on the values the mapper emitted, not on what the
    // map-side combine left of them.
    let started = Instant::now();
    let analysis = SkewDetector::new(ctx.skew.clone()).analyze(
        &ctx.name,
        groups.iter().map(|g| {
            let count = key_counts.get(&g.key).copied().unwrap_or(g.len() as u64);
            (g.key.as_str(), count)
        }),
        ctx.reducer_count,
    );
    let plan = PartitionPlan::build(
        &analysis.reports,
        &HashPartitioner::new(ctx.reducer_count as u32),
    );
    counters.add(Counter::HotKeys, analysis.hot_count() as u64);
    counters.record_phase(Stage::SkewAnalysis, started.elapsed());
    for report in analysis.reports.iter().filter(|r| r.is_hot) {
        warn!(
            job = %ctx.name,
            key = %report.key,
            count = report.observed_count,
            mean = report.mean_count,
            salts = report.salt_factor,
            "hot key detected"
        );
    }
    debug!(
        job = %ctx.name,
        threshold = analysis.threshold,
        unique_keys = analysis.unique_keys,
        "skew analysis done"
    );

    let started = Instant::now();
    let group_count = groups.len();
    let partitions = plan.distribute(groups);
    let salted = partitions.iter().flatten().filter(|unit| unit.salt.is_some()).count();
    counters.add(Counter::SaltedSubgroups, salted as u64);
    let mut output = run_reduce_phase(job, ctx, &scheduler, partitions, group_count)?;
    counters.record_phase(Stage::Reduce, started.elapsed());
    counters.sample_memory();
    check_cancelled(ctx)?;

    let started = Instant::now();
    job.finish(&mut output, counters)
        .map_err(|e| JobError::stage(Stage::Finish, format!("{e:#}")))?;
    counters.record_phase(Stage::Finish, started.elapsed());
    counters.add(Counter::RecordsEmitted, output.len() as u64);

    info!(
        job = %ctx.name,
        groups = group_count,
        hot_keys = analysis.hot_count(),
        output = output.len(),
        "job finished"
    );
    Ok(JobOutput {
        records: output,
        skew: analysis,
    })
}

fn check_cancelled(ctx: &JobContext) -> JobResult<()> {
    if ctx.cancel.is_cancelled() {
        return Err(JobError::Cancelled);
    }
    Ok(())
}

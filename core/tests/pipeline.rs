//! Integration tests for pipeline orchestration
//!
//! Covers job chaining, the discard-rate limit, timeouts and both failure
//! policies, all through `run_summary.json` and the persisted job outputs.

mod common;

use std::fs;
use std::time::Duration;

use anyhow::anyhow;
use common::*;
use skewer_core::jobs::{ActionAggregation, Cleansing, KeySum, ProfileJoin, TrendingContent, UserCount};
use skewer_core::{
    Emitter, FailurePolicy, InputRef, JobSpec, JobState, MapReduceJob, OutputRecord, Pipeline,
    Record, RecordError, RunOutcome, RunSummary, SkewAnalysis, SkewConfig, Stage,
};
use tempfile::TempDir;
use tracing_test::traced_test;

/// Sleeps on every record so that it can be timed out.
#[derive(Debug)]
struct SlowJob;

impl MapReduceJob for SlowJob {
    type Value = u64;
    type State = ();

    fn map(&self, record: &Record, _: &mut (), emitter: &mut Emitter<u64>) -> Result<(), RecordError> {
        std::thread::sleep(Duration::from_millis(20));
        emitter.emit(record.line.as_str(), 1);
        Ok(())
    }

    fn reduce(&self, key: &str, values: Vec<u64>, output: &mut Vec<OutputRecord>) -> anyhow::Result<()> {
        output.push(OutputRecord::new(key, values.len().to_string()));
        Ok(())
    }
}

/// Fails in the reducer of key `u2`.
#[derive(Debug)]
struct FailingJob;

impl MapReduceJob for FailingJob {
    type Value = u64;
    type State = ();

    fn map(&self, record: &Record, _: &mut (), emitter: &mut Emitter<u64>) -> Result<(), RecordError> {
        let (key, _) = record.line.split_once('\t').unwrap_or((record.line.as_str(), ""));
        emitter.emit(key, 1);
        Ok(())
    }

    fn reduce(&self, key: &str, _values: Vec<u64>, output: &mut Vec<OutputRecord>) -> anyhow::Result<()> {
        if key == "u2" {
            return Err(anyhow!("refusing to reduce {key}"));
        }
        output.push(OutputRecord::new(key, "ok"));
        Ok(())
    }
}

fn read_summary(dir: &std::path::Path) -> RunSummary {
    let body = fs::read_to_string(dir.join("run_summary.json")).unwrap();
    serde_json::from_str(&body).unwrap()
}

#[tokio::test]
async fn test_chained_jobs_reproduce_counts() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "events.tsv", &create_skewed_user_lines());
    let out = dir.path().join("out");

    let summary = Pipeline::new(create_test_engine(), &out)
        .with_inputs(vec![input])
        .with_job(JobSpec::new("counts", UserCount))
        .with_job(JobSpec::new("sums", KeySum))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.outcome, RunOutcome::Succeeded);
    let counts = read_output(&out.join("counts.tsv"));
    assert_eq!(counts.len(), 100);
    assert_eq!(read_output(&out.join("sums.tsv")), counts);
    assert_eq!(summary.jobs[1].inputs, vec![out.join("counts.tsv")]);
    assert_eq!(summary, read_summary(&out));
}

#[tokio::test]
async fn test_combined_job_still_salts_hot_key() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "events.tsv", &create_skewed_user_lines());

    for shard_size in [2, 4096] {
        let mut engine = create_test_engine();
        engine.shard_size = shard_size;
        let salted_dir = dir.path().join(format!("salted-{shard_size}"));
        let plain_dir = dir.path().join(format!("plain-{shard_size}"));

        let spec = JobSpec::new("counts", UserCount);
        assert!(spec.combiner);
        let salted = Pipeline::new(engine.clone(), &salted_dir)
            .with_inputs(vec![input.clone()])
            .with_job(spec)
            .run()
            .await
            .unwrap();
        let plain = Pipeline::new(engine, &plain_dir)
            .with_inputs(vec![input.clone()])
            .with_job(JobSpec::new("counts", UserCount).with_skew(SkewConfig::disabled()))
            .run()
            .await
            .unwrap();
        assert!(salted.is_success() && plain.is_success());

        let body = fs::read_to_string(salted_dir.join("counts.skew.json")).unwrap();
        let analysis: SkewAnalysis = serde_json::from_str(&body).unwrap();
        assert_eq!(analysis.hot_keys, vec!["whale"]);
        let whale = analysis.reports.iter().find(|r| r.key == "whale").unwrap();
        assert_eq!(whale.observed_count, 500);
        assert!(whale.salt_factor >= 2);
        assert_eq!(analysis.total_values, 599);

        assert_eq!(
            read_output(&salted_dir.join("counts.tsv")),
            read_output(&plain_dir.join("counts.tsv"))
        );
    }
}

#[tokio::test]
#[traced_test]
async fn test_social_media_workflow() {
    let dir = TempDir::new().unwrap();
    let logs = write_input(dir.path(), "logs.tsv", &create_activity_logs());
    let profiles = write_input(dir.path(), "profiles.csv", &create_profiles());
    let out = dir.path().join("out");

    let summary = Pipeline::new(create_test_engine(), &out)
        .with_inputs(vec![logs])
        .with_job(JobSpec::new("clean", Cleansing))
        .with_job(JobSpec::new("actions", ActionAggregation))
        .with_job(
            JobSpec::new("trending", TrendingContent::default())
                .with_inputs(vec![InputRef::Job("clean".to_string())]),
        )
        .with_job(JobSpec::new("joined", ProfileJoin).with_inputs(vec![
            InputRef::Job("actions".to_string()),
            InputRef::Path(profiles),
        ]))
        .run()
        .await
        .unwrap();

    assert!(summary.is_success());
    assert_eq!(read_output(&out.join("clean.tsv")).len(), 6);
    assert_eq!(
        read_output(&out.join("actions.tsv")),
        vec![
            "u2\tposts:2,likes:0,comments:0,shares:0",
            "u1\tposts:1,likes:1,comments:0,shares:0",
            "u3\tposts:0,likes:1,comments:0,shares:1",
        ]
    );
    assert_eq!(read_output(&out.join("trending.tsv")), vec!["c1\t2"]);
    assert_eq!(
        read_output(&out.join("joined.tsv")),
        vec![
            "u1\tu1,Ann,Oslo\tposts:1,likes:1,comments:0,shares:0",
            "u2\tu2,Bob,Rome\tpremium\tposts:2,likes:0,comments:0,shares:0",
        ]
    );

    let clean = summary.job("clean").unwrap();
    let counters = clean.counters.as_ref().unwrap();
    assert_eq!(counters.records_read, 9);
    assert_eq!(counters.records_discarded, 3);
    assert!(counters.phase_ms.contains_key(&Stage::Write));
    assert!(counters.peak_rss_bytes.is_some());
    assert_eq!(
        summary.job("trending").unwrap().counters.as_ref().unwrap().named("trending.threshold"),
        1
    );
    assert!(logs_contain("job succeeded"));
}

#[tokio::test]
async fn test_discard_rate_abort_leaves_no_output() {
    let dir = TempDir::new().unwrap();
    let mut lines: Vec<String> = (0..4)
        .map(|i| format!("2023-03-01T10:00:0{i}Z\tu{i}\tpost\tc1\t{{}}"))
        .collect();
    lines.extend((0..6).map(|i| format!("garbage {i}")));
    let input = write_input(dir.path(), "logs.tsv", &lines);
    let out = dir.path().join("out");
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("clean.tsv"), "stale\n").unwrap();

    let summary = Pipeline::new(create_test_engine(), &out)
        .with_inputs(vec![input])
        .with_job(JobSpec::new("clean", Cleansing).with_max_discard_rate(0.5))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.outcome, RunOutcome::Aborted);
    let clean = &summary.jobs[0];
    assert_eq!(clean.state, JobState::Failed);
    let failure = clean.error.as_ref().unwrap();
    assert_eq!(failure.kind, "discard_rate_exceeded");
    assert_eq!(failure.stage, Some(Stage::Map));
    assert!(clean.output.is_none());
    assert!(!out.join("clean.tsv").exists());
    assert!(out.join("run_summary.json").exists());
}

#[tokio::test]
#[traced_test]
async fn test_timeout_fails_job() {
    let dir = TempDir::new().unwrap();
    let lines: Vec<String> = (0..200).map(|i| format!("k{i}")).collect();
    let input = write_input(dir.path(), "slow.txt", &lines);
    let out = dir.path().join("out");
    let mut engine = create_test_engine();
    engine.shard_size = 1;
    engine.workers = 2;

    let summary = Pipeline::new(engine, &out)
        .with_inputs(vec![input])
        .with_job(JobSpec::new("slow", SlowJob).with_timeout(Duration::from_millis(100)))
        .run()
        .await
        .unwrap();

    let slow = &summary.jobs[0];
    assert_eq!(slow.state, JobState::Failed);
    assert_eq!(slow.error.as_ref().unwrap().kind, "timeout");
    assert!(!out.join("slow.tsv").exists());
    assert!(logs_contain("workers drained"));
}

fn policy_pipeline(out: &std::path::Path, input: std::path::PathBuf, policy: FailurePolicy) -> Pipeline {
    let mut engine = create_test_engine();
    engine.failure_policy = policy;
    Pipeline::new(engine, out)
        .with_inputs(vec![input.clone()])
        .with_job(JobSpec::new("broken", FailingJob))
        .with_job(JobSpec::new("downstream", UserCount))
        .with_job(JobSpec::new("independent", UserCount).with_inputs(vec![InputRef::Path(input)]))
}

#[tokio::test]
async fn test_best_effort_skips_dependents_only() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "in.tsv", &["u1\ta", "u2\tb", "u3\tc"]);
    let out = dir.path().join("out");

    let summary = policy_pipeline(&out, input, FailurePolicy::BestEffort)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.outcome, RunOutcome::Failed);
    let states: Vec<_> = summary.jobs.iter().map(|job| job.state).collect();
    assert_eq!(states, vec![JobState::Failed, JobState::Skipped, JobState::Succeeded]);
    assert_eq!(summary.jobs[0].error.as_ref().unwrap().stage, Some(Stage::Reduce));
    assert_eq!(summary.jobs[1].skipped_because.as_deref(), Some("broken"));
    assert_eq!(
        read_output(&out.join("independent.tsv")),
        vec!["u1\t1", "u2\t1", "u3\t1"]
    );
}

#[tokio::test]
async fn test_fail_fast_aborts_remaining_jobs() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "in.tsv", &["u1\ta", "u2\tb", "u3\tc"]);
    let out = dir.path().join("out");

    let summary = policy_pipeline(&out, input, FailurePolicy::FailFast)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.outcome, RunOutcome::Aborted);
    let states: Vec<_> = summary.jobs.iter().map(|job| job.state).collect();
    assert_eq!(states, vec![JobState::Failed, JobState::Pending, JobState::Pending]);
    assert!(!out.join("independent.tsv").exists());
    assert_eq!(read_summary(&out).outcome, RunOutcome::Aborted);
}

#[tokio::test]
async fn test_missing_input_fails_read_stage() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");

    let summary = Pipeline::new(create_test_engine(), &out)
        .with_inputs(vec![dir.path().join("absent.tsv")])
        .with_job(JobSpec::new("counts", UserCount))
        .run()
        .await
        .unwrap();

    let failure = summary.jobs[0].error.as_ref().unwrap();
    assert_eq!(failure.stage, Some(Stage::Read));
}

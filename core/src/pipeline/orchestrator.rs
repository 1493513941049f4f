//! Sequential job orchestration with failure policies and timeouts.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use skewer_common::{CommonError, remove_file_if_exists, write_json_atomic, write_lines_atomic};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{EngineConfig, FailurePolicy, InputRef, JobSpec};
use crate::engine::{JobContext, JobOutput};
use crate::error::{JobError, JobResult, PipelineError, Stage};
use crate::metrics::Counters;
use crate::pipeline::state::{JobState, PipelineState, RunOutcome, RunSummary};
use crate::source::RecordSource;

pub const SUMMARY_FILE: &str = "run_summary.json";

/// How long a timed-out job's workers get to reach a cancellation check.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// An ordered list of jobs sharing one engine configuration and output directory.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: EngineConfig,
    inputs: Vec<PathBuf>,
    output_dir: PathBuf,
    jobs: Vec<JobSpec>,
}

impl Pipeline {
    pub fn new(config: EngineConfig, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            inputs: Vec::new(),
            output_dir: output_dir.into(),
            jobs: Vec::new(),
        }
    }

    /// Paths read by the first job's `Previous` input.
    pub fn with_inputs(mut self, inputs: Vec<PathBuf>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_job(mut self, spec: JobSpec) -> Self {
        self.jobs.push(spec);
        self
    }

    pub fn add_job(&mut self, spec: JobSpec) -> &mut Self {
        self.jobs.push(spec);
        self
    }

    pub fn jobs(&self) -> &[JobSpec] {
        &self.jobs
    }

    pub fn output_path(&self, job: &str) -> PathBuf {
        self.output_dir.join(format!("{job}.tsv"))
    }

    pub fn skew_report_path(&self, job: &str) -> PathBuf {
        self.output_dir.join(format!("{job}.skew.json"))
    }

    pub fn summary_path(&self) -> PathBuf {
        self.output_dir.join(SUMMARY_FILE)
    }

    /// Reject pipelines that can't be run as described.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.jobs.is_empty() {
            return Err(PipelineError::Empty);
        }
        for (index, spec) in self.jobs.iter().enumerate() {
            spec.validate().map_err(|reason| PipelineError::InvalidJob {
                job: spec.name.clone(),
                reason,
            })?;
            let earlier = &self.jobs[..index];
            if earlier.iter().any(|other| other.name == spec.name) {
                return Err(PipelineError::DuplicateJob(spec.name.clone()));
            }
            for input in &spec.inputs {
                match input {
                    InputRef::Previous if index == 0 && self.inputs.is_empty() => {
                        return Err(PipelineError::MissingInput(spec.name.clone()));
                    }
                    InputRef::Job(name) if !earlier.iter().any(|other| &other.name == name) => {
                        return Err(PipelineError::UnknownInput {
                            job: spec.name.clone(),
                            input: name.clone(),
                        });
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Run every job in order and write `run_summary.json`.
    ///
    /// Job failures are reported in the summary, not as an `Err`; an `Err`
    /// means the pipeline was rejected or its summary could not be written.
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        self.validate()?;
        skewer_common::ensure_dir_exists(&self.output_dir)?;

        let run_id = Uuid::new_v4();
        let started_at_ms = chrono::Utc::now().timestamp_millis();
        let started = Instant::now();
        let counters = Arc::new(Counters::new());
        let mut state = PipelineState::new(self.jobs.iter().map(|spec| spec.name.as_str()));
        let mut aborted = false;

        info!(%run_id, jobs = self.jobs.len(), policy = ?self.config.failure_policy, "pipeline started");

        for (index, spec) in self.jobs.iter().enumerate() {
            let inputs = match self.resolve_inputs(index, &state) {
                Ok(inputs) => inputs,
                Err(upstream) => {
                    warn!(job = %spec.name, upstream = %upstream, "job skipped, upstream did not succeed");
                    state.skip(index, upstream);
                    continue;
                }
            };

            state.start(index, inputs.clone());
            counters.reset();
            info!(job = %spec.name, inputs = ?inputs, "job running");

            let result = match self.execute(spec, inputs, Arc::clone(&counters)).await {
                Ok(output) => self.persist(spec, &output, &counters),
                Err(err) => Err(err),
            };
            match result {
                Ok((output, skew_report)) => {
                    info!(job = %spec.name, output = %output.display(), "job succeeded");
                    state.succeed(index, output, skew_report, counters.snapshot());
                }
                Err(err) => {
                    error!(job = %spec.name, stage = ?err.failed_stage(), error = %err, "job failed");
                    state.fail(index, &err, counters.snapshot());
                    if self.config.failure_policy == FailurePolicy::FailFast {
                        aborted = true;
                        break;
                    }
                }
            }
        }

        let runs = state.into_runs();
        let outcome = if aborted {
            RunOutcome::Aborted
        } else if runs.iter().all(|run| run.state == JobState::Succeeded) {
            RunOutcome::Succeeded
        } else {
            RunOutcome::Failed
        };
        let summary = RunSummary {
            run_id,
            outcome,
            started_at_ms,
            elapsed_ms: started.elapsed().as_millis() as u64,
            output_dir: self.output_dir.clone(),
            jobs: runs,
        };
        write_json_atomic(self.summary_path(), &summary)?;
        info!(%run_id, outcome = ?summary.outcome, elapsed_ms = summary.elapsed_ms, "pipeline finished");
        Ok(summary)
    }

    /// Input paths of job `index`, or the name of the upstream job that
    /// did not succeed.
    fn resolve_inputs(&self, index: usize, state: &PipelineState) -> Result<Vec<PathBuf>, String> {
        let mut paths = Vec::new();
        for input in &self.jobs[index].inputs {
            let upstream = match input {
                InputRef::Path(path) => {
                    paths.push(path.clone());
                    continue;
                }
                InputRef::Previous if index == 0 => {
                    paths.extend(self.inputs.iter().cloned());
                    continue;
                }
                InputRef::Previous => index - 1,
                InputRef::Job(name) => state.position(name).ok_or_else(|| name.clone())?,
            };
            match state.get(upstream) {
                Some(run) if run.state == JobState::Succeeded => {
                    paths.push(self.output_path(&run.name));
                }
                _ => return Err(self.jobs[upstream].name.clone()),
            }
        }
        Ok(paths)
    }

    /// Read and run one job on the blocking pool, enforcing its timeout.
    async fn execute(
        &self,
        spec: &JobSpec,
        inputs: Vec<PathBuf>,
        counters: Arc<Counters>,
    ) -> JobResult<JobOutput> {
        remove_file_if_exists(self.output_path(&spec.name))?;
        remove_file_if_exists(self.skew_report_path(&spec.name))?;

        let cancel = CancellationToken::new();
        let ctx = JobContext::for_spec(spec, &self.config, counters, cancel.clone());
        let job = Arc::clone(&spec.job);
        let source = RecordSource::new(inputs);

        let mut handle = tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            let records = source.read(&ctx.counters)?;
            ctx.counters.record_phase(Stage::Read, started.elapsed());
            job.execute(&ctx, records)
        });

        let joined = match spec.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(job = %spec.name, timeout = ?limit, "job timed out, cancelling workers");
                    cancel.cancel();
                    match tokio::time::timeout(DRAIN_GRACE, handle).await {
                        Ok(Ok(_)) => debug!(job = %spec.name, "workers drained"),
                        Ok(Err(e)) => {
                            warn!(job = %spec.name, error = %e, "job task failed while draining")
                        }
                        Err(_) => warn!(
                            job = %spec.name,
                            grace = ?DRAIN_GRACE,
                            "workers still running after cancellation, detaching"
                        ),
                    }
                    return Err(JobError::Timeout(limit));
                }
            },
            None => handle.await,
        };
        joined.map_err(|e| {
            JobError::Io(CommonError::internal_error_with_source("job task did not complete", e))
        })?
    }

    /// Write the job output and its skew analysis.
    fn persist(
        &self,
        spec: &JobSpec,
        output: &JobOutput,
        counters: &Counters,
    ) -> JobResult<(PathBuf, PathBuf)> {
        let started = Instant::now();
        let output_path = self.output_path(&spec.name);
        let skew_path = self.skew_report_path(&spec.name);

        write_lines_atomic(&output_path, output.records.iter().map(|r| r.to_line()))?;
        if let Err(e) = write_json_atomic(&skew_path, &output.skew) {
            // a job output never stands without its skew report
            remove_file_if_exists(&output_path)?;
            return Err(e.into());
        }
        counters.record_phase(Stage::Write, started.elapsed());
        Ok((output_path, skew_path))
    }
}

//! Job lifecycle bookkeeping and the run summary document.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{JobError, Stage};
use crate::metrics::CounterSnapshot;

/// Lifecycle of a job within a run.
///
/// `Pending -> Running -> {Succeeded, Failed}`, or `Pending -> Skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed | JobState::Skipped)
    }
}

/// Why a job failed, as recorded in the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub stage: Option<Stage>,
    pub kind: String,
    pub message: String,
}

impl From<&JobError> for JobFailure {
    fn from(err: &JobError) -> Self {
        Self {
            stage: err.failed_stage(),
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// One job entry of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRun {
    pub name: String,
    pub state: JobState,
    pub inputs: Vec<PathBuf>,
    pub output: Option<PathBuf>,
    pub skew_report: Option<PathBuf>,
    pub counters: Option<CounterSnapshot>,
    pub error: Option<JobFailure>,
    /// Upstream job whose failure caused this job to be skipped
    pub skipped_because: Option<String>,
}

impl JobRun {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: JobState::Pending,
            inputs: Vec::new(),
            output: None,
            skew_report: None,
            counters: None,
            error: None,
            skipped_because: None,
        }
    }
}

/// Ordered job entries of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineState {
    runs: Vec<JobRun>,
}

impl PipelineState {
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            runs: names.into_iter().map(JobRun::pending).collect(),
        }
    }

    pub fn runs(&self) -> &[JobRun] {
        &self.runs
    }

    pub fn get(&self, index: usize) -> Option<&JobRun> {
        self.runs.get(index)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.runs.iter().position(|run| run.name == name)
    }

    pub fn start(&mut self, index: usize, inputs: Vec<PathBuf>) {
        let run = &mut self.runs[index];
        run.state = JobState::Running;
        run.inputs = inputs;
    }

    pub fn succeed(
        &mut self,
        index: usize,
        output: PathBuf,
        skew_report: PathBuf,
        counters: CounterSnapshot,
    ) {
        let run = &mut self.runs[index];
        run.state = JobState::Succeeded;
        run.output = Some(output);
        run.skew_report = Some(skew_report);
        run.counters = Some(counters);
    }

    pub fn fail(&mut self, index: usize, err: &JobError, counters: CounterSnapshot) {
        let run = &mut self.runs[index];
        run.state = JobState::Failed;
        run.error = Some(JobFailure::from(err));
        run.counters = Some(counters);
    }

    pub fn skip(&mut self, index: usize, because: impl Into<String>) {
        let run = &mut self.runs[index];
        run.state = JobState::Skipped;
        run.skipped_because = Some(because.into());
    }

    pub fn into_runs(self) -> Vec<JobRun> {
        self.runs
    }
}

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every job succeeded
    Succeeded,
    /// The run went through every job but some failed or were skipped
    Failed,
    /// The run stopped at the first failure
    Aborted,
}

/// Contents of `run_summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    pub started_at_ms: i64,
    pub elapsed_ms: u64,
    pub output_dir: PathBuf,
    pub jobs: Vec<JobRun>,
}

impl RunSummary {
    pub fn job(&self, name: &str) -> Option<&JobRun> {
        self.jobs.iter().find(|job| job.name == name)
    }

    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        let mut state = PipelineState::new(["clean", "count"]);
        assert_eq!(state.position("count"), Some(1));

        state.start(0, vec![PathBuf::from("in.tsv")]);
        assert_eq!(state.get(0).unwrap().state, JobState::Running);

        state.fail(0, &JobError::Cancelled, CounterSnapshot::default());
        state.skip(1, "clean");

        let runs = state.into_runs();
        assert_eq!(runs[0].state, JobState::Failed);
        assert_eq!(runs[0].error.as_ref().unwrap().kind, "cancelled");
        assert_eq!(runs[1].skipped_because.as_deref(), Some("clean"));
        assert!(runs.iter().all(|run| run.state.is_terminal()));
    }

    #[test]
    fn test_failure_records_stage() {
        let err = JobError::at_key(Stage::Reduce, "u1", "boom");
        let failure = JobFailure::from(&err);
        assert_eq!(failure.stage, Some(Stage::Reduce));
        assert!(failure.message.contains("u1"));
    }

    #[test]
    fn test_summary_json_shape() {
        let summary = RunSummary {
            run_id: Uuid::new_v4(),
            outcome: RunOutcome::Aborted,
            started_at_ms: 0,
            elapsed_ms: 3,
            output_dir: PathBuf::from("out"),
            jobs: vec![JobRun::pending("clean")],
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["outcome"], "aborted");
        assert_eq!(json["jobs"][0]["state"], "pending");
    }
}

//! Error types for job execution and pipeline orchestration

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use skewer_common::CommonError;
use thiserror::Error;

/// Phase of a job in which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Read,
    Map,
    Shuffle,
    SkewAnalysis,
    Reduce,
    Merge,
    Finish,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Read => "read",
            Stage::Map => "map",
            Stage::Shuffle => "shuffle",
            Stage::SkewAnalysis => "skew_analysis",
            Stage::Reduce => "reduce",
            Stage::Merge => "merge",
            Stage::Finish => "finish",
            Stage::Write => "write",
        };
        f.write_str(name)
    }
}

/// A recoverable per-record failure. The record is dropped and counted under
/// `discarded.<reason>`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}: {detail}")]
pub struct RecordError {
    pub reason: &'static str,
    pub detail: String,
}

impl RecordError {
    pub fn new(reason: &'static str, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }

    pub fn missing_fields(expected: usize, found: usize) -> Self {
        Self::new(
            "missing_fields",
            format!("expected at least {expected} fields, found {found}"),
        )
    }
}

/// Errors that fail a whole job.
#[derive(Error, Debug)]
pub enum JobError {
    #[error(
        "discard rate {rate:.3} exceeds limit {max:.3} ({discarded} of {read} records dropped)"
    )]
    DiscardRateExceeded {
        discarded: u64,
        read: u64,
        rate: f64,
        max: f64,
    },

    #[error("{stage} failed{location}: {message}", location = describe_location(.key, .offset))]
    Stage {
        stage: Stage,
        key: Option<String>,
        offset: Option<u64>,
        message: String,
    },

    #[error("artifact i/o failed: {0}")]
    Io(#[from] CommonError),

    #[error("job exceeded its timeout of {0:?}")]
    Timeout(Duration),

    #[error("job was cancelled")]
    Cancelled,
}

fn describe_location(key: &Option<String>, offset: &Option<u64>) -> String {
    match (key, offset) {
        (Some(key), Some(offset)) => format!(" at key `{key}`, offset {offset}"),
        (Some(key), None) => format!(" at key `{key}`"),
        (None, Some(offset)) => format!(" at offset {offset}"),
        (None, None) => String::new(),
    }
}

impl JobError {
    pub fn stage(stage: Stage, message: impl Into<String>) -> Self {
        JobError::Stage {
            stage,
            key: None,
            offset: None,
            message: message.into(),
        }
    }

    pub fn at_key(stage: Stage, key: impl Into<String>, message: impl Into<String>) -> Self {
        JobError::Stage {
            stage,
            key: Some(key.into()),
            offset: None,
            message: message.into(),
        }
    }

    /// Stage this error is attributed to, if any.
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            JobError::DiscardRateExceeded { .. } => Some(Stage::Map),
            JobError::Stage { stage, .. } => Some(*stage),
            JobError::Io(_) => Some(Stage::Write),
            JobError::Timeout(_) | JobError::Cancelled => None,
        }
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::DiscardRateExceeded { .. } => "discard_rate_exceeded",
            JobError::Stage { .. } => "stage_failed",
            JobError::Io(_) => "io",
            JobError::Timeout(_) => "timeout",
            JobError::Cancelled => "cancelled",
        }
    }
}

/// Errors that reject a pipeline before any job runs, or that prevent the
/// run summary from being persisted.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("pipeline has no jobs")]
    Empty,

    #[error("duplicate job name `{0}`")]
    DuplicateJob(String),

    #[error("job `{job}` reads from `{input}`, which is not an earlier job in the pipeline")]
    UnknownInput { job: String, input: String },

    #[error("job `{0}` reads the pipeline input but no input paths were given")]
    MissingInput(String),

    #[error("job `{job}` is misconfigured: {reason}")]
    InvalidJob { job: String, reason: String },

    #[error(transparent)]
    Io(#[from] CommonError),
}

pub type JobResult<T> = std::result::Result<T, JobError>;

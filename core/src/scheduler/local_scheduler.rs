//! Local Task Scheduler
//!
//! This module provides a local task scheduler that uses a dedicated Rayon
//! thread pool to execute map shards and reduce partitions in parallel on a
//! single machine.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use rayon::prelude::*;
use skewer_common::CommonError;
use tokio_util::sync::CancellationToken;

use crate::error::{JobError, JobResult, Stage};

/// LocalScheduler owns the worker pool of one job
#[derive(Debug)]
pub struct LocalScheduler {
    pool: rayon::ThreadPool,
    num_threads: usize,
}

impl LocalScheduler {
    /// Create a new LocalScheduler with the specified number of threads
    pub fn new(num_threads: usize) -> JobResult<Self> {
        let num_threads = num_threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("skewer-worker-{i}"))
            .build()
            .map_err(|e| {
                JobError::Io(CommonError::internal_error_with_source(
                    "building worker pool",
                    e,
                ))
            })?;
        Ok(Self { pool, num_threads })
    }

    /// Get the number of threads
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Run `op` inside the pool so nested parallel iterators use its threads.
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        self.pool.install(op)
    }

    /// Execute one task per item in parallel, returning results in item order.
    ///
    /// Every task first checks `cancel`. A panicking task is turned into a
    /// failure of `stage` instead of unwinding through the pool.
    pub fn execute_tasks<I, T, F>(
        &self,
        stage: Stage,
        items: Vec<I>,
        cancel: &CancellationToken,
        task: F,
    ) -> JobResult<Vec<T>>
    where
        I: Send,
        T: Send,
        F: Fn(usize, I) -> JobResult<T> + Send + Sync,
    {
        self.pool.install(|| {
            items
                .into_par_iter()
                .enumerate()
                .map(|(index, item)| {
                    if cancel.is_cancelled() {
                        return Err(JobError::Cancelled);
                    }
                    match catch_unwind(AssertUnwindSafe(|| task(index, item))) {
                        Ok(result) => result,
                        Err(payload) => Err(JobError::stage(
                            stage,
                            format!("worker {index} panicked: {}", panic_message(&payload)),
                        )),
                    }
                })
                .collect()
        })
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

//! Record sources and map-side sharding

use std::path::PathBuf;

use skewer_common::{list_input_files, read_lines};
use tracing::debug;

use crate::error::{JobError, Stage};
use crate::metrics::{Counter, Counters};
use crate::traits::Record;

/// The resolved inputs of one job. Input `i` produces records with `source == i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSource {
    inputs: Vec<PathBuf>,
}

impl RecordSource {
    pub fn new(inputs: Vec<PathBuf>) -> Self {
        Self { inputs }
    }

    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    /// Read every non-empty line of every input, in input order.
    ///
    /// A directory input contributes its files in file-name order and offsets
    /// continue across those files.
    pub fn read(&self, counters: &Counters) -> Result<Vec<Record>, JobError> {
        let mut records = Vec::new();
        for (source, input) in self.inputs.iter().enumerate() {
            let files = list_input_files(input).map_err(|e| read_error(input, e))?;
            let mut offset = 0u64;
            for file in files {
                let lines = read_lines(&file).map_err(|e| read_error(&file, e))?;
                debug!(path = %file.display(), lines = lines.len(), "input read");
                for line in lines {
                    records.push(Record::new(source, offset, line));
                    offset += 1;
                }
            }
        }
        counters.add(Counter::RecordsRead, records.len() as u64);
        Ok(records)
    }
}

fn read_error(path: &std::path::Path, err: skewer_common::CommonError) -> JobError {
    JobError::stage(Stage::Read, format!("{}: {err}", path.display()))
}

/// Split records into contiguous shards of at most `shard_size` records.
pub fn shard_records(records: Vec<Record>, shard_size: usize) -> Vec<Vec<Record>> {
    let shard_size = shard_size.max(1);
    let mut shards = Vec::with_capacity(records.len().div_ceil(shard_size));
    let mut current = Vec::with_capacity(shard_size.min(records.len()));
    for record in records {
        current.push(record);
        if current.len() == shard_size {
            shards.push(std::mem::replace(&mut current, Vec::with_capacity(shard_size)));
        }
    }
    if !current.is_empty() {
        shards.push(current);
    }
    shards
}

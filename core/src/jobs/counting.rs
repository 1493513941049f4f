//! Per-key counting and summing over `key\tvalue` lines.

use skewer_common::split_kv;

use crate::error::RecordError;
use crate::traits::{Emitter, MapReduceJob, OutputRecord, Record};

/// Counts the lines of every key.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserCount;

/// Sums the numeric value of every key.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeySum;

fn key_of(record: &Record) -> Result<(&str, &str), RecordError> {
    let (key, value) = split_kv(record.line.trim_end());
    if key.is_empty() {
        return Err(RecordError::missing_fields(1, 0));
    }
    Ok((key, value))
}

fn sum(values: Vec<u64>) -> Vec<u64> {
    vec![values.into_iter().sum()]
}

impl MapReduceJob for UserCount {
    type Value = u64;
    type State = ();

    fn map(&self, record: &Record, _: &mut (), emitter: &mut Emitter<u64>) -> Result<(), RecordError> {
        let (key, _) = key_of(record)?;
        emitter.emit(key, 1);
        Ok(())
    }

    fn has_combiner(&self) -> bool {
        true
    }

    fn combine(&self, _key: &str, values: Vec<u64>) -> Vec<u64> {
        sum(values)
    }

    fn reduce(&self, key: &str, values: Vec<u64>, output: &mut Vec<OutputRecord>) -> anyhow::Result<()> {
        let total: u64 = values.into_iter().sum();
        output.push(OutputRecord::new(key, total.to_string()));
        Ok(())
    }
}

impl MapReduceJob for KeySum {
    type Value = u64;
    type State = ();

    fn map(&self, record: &Record, _: &mut (), emitter: &mut Emitter<u64>) -> Result<(), RecordError> {
        let (key, value) = key_of(record)?;
        let value = value
            .trim()
            .parse::<u64>()
            .map_err(|e| RecordError::new("invalid_number", format!("`{value}`: {e}")))?;
        emitter.emit(key, value);
        Ok(())
    }

    fn has_combiner(&self) -> bool {
        true
    }

    fn combine(&self, _key: &str, values: Vec<u64>) -> Vec<u64> {
        sum(values)
    }

    fn reduce(&self, key: &str, values: Vec<u64>, output: &mut Vec<OutputRecord>) -> anyhow::Result<()> {
        let total: u64 = values.into_iter().sum();
        output.push(OutputRecord::new(key, total.to_string()));
        Ok(())
    }
}

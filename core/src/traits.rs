//! Core traits and data model for the skewer engine
//!
//! This module defines the records flowing through a job and the capability
//! interface (`MapReduceJob`) every job implements.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::error::RecordError;
use crate::metrics::Counters;

/// A data type that can be used as a shuffled value.
pub trait Data:
    Send + Sync + Clone + Debug + Serialize + for<'de> Deserialize<'de> + 'static
{
}
impl<T> Data for T where
    T: Send + Sync + Clone + Debug + Serialize + for<'de> Deserialize<'de> + 'static
{
}

/// One line of job input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Index of the job input this line was read from
    pub source: usize,
    /// Zero-based line number within that input
    pub offset: u64,
    pub line: String,
}

impl Record {
    pub fn new(source: usize, offset: u64, line: impl Into<String>) -> Self {
        Self {
            source,
            offset,
            line: line.into(),
        }
    }
}

/// Composite shuffle key.
///
/// Pairs are grouped by `primary`; within a group values are ordered by
/// `secondary` and then by arrival. `None` sorts before any secondary value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key {
    pub primary: String,
    pub secondary: Option<String>,
}

impl Key {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: None,
        }
    }

    pub fn with_secondary(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: Some(secondary.into()),
        }
    }
}

impl From<&str> for Key {
    fn from(primary: &str) -> Self {
        Key::new(primary)
    }
}

impl From<String> for Key {
    fn from(primary: String) -> Self {
        Key::new(primary)
    }
}

/// A key-value pair emitted by a mapper.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValue<V> {
    pub key: Key,
    pub value: V,
}

/// All values sharing a primary key, in shuffle order.
#[derive(Debug, Clone, PartialEq)]
pub struct Group<V> {
    pub key: String,
    pub values: Vec<V>,
}

impl<V> Group<V> {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A line of job output, persisted as `key\tvalue`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub key: String,
    pub value: String,
}

impl OutputRecord {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn to_line(&self) -> String {
        skewer_common::format_kv(&self.key, &self.value)
    }
}

/// Collects the pairs one map worker emits.
#[derive(Debug)]
pub struct Emitter<V> {
    pairs: Vec<KeyValue<V>>,
}

impl<V> Default for Emitter<V> {
    fn default() -> Self {
        Self { pairs: Vec::new() }
    }
}

impl<V> Emitter<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, key: impl Into<Key>, value: V) {
        self.pairs.push(KeyValue {
            key: key.into(),
            value,
        });
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn into_pairs(self) -> Vec<KeyValue<V>> {
        self.pairs
    }
}

/// Map, combine and reduce logic of one job.
///
/// `State` is the in-mapper combining accumulator: each map worker owns one
/// instance for its shard, threads it through every `map` call and hands it to
/// `flush` exactly once after the last record.
///
/// `combine` must be an associative and commutative pre-aggregation: for any
/// split of a group's values into contiguous chunks, reducing the concatenated
/// combined chunks must give the same output as reducing the raw values.
pub trait MapReduceJob: Send + Sync + Debug + 'static {
    type Value: Data;
    type State: Default + Send;

    /// Map one record. An error drops the record and counts it as discarded.
    fn map(
        &self,
        record: &Record,
        state: &mut Self::State,
        emitter: &mut Emitter<Self::Value>,
    ) -> Result<(), RecordError>;

    /// Emit whatever the accumulator still holds at end of shard.
    fn flush(&self, _state: Self::State, _emitter: &mut Emitter<Self::Value>) {}

    fn has_combiner(&self) -> bool {
        false
    }

    fn combine(&self, _key: &str, values: Vec<Self::Value>) -> Vec<Self::Value> {
        values
    }

    /// Reduce one fully materialized group.
    fn reduce(
        &self,
        key: &str,
        values: Vec<Self::Value>,
        output: &mut Vec<OutputRecord>,
    ) -> anyhow::Result<()>;

    /// Impose the externally visible order of the job output.
    ///
    /// Records arrive sorted by key. Jobs that rank or filter their output
    /// across keys do it here.
    fn finish(&self, _records: &mut Vec<OutputRecord>, _counters: &Counters) -> anyhow::Result<()> {
        Ok(())
    }
}

//! Per-job counters
//!
//! Like MapReduce counters, these are only added to through an associative and
//! commutative operation, so map and reduce workers update them concurrently
//! without coordination.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::Stage;
use crate::metrics::memory::current_rss_bytes;

/// Built-in counters every job maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    RecordsRead,
    RecordsDiscarded,
    PairsEmitted,
    PairsCombinedAway,
    PairsShuffled,
    Groups,
    HotKeys,
    SaltedSubgroups,
    ReduceGroups,
    RecordsEmitted,
}

impl Counter {
    pub const ALL: [Counter; 10] = [
        Counter::RecordsRead,
        Counter::RecordsDiscarded,
        Counter::PairsEmitted,
        Counter::PairsCombinedAway,
        Counter::PairsShuffled,
        Counter::Groups,
        Counter::HotKeys,
        Counter::SaltedSubgroups,
        Counter::ReduceGroups,
        Counter::RecordsEmitted,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Counter::RecordsRead => "records_read",
            Counter::RecordsDiscarded => "records_discarded",
            Counter::PairsEmitted => "pairs_emitted",
            Counter::PairsCombinedAway => "pairs_combined_away",
            Counter::PairsShuffled => "pairs_shuffled",
            Counter::Groups => "groups",
            Counter::HotKeys => "hot_keys",
            Counter::SaltedSubgroups => "salted_subgroups",
            Counter::ReduceGroups => "reduce_groups",
            Counter::RecordsEmitted => "records_emitted",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Counter registry of one job run.
#[derive(Debug)]
pub struct Counters {
    values: [AtomicU64; Counter::ALL.len()],
    named: Mutex<BTreeMap<String, u64>>,
    phases: Mutex<BTreeMap<Stage, u64>>,
    started: Mutex<Instant>,
    peak_rss: AtomicU64,
}

impl Default for Counters {
    fn default() -> Self {
        Self::new()
    }
}

impl Counters {
    pub fn new() -> Self {
        Self {
            values: std::array::from_fn(|_| AtomicU64::new(0)),
            named: Mutex::new(BTreeMap::new()),
            phases: Mutex::new(BTreeMap::new()),
            started: Mutex::new(Instant::now()),
            peak_rss: AtomicU64::new(0),
        }
    }

    /// Zero every counter and restart the elapsed-time clock.
    pub fn reset(&self) {
        for value in &self.values {
            value.store(0, Ordering::Relaxed);
        }
        lock(&self.named).clear();
        lock(&self.phases).clear();
        *lock(&self.started) = Instant::now();
        self.peak_rss.store(0, Ordering::Relaxed);
    }

    pub fn add(&self, counter: Counter, delta: u64) {
        self.values[counter.index()].fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.values[counter.index()].load(Ordering::Relaxed)
    }

    /// Add to a job-defined counter, creating it at zero.
    pub fn incr_named(&self, name: &str, delta: u64) {
        let mut named = lock(&self.named);
        match named.get_mut(name) {
            Some(value) => *value += delta,
            None => {
                named.insert(name.to_string(), delta);
            }
        }
    }

    /// Overwrite a job-defined gauge.
    pub fn set_named(&self, name: &str, value: u64) {
        lock(&self.named).insert(name.to_string(), value);
    }

    pub fn named(&self, name: &str) -> Option<u64> {
        lock(&self.named).get(name).copied()
    }

    pub fn record_phase(&self, stage: Stage, elapsed: Duration) {
        *lock(&self.phases).entry(stage).or_insert(0) += elapsed.as_millis() as u64;
    }

    /// Sample resident memory and keep the maximum seen since `reset`.
    pub fn sample_memory(&self) {
        if let Some(rss) = current_rss_bytes() {
            self.peak_rss.fetch_max(rss, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let peak_rss = self.peak_rss.load(Ordering::Relaxed);
        CounterSnapshot {
            records_read: self.get(Counter::RecordsRead),
            records_discarded: self.get(Counter::RecordsDiscarded),
            pairs_emitted: self.get(Counter::PairsEmitted),
            pairs_combined_away: self.get(Counter::PairsCombinedAway),
            pairs_shuffled: self.get(Counter::PairsShuffled),
            groups: self.get(Counter::Groups),
            hot_keys: self.get(Counter::HotKeys),
            salted_subgroups: self.get(Counter::SaltedSubgroups),
            reduce_groups: self.get(Counter::ReduceGroups),
            records_emitted: self.get(Counter::RecordsEmitted),
            named: lock(&self.named).clone(),
            phase_ms: lock(&self.phases).clone(),
            elapsed_ms: lock(&self.started).elapsed().as_millis() as u64,
            peak_rss_bytes: (peak_rss > 0).then_some(peak_rss),
        }
    }
}

// A poisoned lock only means another worker panicked mid-update; the map
// itself is still usable.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Point-in-time copy of a job's counters, as reported in the run summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub records_read: u64,
    pub records_discarded: u64,
    pub pairs_emitted: u64,
    pub pairs_combined_away: u64,
    pub pairs_shuffled: u64,
    pub groups: u64,
    pub hot_keys: u64,
    pub salted_subgroups: u64,
    pub reduce_groups: u64,
    pub records_emitted: u64,
    pub named: BTreeMap<String, u64>,
    pub phase_ms: BTreeMap<Stage, u64>,
    pub elapsed_ms: u64,
    pub peak_rss_bytes: Option<u64>,
}

impl CounterSnapshot {
    pub fn get(&self, counter: Counter) -> u64 {
        match counter {
            Counter::RecordsRead => self.records_read,
            Counter::RecordsDiscarded => self.records_discarded,
            Counter::PairsEmitted => self.pairs_emitted,
            Counter::PairsCombinedAway => self.pairs_combined_away,
            Counter::PairsShuffled => self.pairs_shuffled,
            Counter::Groups => self.groups,
            Counter::HotKeys => self.hot_keys,
            Counter::SaltedSubgroups => self.salted_subgroups,
            Counter::ReduceGroups => self.reduce_groups,
            Counter::RecordsEmitted => self.records_emitted,
        }
    }

    pub fn named(&self, name: &str) -> u64 {
        self.named.get(name).copied().unwrap_or(0)
    }
}

//! Common test utilities and helpers for integration tests

#![allow(dead_code)] // each test binary uses a different subset

use std::fs;
use std::path::{Path, PathBuf};

use skewer_core::{EngineConfig, JobContext, Record};

/// Create a test context with a given name
pub fn create_test_context(name: &str) -> JobContext {
    JobContext::new(name).with_workers(4)
}

/// Engine settings with small shards so even tiny inputs span several workers
pub fn create_test_engine() -> EngineConfig {
    EngineConfig {
        workers: 4,
        shard_size: 2,
        default_reducer_count: 3,
        ..EngineConfig::default()
    }
}

/// Turn lines into records of input 0
pub fn records_from_lines<S: AsRef<str>>(lines: &[S]) -> Vec<Record> {
    records_from_source(0, lines)
}

pub fn records_from_source<S: AsRef<str>>(source: usize, lines: &[S]) -> Vec<Record> {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| Record::new(source, i as u64, line.as_ref()))
        .collect()
}

/// Write lines to `dir/name` and return the path
pub fn write_input<S: AsRef<str>>(dir: &Path, name: &str, lines: &[S]) -> PathBuf {
    let path = dir.join(name);
    let mut body = String::new();
    for line in lines {
        body.push_str(line.as_ref());
        body.push('\n');
    }
    fs::write(&path, body).unwrap();
    path
}

pub fn read_output(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Raw activity logs: six valid records and one of each discard reason
pub fn create_activity_logs() -> Vec<String> {
    vec![
        "2023-03-01T10:00:00Z\tu1\tpost\tc1\t{}",
        "2023-03-01T09:00:00Z\tu1\tlike\tc2\t{\"device\":\"ios\"}",
        "2023-03-01T11:00:00Z\tu2\tpost\tc3\t{}",
        "bad line",
        "2023-03-01T12:00:00Z\tu2\tpost\tc4\t{}",
        "2023-03-01T12:30:00Z\tu3\tshare\tc1\t{}",
        "2023-13-01T00:00:00\tu4\tpost\tc5\t{}",
        "2023-03-01T13:00:00Z\tu3\tlike\tc1\t{}",
        "2023-03-01T14:00:00\tu4\tcomment\tc1\t{oops",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

pub fn create_profiles() -> Vec<String> {
    vec!["u1,Ann,Oslo", "u2,Bob,Rome\tpremium", "u9,Zed,Nowhere"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// `user\tx` lines: 99 users once each and `whale` 500 times, interleaved
pub fn create_skewed_user_lines() -> Vec<String> {
    let mut lines = Vec::new();
    for i in 0..500 {
        lines.push(format!("whale\tevent-{i}"));
        if i < 99 {
            lines.push(format!("u{i:02}\tevent-{i}"));
        }
    }
    lines
}

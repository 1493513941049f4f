//! Standalone skew analysis of a `key\tvalue` file.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use skewer_common::{CommonError, read_lines, split_kv};
use skewer_core::{SkewAnalysis, SkewConfig, SkewDetector};

/// Count lines per key. Composite keys such as `user,extra` count under `user`.
pub fn key_counts<I, S>(lines: I) -> BTreeMap<String, u64>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut counts = BTreeMap::new();
    for line in lines {
        let (key, _) = split_kv(line.as_ref().trim());
        let primary = key.split(',').next().unwrap_or(key);
        *counts.entry(primary.to_string()).or_insert(0) += 1;
    }
    counts
}

/// Analyze `path` with the same detector the engine runs after a shuffle.
pub fn analyze_file(
    path: impl AsRef<Path>,
    config: &SkewConfig,
    reducer_count: usize,
) -> Result<SkewAnalysis> {
    config.validate().map_err(CommonError::configuration_error)?;
    let path = path.as_ref();
    let lines = read_lines(path).with_context(|| format!("failed to read {}", path.display()))?;
    let counts = key_counts(&lines);
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(SkewDetector::new(config.clone()).analyze(
        &name,
        counts.iter().map(|(key, count)| (key.as_str(), *count)),
        reducer_count,
    ))
}

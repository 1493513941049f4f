//! Shuffle grouping and secondary sort

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::traits::{Group, KeyValue};

/// Group the pairs of all map shards by primary key.
///
/// Shards are taken in shard order and pairs in emit order; that sequence is
/// the arrival order. Groups come out in ascending primary-key order and the
/// values of each group are ordered by secondary key, ties kept in arrival
/// order. None of this depends on the reducer count or on thread timing.
pub fn group_by_key<V: Send>(shards: Vec<Vec<KeyValue<V>>>) -> Vec<Group<V>> {
    let mut by_key: BTreeMap<String, Vec<(Option<String>, V)>> = BTreeMap::new();
    for shard in shards {
        for pair in shard {
            by_key
                .entry(pair.key.primary)
                .or_default()
                .push((pair.key.secondary, pair.value));
        }
    }

    by_key
        .into_iter()
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|(key, mut entries)| {
            if entries.iter().any(|(secondary, _)| secondary.is_some()) {
                // stable: equal secondaries keep arrival order
                entries.sort_by(|a, b| a.0.cmp(&b.0));
            }
            Group {
                key,
                values: entries.into_iter().map(|(_, value)| value).collect(),
            }
        })
        .collect()
}

//! Map-side combining

use std::collections::HashMap;

use crate::traits::{Key, KeyValue, MapReduceJob};

/// Pre-aggregate the pairs of one shard with the job's combiner.
///
/// Pairs are grouped by their full composite key so the secondary order seen
/// by the reducer is unchanged. Keys come out in order of first arrival, which
/// keeps the shard's output deterministic.
pub fn combine_shard<J: MapReduceJob>(
    job: &J,
    pairs: Vec<KeyValue<J::Value>>,
) -> Vec<KeyValue<J::Value>> {
    let mut slots: HashMap<Key, usize> = HashMap::new();
    let mut grouped: Vec<(Key, Vec<J::Value>)> = Vec::new();
    for pair in pairs {
        match slots.get(&pair.key) {
            Some(&slot) => grouped[slot].1.push(pair.value),
            None => {
                slots.insert(pair.key.clone(), grouped.len());
                grouped.push((pair.key, vec![pair.value]));
            }
        }
    }

    let mut combined = Vec::with_capacity(grouped.len());
    for (key, values) in grouped {
        for value in job.combine(&key.primary, values) {
            combined.push(KeyValue {
                key: key.clone(),
                value,
            });
        }
    }
    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::UserCount;

    #[test]
    fn test_combine_shard_sums_per_key() {
        let pairs = vec![
            KeyValue { key: Key::new("b"), value: 1u64 },
            KeyValue { key: Key::new("a"), value: 2 },
            KeyValue { key: Key::new("b"), value: 3 },
        ];
        let combined = combine_shard(&UserCount, pairs);

        assert_eq!(
            combined,
            vec![
                KeyValue { key: Key::new("b"), value: 4 },
                KeyValue { key: Key::new("a"), value: 2 },
            ]
        );
    }

    #[test]
    fn test_combine_keeps_secondary_keys_apart() {
        let pairs = vec![
            KeyValue { key: Key::with_secondary("u", "1"), value: 1u64 },
            KeyValue { key: Key::with_secondary("u", "2"), value: 1 },
            KeyValue { key: Key::with_secondary("u", "1"), value: 1 },
        ];
        let combined = combine_shard(&UserCount, pairs);

        assert_eq!(combined.len(), 2);
        assert_eq!(combined[0].value, 2);
        assert_eq!(combined[1].key.secondary.as_deref(), Some("2"));
    }
}

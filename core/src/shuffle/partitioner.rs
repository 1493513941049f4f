//! Defines partitioners for distributing groups across reduce partitions.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Maps a key to one of a fixed number of partitions.
pub trait Partitioner<K: ?Sized>: Send + Sync {
    fn num_partitions(&self) -> u32;

    fn get_partition(&self, key: &K) -> u32;
}

/// A partitioner that uses the hash of the key to distribute data.
///
/// `DefaultHasher::new()` always starts from the same SipHash keys, so a key
/// lands on the same partition on every run of the same build.
#[derive(Clone, Debug)]
pub struct HashPartitioner {
    num_partitions: u32,
    seed: u64,
}

impl HashPartitioner {
    pub fn new(num_partitions: u32) -> Self {
        Self::with_seed(num_partitions, 0)
    }

    pub fn with_seed(num_partitions: u32, seed: u64) -> Self {
        Self {
            num_partitions: num_partitions.max(1),
            seed,
        }
    }

    pub fn num_partitions(&self) -> u32 {
        self.num_partitions
    }
}

impl<K: Hash + ?Sized> Partitioner<K> for HashPartitioner {
    fn num_partitions(&self) -> u32 {
        self.num_partitions
    }

    fn get_partition(&self, key: &K) -> u32 {
        let mut hasher = DefaultHasher::new();
        self.seed.hash(&mut hasher);
        key.hash(&mut hasher);
        (hasher.finish() % self.num_partitions as u64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_partitioner_is_stable() {
        let partitioner = HashPartitioner::new(8);
        let first = partitioner.get_partition("user-42");
        for _ in 0..10 {
            assert_eq!(partitioner.get_partition("user-42"), first);
        }
        assert_eq!(
            HashPartitioner::new(8).get_partition("user-42"),
            first,
            "fresh partitioner must agree"
        );
    }

    #[test]
    fn test_hash_partitioner_range() {
        let partitioner = HashPartitioner::new(5);
        for i in 0..200 {
            let key = format!("k{i}");
            assert!(partitioner.get_partition(key.as_str()) < 5);
        }
    }

    #[test]
    fn test_str_and_string_agree() {
        let partitioner = HashPartitioner::with_seed(16, 7);
        let owned = String::from("c17");
        assert_eq!(
            Partitioner::<str>::get_partition(&partitioner, "c17"),
            Partitioner::<String>::get_partition(&partitioner, &owned)
        );
    }

    #[test]
    fn test_zero_partitions_clamped() {
        let partitioner = HashPartitioner::new(0);
        assert_eq!(partitioner.num_partitions(), 1);
        assert_eq!(partitioner.get_partition("anything"), 0);
    }
}

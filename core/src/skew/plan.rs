//! Reduce partition assignment with salting of hot keys.

use crate::shuffle::{HashPartitioner, Partitioner};
use crate::skew::SkewReport;
use crate::traits::Group;

/// Where the values of one group are reduced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    Single(u32),
    /// Salt `i` runs on `partitions[i]`
    Salted(Vec<u32>),
}

/// A slice of reduce work: a whole group, or one salted sub-group.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkUnit<V> {
    /// Index of the group in shuffle order
    pub group: usize,
    pub key: String,
    pub salt: Option<u32>,
    pub values: Vec<V>,
}

/// Partition assignment of every group of a shuffle, indexed like the groups.
#[derive(Debug, Clone)]
pub struct PartitionPlan {
    reducer_count: u32,
    assignments: Vec<Assignment>,
}

impl PartitionPlan {
    /// Plan from per-group skew reports (same order as the groups).
    ///
    /// A group's home partition is the hash of its key. Salt `i` of a hot key
    /// goes to `(home + i) % reducer_count`, so the salts of one key never
    /// share a partition.
    pub fn build(reports: &[SkewReport], partitioner: &HashPartitioner) -> Self {
        let reducer_count = partitioner.num_partitions();
        let assignments = reports
            .iter()
            .map(|report| {
                let home = partitioner.get_partition(report.key.as_str());
                if report.salt_factor > 1 {
                    Assignment::Salted(
                        (0..report.salt_factor as u32)
                            .map(|salt| (home + salt) % reducer_count)
                            .collect(),
                    )
                } else {
                    Assignment::Single(home)
                }
            })
            .collect();
        Self {
            reducer_count,
            assignments,
        }
    }

    pub fn assignment(&self, group: usize) -> Option<&Assignment> {
        self.assignments.get(group)
    }

    /// Move every group's values into the work queue of its partition(s).
    ///
    /// Salted groups are cut into contiguous chunks so concatenating the
    /// chunks by salt index restores the original value order. A group is
    /// never cut into more chunks than it has values; one with fewer than two
    /// values (e.g. after the map-side combine) is reduced whole on its home
    /// partition.
    pub fn distribute<V>(&self, groups: Vec<Group<V>>) -> Vec<Vec<WorkUnit<V>>> {
        let mut partitions: Vec<Vec<WorkUnit<V>>> =
            (0..self.reducer_count).map(|_| Vec::new()).collect();
        for (index, group) in groups.into_iter().enumerate() {
            match self.assignment(index) {
                Some(Assignment::Salted(targets)) if group.values.len() < 2 => {
                    partitions[targets[0] as usize].push(WorkUnit {
                        group: index,
                        key: group.key,
                        salt: None,
                        values: group.values,
                    });
                }
                Some(Assignment::Salted(targets)) => {
                    let salts = targets.len().min(group.values.len());
                    let chunks = split_contiguous(group.values, salts);
                    for (salt, (values, &partition)) in chunks.into_iter().zip(targets).enumerate() {
                        partitions[partition as usize].push(WorkUnit {
                            group: index,
                            key: group.key.clone(),
                            salt: Some(salt as u32),
                            values,
                        });
                    }
                }
                Some(Assignment::Single(partition)) => {
                    partitions[*partition as usize].push(WorkUnit {
                        group: index,
                        key: group.key,
                        salt: None,
                        values: group.values,
                    });
                }
                None => {
                    let partition = self.fallback_partition(&group.key);
                    partitions[partition as usize].push(WorkUnit {
                        group: index,
                        key: group.key,
                        salt: None,
                        values: group.values,
                    });
                }
            }
        }
        partitions
    }

    fn fallback_partition(&self, key: &str) -> u32 {
        HashPartitioner::new(self.reducer_count).get_partition(key)
    }
}

/// Split `values` into `parts` contiguous chunks whose sizes differ by at most one.
pub fn split_contiguous<V>(values: Vec<V>, parts: usize) -> Vec<Vec<V>> {
    let parts = parts.max(1);
    let base = values.len() / parts;
    let extra = values.len() % parts;
    let mut chunks = Vec::with_capacity(parts);
    let mut rest = values.into_iter();
    for i in 0..parts {
        let size = base + usize::from(i < extra);
        chunks.push(rest.by_ref().take(size).collect());
    }
    chunks
}

/// Concatenate salted partial results in salt order.
pub fn merge_salted<V>(mut partials: Vec<(u32, Vec<V>)>) -> Vec<V> {
    partials.sort_by_key(|(salt, _)| *salt);
    partials.into_iter().flat_map(|(_, values)| values).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(key: &str, count: u64, salt_factor: usize) -> SkewReport {
        SkewReport {
            key: key.to_string(),
            observed_count: count,
            mean_count: 0.0,
            is_hot: salt_factor > 1,
            salt_factor,
        }
    }

    #[test]
    fn test_split_contiguous() {
        let chunks = split_contiguous((0..10).collect::<Vec<_>>(), 3);
        assert_eq!(chunks, vec![vec![0, 1, 2, 3], vec![4, 5, 6], vec![7, 8, 9]]);

        let chunks = split_contiguous(vec![1, 2], 4);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks.iter().map(Vec::len).sum::<usize>(), 2);
    }

    #[test]
    fn test_salts_land_on_distinct_partitions() {
        let partitioner = HashPartitioner::new(4);
        let plan = PartitionPlan::build(&[report("cold", 1, 1), report("hot", 12, 4)], &partitioner);

        match plan.assignment(1) {
            Some(Assignment::Salted(targets)) => {
                let mut sorted = targets.clone();
                sorted.sort();
                sorted.dedup();
                assert_eq!(sorted.len(), 4);
            }
            other => panic!("expected salted assignment, got {other:?}"),
        }
        assert!(matches!(plan.assignment(0), Some(Assignment::Single(_))));
    }

    #[test]
    fn test_salts_never_exceed_values() {
        let partitioner = HashPartitioner::new(4);
        let plan = PartitionPlan::build(&[report("a", 500, 4), report("b", 300, 4)], &partitioner);
        let groups = vec![
            Group { key: "a".to_string(), values: vec![500u64] },
            Group { key: "b".to_string(), values: vec![100u64, 200] },
        ];

        let units: Vec<_> = plan.distribute(groups).into_iter().flatten().collect();

        let a: Vec<_> = units.iter().filter(|u| u.key == "a").collect();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].salt, None);
        let b: Vec<_> = units.iter().filter(|u| u.key == "b").collect();
        assert_eq!(b.len(), 2);
        assert!(b.iter().all(|u| u.values.len() == 1));
    }

    #[test]
    fn test_distribute_then_merge_restores_order() {
        let partitioner = HashPartitioner::new(3);
        let plan = PartitionPlan::build(&[report("hot", 7, 3)], &partitioner);
        let groups = vec![Group {
            key: "hot".to_string(),
            values: (0..7).collect::<Vec<_>>(),
        }];

        let partitions = plan.distribute(groups);
        let partials: Vec<(u32, Vec<i32>)> = partitions
            .into_iter()
            .flatten()
            .map(|unit| (unit.salt.unwrap(), unit.values))
            .collect();
        assert_eq!(partials.len(), 3);
        assert_eq!(merge_salted(partials), (0..7).collect::<Vec<_>>());
    }
}

//! Shuffle stage: routing of mapped tuples to their partitions.
//!
//! Every word is assigned to one partition by hashing, and each partition owns a
//! `PartitionedQueue` that all mappers write into and exactly one reducer drains.

use std::collections::hash_map;
use std::hash::{Hash, Hasher};

mod queue;

pub use self::queue::{PartitionedQueue, QueueStream};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Partitioner {
    size: usize,
}

impl Partitioner {
    /// Callers guarantee `size > 0`.
    pub fn new(size: usize) -> Partitioner {
        debug_assert!(size > 0, "partitioner needs at least one partition");
        Partitioner { size }
    }

    /// The `DefaultHasher` is built with fixed keys, so the same word lands in the
    /// same partition on every call and every run.
    #[inline]
    pub fn index_of(&self, key: &str) -> usize {
        let mut hasher = hash_map::DefaultHasher::new();

        key.hash(&mut hasher);

        let hash_val = hasher.finish();

        (hash_val % (self.size as u64)) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_of_is_deterministic() {
        let partitioner = Partitioner::new(4);

        let idx1 = partitioner.index_of("Jon");
        let idx2 = partitioner.index_of("Jon");

        assert_eq!(idx1, idx2);
        assert_eq!(idx1, Partitioner::new(4).index_of("Jon"));
    }

    #[test]
    fn test_index_of_stays_in_range() {
        let partitioner = Partitioner::new(7);

        for i in 0..1000 {
            assert!(partitioner.index_of(&format!("word{}", i)) < 7);
        }
    }

    #[test]
    fn test_single_partition() {
        let partitioner = Partitioner::new(1);

        assert_eq!(partitioner.index_of("anything"), 0);
        assert_eq!(partitioner.index_of(""), 0);
    }
}

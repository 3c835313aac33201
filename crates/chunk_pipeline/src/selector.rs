//! src/selector.rs
//!
//! Chunk selection policies. A selector hands out chunk indices for one
//! epoch, partitioned by rank in distributed training, and its `next()`
//! is called concurrently from every preloader thread.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

use crate::error::{PipelineError, Result};

/// Thread-safe iterator over the chunk indices of one epoch.
///
/// In a distributed setting each replica sees a rank-local slice of
/// `local_chunk_count()` indices. When `chunk_count` does not divide
/// evenly, the index space is padded by wrapping so every replica
/// processes the same number of chunks; a few indices are then visited by
/// more than one replica. The duplication is intentional: it keeps
/// per-replica step counts identical, which data-parallel training
/// requires.
///
/// `next()` is on the hot path of every preloader thread and must not
/// block: implementations advance an atomic cursor rather than taking a
/// lock.
pub trait ChunkSelector: Send + Sync {
    /// Next chunk index to load, or `None` once the epoch is exhausted.
    fn next(&self) -> Result<Option<usize>>;

    /// Recompute this rank's slice for the current epoch and rewind.
    fn reset(&self);

    /// Record the epoch used to seed the next `reset()`.
    fn set_epoch(&self, epoch: usize);

    /// Number of chunks this rank loads per epoch.
    fn local_chunk_count(&self) -> usize;
}

/// Validate the partitioning arguments shared by both policies and return
/// the per-rank chunk count.
fn partition(chunk_count: usize, num_replicas: usize, rank: usize) -> Result<usize> {
    if chunk_count == 0 {
        return Err(PipelineError::Configuration(
            "chunk count is 0; the reader must expose at least one chunk".into(),
        ));
    }
    if num_replicas == 0 {
        return Err(PipelineError::Configuration(
            "num_replicas is 0; at least one replica needs to be specified".into(),
        ));
    }
    if rank >= num_replicas {
        return Err(PipelineError::Configuration(format!(
            "rank ({rank}) must be less than num_replicas ({num_replicas})"
        )));
    }
    Ok(chunk_count.div_ceil(num_replicas))
}

/// Build the padded index space `[0, local_chunk_count * num_replicas)`,
/// wrapping modulo `chunk_count` so all replicas get equal shares.
fn padded_indices(chunk_count: usize, num_replicas: usize, local_chunk_count: usize) -> Vec<usize> {
    if num_replicas == 1 {
        (0..chunk_count).collect()
    } else {
        (0..local_chunk_count * num_replicas)
            .map(|i| i % chunk_count)
            .collect()
    }
}

/// Shuffles the chunk order on every `reset()`.
///
/// The shuffle is seeded by the epoch recorded with `set_epoch`, so two
/// resets with the same epoch produce the same index sequence for a given
/// rank. The shuffle always starts from the pristine padded index space;
/// nothing carries over between resets.
///
/// # Example
/// ```ignore
/// let selector = RandomChunkSelector::new(100, 1, 0)?;
/// selector.set_epoch(3);
/// selector.reset();
/// while let Some(chunk_index) = selector.next()? { /* load it */ }
/// ```
pub struct RandomChunkSelector {
    local_chunk_count: usize,
    rank: usize,
    /// Padded index space; shuffled copies of this are sliced per rank.
    base_indices: Vec<usize>,
    /// This rank's shuffled window. Empty until the first `reset()`;
    /// written only while no preloader is running.
    chunk_indices: RwLock<Vec<usize>>,
    cursor: AtomicUsize,
    epoch: AtomicUsize,
}

impl RandomChunkSelector {
    pub fn new(chunk_count: usize, num_replicas: usize, rank: usize) -> Result<Self> {
        let local_chunk_count = partition(chunk_count, num_replicas, rank)?;
        Ok(Self {
            local_chunk_count,
            rank,
            base_indices: padded_indices(chunk_count, num_replicas, local_chunk_count),
            chunk_indices: RwLock::new(Vec::new()),
            cursor: AtomicUsize::new(0),
            epoch: AtomicUsize::new(0),
        })
    }
}

impl ChunkSelector for RandomChunkSelector {
    fn next(&self) -> Result<Option<usize>> {
        let chunk_indices = self.chunk_indices.read().unwrap();
        if chunk_indices.is_empty() {
            return Err(PipelineError::NotInitialized { operation: "next" });
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed);
        Ok(chunk_indices.get(idx).copied())
    }

    fn reset(&self) {
        let mut rng = StdRng::seed_from_u64(self.epoch.load(Ordering::Relaxed) as u64);
        let mut shuffled = self.base_indices.clone();
        shuffled.shuffle(&mut rng);

        let begin = self.rank * self.local_chunk_count;
        let mut chunk_indices = self.chunk_indices.write().unwrap();
        chunk_indices.clear();
        chunk_indices.extend_from_slice(&shuffled[begin..begin + self.local_chunk_count]);
        self.cursor.store(0, Ordering::Relaxed);
    }

    fn set_epoch(&self, epoch: usize) {
        self.epoch.store(epoch, Ordering::Relaxed);
    }

    fn local_chunk_count(&self) -> usize {
        self.local_chunk_count
    }
}

/// Hands out this rank's chunk indices in ascending order.
///
/// Usable without a prior `reset()`; epochs do not change the order.
pub struct SequentialChunkSelector {
    chunk_count: usize,
    local_chunk_count: usize,
    begin_index: usize,
    end_index: usize,
    cursor: AtomicUsize,
}

impl SequentialChunkSelector {
    pub fn new(chunk_count: usize, num_replicas: usize, rank: usize) -> Result<Self> {
        let local_chunk_count = partition(chunk_count, num_replicas, rank)?;
        let begin_index = rank * local_chunk_count;
        Ok(Self {
            chunk_count,
            local_chunk_count,
            begin_index,
            end_index: begin_index + local_chunk_count,
            cursor: AtomicUsize::new(begin_index),
        })
    }
}

impl ChunkSelector for SequentialChunkSelector {
    fn next(&self) -> Result<Option<usize>> {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed);
        if idx < self.end_index {
            Ok(Some(idx % self.chunk_count))
        } else {
            Ok(None)
        }
    }

    fn reset(&self) {
        self.cursor.store(self.begin_index, Ordering::Relaxed);
    }

    fn set_epoch(&self, _epoch: usize) {}

    fn local_chunk_count(&self) -> usize {
        self.local_chunk_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    fn drain(selector: &dyn ChunkSelector) -> Vec<usize> {
        let mut out = Vec::new();
        while let Some(idx) = selector.next().unwrap() {
            out.push(idx);
        }
        out
    }

    #[test]
    fn random_selector_requires_reset_before_next() {
        let selector = RandomChunkSelector::new(8, 1, 0).unwrap();
        assert!(matches!(
            selector.next(),
            Err(PipelineError::NotInitialized { .. })
        ));
    }

    #[test]
    fn random_selector_same_epoch_same_order() {
        let selector = RandomChunkSelector::new(50, 1, 0).unwrap();
        selector.set_epoch(4);
        selector.reset();
        let first = drain(&selector);

        selector.set_epoch(4);
        selector.reset();
        let second = drain(&selector);
        assert_eq!(first, second, "equal epochs must reshuffle identically");

        selector.set_epoch(5);
        selector.reset();
        let third = drain(&selector);
        assert_ne!(first, third, "a new epoch should change the order");
    }

    #[test]
    fn random_selector_covers_every_chunk_once_for_single_replica() {
        let selector = RandomChunkSelector::new(31, 1, 0).unwrap();
        selector.reset();
        let mut indices = drain(&selector);
        assert_eq!(indices.len(), 31);
        indices.sort_unstable();
        assert_eq!(indices, (0..31).collect::<Vec<_>>());
    }

    #[test]
    fn replicas_get_equal_shares_whose_union_covers_all_chunks() {
        // 5 chunks over 2 replicas: each rank loads ceil(5/2) = 3 and one
        // index is visited twice overall.
        let mut all = Vec::new();
        for rank in 0..2 {
            let selector = RandomChunkSelector::new(5, 2, rank).unwrap();
            assert_eq!(selector.local_chunk_count(), 3);
            selector.set_epoch(1);
            selector.reset();
            let indices = drain(&selector);
            assert_eq!(indices.len(), 3);
            all.extend(indices);
        }
        assert_eq!(all.len(), 6);
        let unique: HashSet<_> = all.iter().copied().collect();
        assert_eq!(unique, (0..5).collect::<HashSet<_>>());
    }

    #[test]
    fn sequential_selector_partitions_and_wraps() {
        let rank0 = SequentialChunkSelector::new(5, 2, 0).unwrap();
        assert_eq!(drain(&rank0), vec![0, 1, 2]);

        let rank1 = SequentialChunkSelector::new(5, 2, 1).unwrap();
        // Padded index 5 wraps back to chunk 0.
        assert_eq!(drain(&rank1), vec![3, 4, 0]);

        rank1.reset();
        assert_eq!(drain(&rank1), vec![3, 4, 0]);
    }

    #[test]
    fn concurrent_next_hands_out_each_index_exactly_once() {
        let selector = Arc::new(SequentialChunkSelector::new(1000, 1, 0).unwrap());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let selector = Arc::clone(&selector);
            handles.push(thread::spawn(move || {
                let mut got = Vec::new();
                while let Some(idx) = selector.next().unwrap() {
                    got.push(idx);
                }
                got
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.join().unwrap());
        }
        assert_eq!(all.len(), 1000);
        let unique: HashSet<_> = all.iter().copied().collect();
        assert_eq!(unique.len(), 1000, "no index may be handed out twice");
    }

    #[test]
    fn invalid_partitioning_is_rejected() {
        assert!(matches!(
            RandomChunkSelector::new(0, 1, 0),
            Err(PipelineError::Configuration(_))
        ));
        assert!(matches!(
            RandomChunkSelector::new(4, 0, 0),
            Err(PipelineError::Configuration(_))
        ));
        assert!(matches!(
            SequentialChunkSelector::new(4, 2, 2),
            Err(PipelineError::Configuration(_))
        ));
    }
}

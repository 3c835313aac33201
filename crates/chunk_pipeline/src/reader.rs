//! src/reader.rs
//!
//! The chunk reader seam. A chunk is the coarse-grained unit of I/O: an
//! entire file, or a slice of a large file addressed by seek position.
//! The pipeline never inspects chunk contents; it only moves the examples
//! a reader produces.

use anyhow::{ensure, Result};

/// Reads entire chunks of examples by index.
///
/// Implementations are plugged into [`ChunkDataset`](crate::ChunkDataset)
/// at construction time and invoked concurrently from the preloader
/// threads, so `read_chunk` must be safe for parallel calls with distinct
/// indices.
///
/// # Contract
/// - `read_chunk(i)` is only called with `i < chunk_count()` by the
///   pipeline; an implementation should still reject out-of-range indices.
/// - `chunk_count()` is stable for the lifetime of the reader.
/// - `reset()` clears any reader-local caches. The dataset calls it once
///   per epoch, before any worker is spawned.
pub trait ChunkReader: Send + Sync {
    /// The example type this reader produces. Opaque to the pipeline.
    type Example: Send + 'static;

    /// Read an entire chunk. An empty chunk is valid and is skipped by the
    /// pipeline; an error is captured and re-raised at the consumer.
    fn read_chunk(&self, chunk_index: usize) -> Result<Vec<Self::Example>>;

    /// Number of chunks available from this reader.
    fn chunk_count(&self) -> usize;

    /// Clear reader-local state. Called once per epoch by the dataset.
    fn reset(&self);
}

/// A [`ChunkReader`] over pre-materialized chunks.
///
/// Mostly useful for tests and benchmarks, and as the smallest conforming
/// implementation of the trait contract.
///
/// # Example
/// ```ignore
/// let reader = InMemoryChunkReader::new(vec![vec![1, 2, 3], vec![4, 5]]);
/// assert_eq!(reader.chunk_count(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryChunkReader<T> {
    chunks: Vec<Vec<T>>,
}

impl<T> InMemoryChunkReader<T> {
    pub fn new(chunks: Vec<Vec<T>>) -> Self {
        Self { chunks }
    }
}

impl<T> ChunkReader for InMemoryChunkReader<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Example = T;

    fn read_chunk(&self, chunk_index: usize) -> Result<Vec<T>> {
        ensure!(
            chunk_index < self.chunks.len(),
            "chunk index {} out of range for reader with {} chunks",
            chunk_index,
            self.chunks.len()
        );
        Ok(self.chunks[chunk_index].clone())
    }

    fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    fn reset(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_reader_returns_chunks_by_index() -> Result<()> {
        let reader = InMemoryChunkReader::new(vec![vec![1, 2, 3], vec![], vec![4]]);
        assert_eq!(reader.chunk_count(), 3);
        assert_eq!(reader.read_chunk(0)?, vec![1, 2, 3]);
        assert!(reader.read_chunk(1)?.is_empty());
        assert_eq!(reader.read_chunk(2)?, vec![4]);
        Ok(())
    }

    #[test]
    fn in_memory_reader_rejects_out_of_range_index() {
        let reader = InMemoryChunkReader::new(vec![vec![1]]);
        assert!(reader.read_chunk(1).is_err());
    }
}

//! src/dataset/config.rs
//!
//! Configuration for `ChunkDataset` prefetching behaviour.
//!
//! Example:
//! ```ignore
//! let config = ChunkDatasetConfig::builder()
//!     .preloader_count(4)
//!     .batch_size(32)
//!     .cache_size(4096)
//!     .build();
//! ```
//!
//! # Performance considerations:
//! - `preloader_count`: more workers overlap more reader I/O with
//!   training, at the cost of memory for in-flight chunks
//! - `cache_size`: higher values smooth out uneven chunk read times but
//!   hold more examples in memory

/// Configuration for `ChunkDataset`. Validated by `ChunkDataset::new`.
#[derive(Debug, Clone)]
pub struct ChunkDatasetConfig {
    /// Number of worker threads preloading chunk data (must be >= 1).
    pub preloader_count: usize,
    /// The fixed size of each batch returned by `get_batch` (must be >= 1).
    pub batch_size: usize,
    /// Soft upper bound on the total number of buffered examples. Must be
    /// at least `batch_size`; a single chunk larger than this still loads
    /// in one piece.
    pub cache_size: usize,
}

impl Default for ChunkDatasetConfig {
    fn default() -> Self {
        Self {
            preloader_count: 1,
            batch_size: 1,
            cache_size: 2048,
        }
    }
}

impl ChunkDatasetConfig {
    pub fn builder() -> ChunkDatasetConfigBuilder {
        ChunkDatasetConfigBuilder::default()
    }
}

/// Builder for ChunkDatasetConfig with method chaining
#[derive(Default)]
pub struct ChunkDatasetConfigBuilder {
    config: ChunkDatasetConfig,
}

impl ChunkDatasetConfigBuilder {
    /// Set the number of preloader worker threads spawned per epoch.
    pub fn preloader_count(mut self, count: usize) -> Self {
        self.config.preloader_count = count;
        self
    }

    /// Set the batch size (must be > 0).
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set the buffered-example ceiling. Needs to be large enough to hold
    /// at least one batch.
    pub fn cache_size(mut self, size: usize) -> Self {
        self.config.cache_size = size;
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> ChunkDatasetConfig {
        self.config
    }
}

//! src/dataset/mod.rs
//!
//! The chunk dataset orchestrator.
//!
//! A `ChunkDataset` owns three collaborators (a [`ChunkReader`], a
//! [`ChunkSelector`] and an [`ExampleSampler`]) and wires them together
//! with a pool of preloader threads and a [`BatchBuffer`]. Workers pull
//! chunk indices from the selector, read them, and push the examples into
//! the buffer; the training thread pulls uniform batches out the other
//! end with `get_batch`.
//!
//! Hierarchical sampling: shuffling chunk order (selector) and,
//! independently, example order within each chunk (sampler) approximates
//! a global shuffle at a fraction of the I/O cost.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::error::{PipelineError, Result};
use crate::reader::ChunkReader;
use crate::sampler::ExampleSampler;
use crate::selector::ChunkSelector;

mod buffer;
mod config;

use buffer::BatchBuffer;
pub use config::{ChunkDatasetConfig, ChunkDatasetConfigBuilder};

/// A stateful dataset that prefetches entire chunks on background threads.
///
/// # Lifecycle
/// Each epoch starts with [`reset`](Self::reset): the previous epoch's
/// workers are torn down, the reader and selector are reset, the batch
/// buffer is replaced, and a fresh worker pool is spawned. The consumer
/// then calls [`get_batch`](Self::get_batch) until it returns `Ok(None)`.
/// `reset` may be called at any point, including mid-epoch; buffered data
/// never crosses the boundary.
///
/// # Thread safety
/// One consumer thread drives `get_batch`; the preloader threads are
/// internal. Workers are always joined before the dataset is dropped.
///
/// # Example
/// ```ignore
/// let selector = Arc::new(RandomChunkSelector::new(reader.chunk_count(), 1, 0)?);
/// let mut dataset = ChunkDataset::new(
///     reader,
///     RandomExampleSampler::new(42),
///     selector,
///     ChunkDatasetConfig::builder().preloader_count(4).batch_size(32).build(),
/// )?;
///
/// for epoch in 0..epochs {
///     dataset.set_epoch(epoch);
///     dataset.reset()?;
///     while let Some(batch) = dataset.get_batch(32)? {
///         // train on batch
///     }
/// }
/// ```
pub struct ChunkDataset<R: ChunkReader, S: ExampleSampler> {
    chunk_reader: Arc<R>,
    /// Shared with each epoch's buffer; locked only inside the buffer lock.
    example_sampler: Arc<Mutex<S>>,
    chunk_selector: Arc<dyn ChunkSelector>,
    config: ChunkDatasetConfig,
    /// Replaced wholesale on every `reset`; `None` before the first one.
    batch_buffer: Option<Arc<BatchBuffer<R::Example, S>>>,
    preload_threads: Vec<thread::JoinHandle<()>>,
    quit_worker: Arc<AtomicBool>,
}

impl<R, S> ChunkDataset<R, S>
where
    R: ChunkReader,
    S: ExampleSampler,
{
    /// Create a dataset from its collaborators.
    ///
    /// # Errors
    /// Returns `Configuration` if `preloader_count` or `batch_size` is
    /// zero, or if `cache_size` cannot hold one batch.
    pub fn new(
        chunk_reader: R,
        example_sampler: S,
        chunk_selector: Arc<dyn ChunkSelector>,
        config: ChunkDatasetConfig,
    ) -> Result<Self> {
        if config.preloader_count == 0 {
            return Err(PipelineError::Configuration(
                "preloader count is 0; at least one preloader needs to be specified".into(),
            ));
        }
        if config.batch_size == 0 {
            return Err(PipelineError::Configuration(
                "batch size is 0; a positive batch size needs to be specified".into(),
            ));
        }
        if config.cache_size < config.batch_size {
            return Err(PipelineError::Configuration(format!(
                "cache size ({}) is less than batch size ({}); the cache needs to be \
                 large enough to hold at least one batch",
                config.cache_size, config.batch_size
            )));
        }

        Ok(Self {
            chunk_reader: Arc::new(chunk_reader),
            example_sampler: Arc::new(Mutex::new(example_sampler)),
            chunk_selector,
            config,
            batch_buffer: None,
            preload_threads: Vec::new(),
            quit_worker: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Return one batch, the terminal `None` once the epoch is exhausted,
    /// or a captured worker failure.
    ///
    /// Blocks until a full batch is available. Every batch has exactly the
    /// configured size except possibly the last non-empty one of the
    /// epoch. After the terminal `None`, further calls keep returning
    /// `None` until the next [`reset`](Self::reset).
    ///
    /// # Errors
    /// - `NotInitialized` if `reset` has never been called.
    /// - `BatchSizeMismatch` if `batch_size` differs from the configured
    ///   size; the dataset repacks ahead of time and cannot serve other
    ///   sizes.
    /// - `WorkerFailure` carrying a reader error, in FIFO order relative
    ///   to the batches around it.
    pub fn get_batch(&self, batch_size: usize) -> Result<Option<Vec<R::Example>>> {
        let buffer = self
            .batch_buffer
            .as_ref()
            .ok_or(PipelineError::NotInitialized {
                operation: "get_batch",
            })?;

        if batch_size != self.config.batch_size {
            return Err(PipelineError::BatchSizeMismatch {
                requested: batch_size,
                configured: self.config.batch_size,
            });
        }

        buffer.get_batch()
    }

    /// Record the epoch that seeds the selector's next reshuffle. Call
    /// before [`reset`](Self::reset) for deterministic epoch-to-epoch
    /// ordering.
    pub fn set_epoch(&self, epoch: usize) {
        self.chunk_selector.set_epoch(epoch);
    }

    /// Tear down the preloader pool: signal quit, release any producer
    /// blocked on a full buffer, and join every worker thread.
    ///
    /// Idempotent: a second call (or the implicit one in `Drop`) joins
    /// nothing. Without the buffer `stop()`, tearing down a non-exhausted
    /// epoch would deadlock on a producer stuck in its full-queue wait.
    pub fn free_workers(&mut self) {
        if !self.quit_worker.swap(true, Ordering::Relaxed) {
            if let Some(buffer) = &self.batch_buffer {
                buffer.stop();
            }
            tracing::debug!(
                workers = self.preload_threads.len(),
                "joining preloader workers"
            );
            for handle in self.preload_threads.drain(..) {
                if handle.join().is_err() {
                    tracing::warn!("a preloader worker panicked before teardown");
                }
            }
        }
    }
}

impl<R, S> ChunkDataset<R, S>
where
    R: ChunkReader + 'static,
    S: ExampleSampler + 'static,
{
    /// Start (or restart) an epoch.
    ///
    /// Frees any workers from a previous epoch (safe whether or not that
    /// epoch was exhausted), then resets the reader and the selector,
    /// replaces the batch buffer with a fresh one sized to the selector's
    /// rank-local chunk count, and spawns the preloader pool.
    ///
    /// # Errors
    /// `WorkerSpawn` if a preloader thread cannot be created; any workers
    /// spawned before the failure are torn down again before returning.
    pub fn reset(&mut self) -> Result<()> {
        self.free_workers();

        self.chunk_reader.reset();
        self.chunk_selector.reset();

        // In distributed training the local chunk count differs from the
        // reader's total; the selector holds the truth.
        let chunks_to_load = self.chunk_selector.local_chunk_count();
        let buffer = Arc::new(BatchBuffer::new(
            chunks_to_load,
            self.config.batch_size,
            self.config.cache_size,
            Arc::clone(&self.example_sampler),
        ));
        self.batch_buffer = Some(Arc::clone(&buffer));

        self.quit_worker.store(false, Ordering::Relaxed);
        tracing::debug!(
            workers = self.config.preloader_count,
            chunks = chunks_to_load,
            "spawning preloader workers"
        );

        for i in 0..self.config.preloader_count {
            let reader = Arc::clone(&self.chunk_reader);
            let selector = Arc::clone(&self.chunk_selector);
            let buffer = Arc::clone(&buffer);
            let quit = Arc::clone(&self.quit_worker);

            let spawned = thread::Builder::new()
                .name(format!("chunk-preloader-{i}"))
                .spawn(move || preloader_loop(&*reader, &*selector, &buffer, &quit));

            match spawned {
                Ok(handle) => self.preload_threads.push(handle),
                Err(err) => {
                    self.free_workers();
                    // No live pool backs this buffer; get_batch must see
                    // an uninitialized dataset, not an epoch that never
                    // finishes.
                    self.batch_buffer = None;
                    return Err(PipelineError::WorkerSpawn(err));
                }
            }
        }

        Ok(())
    }
}

impl<R: ChunkReader, S: ExampleSampler> Drop for ChunkDataset<R, S> {
    fn drop(&mut self) {
        self.free_workers();
    }
}

/// The preloader loop run by every worker thread.
///
/// Each iteration consumes exactly one chunk: it produces examples, a
/// skip, or a reified failure, never more than one of the three.
fn preloader_loop<R, S>(
    reader: &R,
    selector: &dyn ChunkSelector,
    buffer: &BatchBuffer<R::Example, S>,
    quit: &AtomicBool,
) where
    R: ChunkReader,
    S: ExampleSampler,
{
    while !quit.load(Ordering::Relaxed) {
        let chunk_index = match selector.next() {
            Ok(Some(index)) => index,
            Ok(None) => break,
            Err(err) => {
                // Unreachable after a correct reset; a selector error is
                // not a chunk-consumption event, so it must not be
                // forwarded into the buffer's accounting.
                tracing::error!(error = %err, "chunk selector failed; preloader exiting");
                break;
            }
        };

        match reader.read_chunk(chunk_index) {
            Ok(examples) if examples.is_empty() => buffer.skip_chunk(),
            Ok(examples) => buffer.add_chunk(examples),
            Err(err) => {
                tracing::debug!(chunk_index, error = %err, "chunk read failed; forwarding");
                buffer.add_error(err);
            }
        }
    }
}

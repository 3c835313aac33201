//! src/dataset/buffer.rs
//!
//! The bounded queue between the preloader threads and the consumer.
//!
//! Producers push whole chunks; the buffer splices them into
//! `batch_size`-sized batches as they arrive, so `get_batch` never has to
//! re-pack anything. Reader errors captured on a worker are reified as
//! queue entries and re-raised at the consumer in arrival order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::error::{PipelineError, Result};
use crate::sampler::ExampleSampler;

/// A queue slot: either a batch of examples or a captured worker error.
enum Entry<T> {
    Data(Vec<T>),
    Failure(anyhow::Error),
}

/// State guarded by the queue mutex.
struct Shared<T> {
    queue: VecDeque<Entry<T>>,
    /// Chunks not yet accounted for this epoch (loaded, skipped, or failed).
    /// Strictly decreasing; the epoch is exhausted when it reaches 0 and
    /// the queue has drained.
    remaining_chunk_count: usize,
    /// Sum of example counts of the `Data` entries currently queued.
    queue_example_count: usize,
}

/// Bounded batch queue with backpressure.
///
/// One buffer serves exactly one epoch: the dataset replaces it on every
/// `reset`, so no example ever crosses an epoch boundary. `cache_size` is
/// a soft ceiling: producers check it before enqueuing, which lets a
/// single chunk larger than the cache still make progress.
pub(crate) struct BatchBuffer<T, S> {
    shared: Mutex<Shared<T>>,
    cv_read: Condvar,
    cv_write: Condvar,
    /// One-shot teardown signal; readable without the queue lock.
    stop: AtomicBool,
    batch_size: usize,
    cache_size: usize,
    /// Shuffles examples within each inbound chunk. Locked strictly inside
    /// the queue lock (producers only), which serializes repacking.
    example_sampler: Arc<Mutex<S>>,
}

/// Move `count` sampler-chosen examples out of `slots` into `batch`.
fn draw_into<S: ExampleSampler, T>(
    sampler: &mut S,
    slots: &mut [Option<T>],
    count: usize,
    batch: &mut Vec<T>,
) {
    let indices = sampler.next(count);
    assert_eq!(
        indices.len(),
        count,
        "example sampler returned a short draw"
    );
    for i in indices {
        assert!(
            i < slots.len(),
            "example sampler index {i} out of range for chunk of {} examples",
            slots.len()
        );
        let example = slots[i]
            .take()
            .expect("example sampler repeated an index within a chunk");
        batch.push(example);
    }
}

impl<T, S> BatchBuffer<T, S>
where
    T: Send,
    S: ExampleSampler,
{
    pub(crate) fn new(
        remaining_chunk_count: usize,
        batch_size: usize,
        cache_size: usize,
        example_sampler: Arc<Mutex<S>>,
    ) -> Self {
        Self {
            shared: Mutex::new(Shared {
                queue: VecDeque::new(),
                remaining_chunk_count,
                queue_example_count: 0,
            }),
            cv_read: Condvar::new(),
            cv_write: Condvar::new(),
            stop: AtomicBool::new(false),
            batch_size,
            cache_size,
            example_sampler,
        }
    }

    /// Pop one batch for the consumer.
    ///
    /// Blocks until a full batch is buffered, a failure reaches the head
    /// of the queue, or the epoch is exhausted. Waiting for a *full* batch
    /// rather than any batch matters: a trailing partial batch may still
    /// be topped up by the next inbound chunk, and draining it early would
    /// break batch-size uniformity.
    pub(crate) fn get_batch(&self) -> Result<Option<Vec<T>>> {
        let mut shared = self.shared.lock().unwrap();
        shared = self
            .cv_read
            .wait_while(shared, |s| {
                s.queue_example_count < self.batch_size
                    && s.remaining_chunk_count != 0
                    && !matches!(s.queue.front(), Some(Entry::Failure(_)))
            })
            .unwrap();

        let Some(entry) = shared.queue.pop_front() else {
            // All chunks accounted for and every batch retrieved.
            debug_assert_eq!(shared.remaining_chunk_count, 0);
            return Ok(None);
        };

        match entry {
            Entry::Failure(err) => Err(PipelineError::WorkerFailure(err)),
            Entry::Data(batch) => {
                shared.queue_example_count -= batch.len();
                drop(shared);
                self.cv_write.notify_all();
                Ok(Some(batch))
            }
        }
    }

    /// Splice one non-empty chunk into the queue. Called from preloader
    /// threads; empty chunks go through [`skip_chunk`](Self::skip_chunk).
    ///
    /// Blocks while the cache is at capacity. If `stop` is observed the
    /// chunk is discarded without touching any counter; the whole buffer
    /// is being thrown away, so the accounting no longer matters.
    pub(crate) fn add_chunk(&self, data: Vec<T>) {
        debug_assert!(!data.is_empty(), "empty chunks go through skip_chunk");

        let mut shared = self.shared.lock().unwrap();
        shared = self
            .cv_write
            .wait_while(shared, |s| {
                s.queue_example_count >= self.cache_size && !self.stop.load(Ordering::Relaxed)
            })
            .unwrap();

        if self.stop.load(Ordering::Relaxed) {
            return;
        }

        let chunk_size = data.len();
        let mut slots: Vec<Option<T>> = data.into_iter().map(Some).collect();
        let mut remaining = chunk_size;

        let mut sampler = self.example_sampler.lock().unwrap();
        sampler.reset(chunk_size);

        // Top up a trailing partial batch before opening a new one. Only a
        // Data entry qualifies; examples must never land in a Failure slot.
        if let Some(Entry::Data(last)) = shared.queue.back_mut() {
            if last.len() < self.batch_size {
                let count = remaining.min(self.batch_size - last.len());
                draw_into(&mut *sampler, &mut slots, count, last);
                remaining -= count;
            }
        }

        // Spill the rest into fresh batches. The final batch of the final
        // chunk may come up short; every other one is full.
        while remaining > 0 {
            let mut batch = Vec::with_capacity(self.batch_size);
            let count = remaining.min(self.batch_size);
            draw_into(&mut *sampler, &mut slots, count, &mut batch);
            remaining -= count;
            shared.queue.push_back(Entry::Data(batch));
        }
        drop(sampler);

        shared.queue_example_count += chunk_size;
        assert!(shared.remaining_chunk_count > 0);
        shared.remaining_chunk_count -= 1;

        drop(shared);
        self.cv_read.notify_all();
    }

    /// Enqueue a reader error captured on a preloader thread. Delivered to
    /// the consumer in arrival order relative to the batches around it.
    pub(crate) fn add_error(&self, err: anyhow::Error) {
        let mut shared = self.shared.lock().unwrap();
        shared = self
            .cv_write
            .wait_while(shared, |s| {
                s.queue_example_count >= self.cache_size && !self.stop.load(Ordering::Relaxed)
            })
            .unwrap();

        if self.stop.load(Ordering::Relaxed) {
            return;
        }

        shared.queue.push_back(Entry::Failure(err));
        assert!(shared.remaining_chunk_count > 0);
        shared.remaining_chunk_count -= 1;

        drop(shared);
        self.cv_read.notify_all();
    }

    /// Account for an empty chunk: no entry, one chunk consumed.
    pub(crate) fn skip_chunk(&self) {
        let mut shared = self.shared.lock().unwrap();
        assert!(shared.remaining_chunk_count > 0);
        shared.remaining_chunk_count -= 1;
        drop(shared);
        self.cv_read.notify_all();
    }

    /// One-shot teardown: wake every producer blocked on a full cache and
    /// make all future producer calls return immediately. The consumer is
    /// not signaled; it is the thread calling this, via the dataset's
    /// `free_workers`. The buffer must not be used afterwards.
    ///
    /// The flag is set under the queue lock so a producer that already
    /// passed its predicate check cannot miss the wakeup.
    pub(crate) fn stop(&self) {
        let shared = self.shared.lock().unwrap();
        self.stop.store(true, Ordering::Relaxed);
        drop(shared);
        self.cv_write.notify_all();
    }
}

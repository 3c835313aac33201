use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

/// Shuffles examples within one chunk.
///
/// This is the fine-grained half of hierarchical sampling: chunk order is
/// decided by a [`ChunkSelector`](crate::ChunkSelector), while an
/// `ExampleSampler` decides the order in which a loaded chunk's examples
/// are drawn into batches. Together the two approximate a global shuffle
/// without ever holding more than the buffered chunks in memory.
///
/// # Contract
/// - `reset(n)` prepares the sampler to draw from `n` positions.
/// - `next(k)` returns the next `k` indices, each in `[0, n)` and each at
///   most once per `reset`. The buffer never requests more indices than
///   remain, and treats a short or out-of-range answer as a sampler bug.
///
/// The pipeline serializes all sampler access behind the batch buffer's
/// lock, so implementations only need `Send`, not `Sync`.
pub trait ExampleSampler: Send {
    fn reset(&mut self, n: usize);
    fn next(&mut self, k: usize) -> Vec<usize>;
}

/// Draws a fresh random permutation of each chunk.
///
/// The generator is seeded once and its state carries across chunks and
/// epochs, so two samplers created with the same seed produce the same
/// index stream for the same sequence of `reset`/`next` calls.
///
/// # Example
/// ```ignore
/// let mut sampler = RandomExampleSampler::new(42);
/// sampler.reset(5);
/// let order = sampler.next(5); // some permutation of 0..5
/// ```
#[derive(Debug, Clone)]
pub struct RandomExampleSampler {
    rng: StdRng,
    order: Vec<usize>,
    cursor: usize,
}

impl RandomExampleSampler {
    pub fn new(base_seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(base_seed),
            order: Vec::new(),
            cursor: 0,
        }
    }
}

impl ExampleSampler for RandomExampleSampler {
    fn reset(&mut self, n: usize) {
        self.order.clear();
        self.order.extend(0..n);
        self.order.shuffle(&mut self.rng);
        self.cursor = 0;
    }

    fn next(&mut self, k: usize) -> Vec<usize> {
        let end = (self.cursor + k).min(self.order.len());
        let indices = self.order[self.cursor..end].to_vec();
        self.cursor = end;
        indices
    }
}

/// Yields example indices in their original order `(0, 1, 2, ...)`.
///
/// Useful when delivery order must be observable (tests, curriculum-style
/// readers that pre-order their chunks).
#[derive(Debug, Clone, Default)]
pub struct SequentialExampleSampler {
    size: usize,
    cursor: usize,
}

impl SequentialExampleSampler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExampleSampler for SequentialExampleSampler {
    fn reset(&mut self, n: usize) {
        self.size = n;
        self.cursor = 0;
    }

    fn next(&mut self, k: usize) -> Vec<usize> {
        let end = (self.cursor + k).min(self.size);
        let indices = (self.cursor..end).collect();
        self.cursor = end;
        indices
    }
}

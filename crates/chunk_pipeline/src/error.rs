use thiserror::Error;

/// Errors surfaced by the pipeline.
///
/// Reader failures captured on a preloader thread are reified as queue
/// entries and delivered through [`WorkerFailure`](PipelineError::WorkerFailure)
/// in arrival order, so batches enqueued before a failure are still
/// returned to the consumer first.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Construction-time invalid arguments (zero batch size, cache smaller
    /// than one batch, rank not below the replica count, ...).
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// `reset()` has not been called yet for the operation that needs it.
    #[error("reset() needs to be called before calling {operation}()")]
    NotInitialized { operation: &'static str },

    /// `get_batch(n)` was called with a size other than the one the
    /// dataset was created with.
    #[error(
        "the requested batch size ({requested}) does not match the batch size \
         the dataset was created with ({configured})"
    )]
    BatchSizeMismatch { requested: usize, configured: usize },

    /// A chunk reader error captured on a preloader thread.
    #[error("a preloader worker failed while reading a chunk")]
    WorkerFailure(#[source] anyhow::Error),

    /// A preloader thread could not be spawned.
    #[error("failed to spawn preloader worker thread")]
    WorkerSpawn(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

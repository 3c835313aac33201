pub mod dataset;
pub mod error;
pub mod reader;
pub mod sampler;
pub mod selector;

pub use dataset::{ChunkDataset, ChunkDatasetConfig};
pub use error::{PipelineError, Result};
pub use reader::{ChunkReader, InMemoryChunkReader};
pub use sampler::{ExampleSampler, RandomExampleSampler, SequentialExampleSampler};
pub use selector::{ChunkSelector, RandomChunkSelector, SequentialChunkSelector};

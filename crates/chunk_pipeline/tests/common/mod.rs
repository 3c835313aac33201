use anyhow::Result;
use chunk_pipeline::{ChunkDataset, ChunkReader, ExampleSampler};

/// Build chunks of the given sizes with globally unique example values
/// (`chunk_index * 1000 + position`), so conservation checks can compare
/// multisets across any delivery order.
pub fn sized_chunks(sizes: &[usize]) -> Vec<Vec<i64>> {
    sizes
        .iter()
        .enumerate()
        .map(|(chunk, &size)| (0..size).map(|i| (chunk * 1000 + i) as i64).collect())
        .collect()
}

/// Drain one epoch, propagating any worker failure.
pub fn collect_batches<R, S>(
    dataset: &ChunkDataset<R, S>,
    batch_size: usize,
) -> Result<Vec<Vec<i64>>>
where
    R: ChunkReader<Example = i64>,
    S: ExampleSampler,
{
    let mut batches = Vec::new();
    while let Some(batch) = dataset.get_batch(batch_size)? {
        batches.push(batch);
    }
    Ok(batches)
}

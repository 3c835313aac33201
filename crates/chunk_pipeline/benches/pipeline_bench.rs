use chunk_pipeline::{
    ChunkDataset, ChunkDatasetConfig, InMemoryChunkReader, RandomChunkSelector,
    RandomExampleSampler,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

/// Benchmarks for `ChunkDataset` prefetching throughput.
///
/// Measures one full epoch drain (spawn workers, pull every batch,
/// terminate) across preloader counts, so the cost of the worker pool and
/// of buffer contention is visible against the single-worker baseline.

const CHUNK_COUNT: usize = 64;
const CHUNK_SIZE: usize = 256;
const BATCH_SIZE: usize = 32;

fn make_reader() -> InMemoryChunkReader<i64> {
    let chunks = (0..CHUNK_COUNT)
        .map(|chunk| {
            (0..CHUNK_SIZE)
                .map(|i| (chunk * CHUNK_SIZE + i) as i64)
                .collect()
        })
        .collect();
    InMemoryChunkReader::new(chunks)
}

fn bench_epoch_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("Epoch Drain");
    group.throughput(Throughput::Elements((CHUNK_COUNT * CHUNK_SIZE) as u64));

    for &preloaders in &[1usize, 2, 4] {
        group.bench_with_input(
            BenchmarkId::new("preloaders", preloaders),
            &preloaders,
            |b, &preloaders| {
                b.iter(|| {
                    let selector = Arc::new(RandomChunkSelector::new(CHUNK_COUNT, 1, 0).unwrap());
                    let config = ChunkDatasetConfig::builder()
                        .preloader_count(preloaders)
                        .batch_size(BATCH_SIZE)
                        .cache_size(BATCH_SIZE * 8)
                        .build();
                    let mut dataset = ChunkDataset::new(
                        make_reader(),
                        RandomExampleSampler::new(42),
                        selector,
                        config,
                    )
                    .unwrap();
                    dataset.reset().unwrap();

                    let mut total = 0usize;
                    while let Some(batch) = dataset.get_batch(BATCH_SIZE).unwrap() {
                        total += batch.len();
                    }
                    black_box(total);
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_epoch_drain);
criterion_main!(benches);

use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use nnsim::comparator::PairwiseComparator;
use nnsim::distance::DistanceMetric;
use nnsim::index::{NeighborTable, compute_neighbors};
use nnsim::loader::EmbeddingSpace;
use nnsim::metrics::SimilarityMetric;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use std::hint::black_box;
use std::time::Duration;

fn gaussian_space(name: &str, n: usize, dims: usize, seed: u64) -> EmbeddingSpace {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let rows: Vec<Vec<f64>> = (0..n)
        .map(|_| (0..dims).map(|_| rng.sample(StandardNormal)).collect())
        .collect();
    EmbeddingSpace::from_rows(name, &rows).unwrap()
}

fn setup_tables(n: usize, k_max: usize) -> Vec<NeighborTable> {
    (0..3)
        .map(|s| {
            let space = gaussian_space(&format!("space{s}"), n, 32, 42 + s as u64);
            compute_neighbors(&space, DistanceMetric::Minkowski(2), k_max).unwrap()
        })
        .collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("neighbor_table_k=10");
    group.warm_up_time(Duration::from_millis(300));
    group.measurement_time(Duration::from_secs(5));
    group.sample_size(20);

    for &n in &[500usize, 2000] {
        for distance in [DistanceMetric::Minkowski(2), DistanceMetric::Cosine] {
            group.bench_function(BenchmarkId::new(distance.to_string(), n), |b| {
                b.iter_batched(
                    || gaussian_space("bench", n, 32, 7),
                    |space| black_box(compute_neighbors(&space, distance, 10).unwrap()),
                    BatchSize::LargeInput,
                )
            });
        }
    }
    group.finish();

    let mut group = c.benchmark_group("compare_3_spaces");
    group.warm_up_time(Duration::from_millis(300));
    group.measurement_time(Duration::from_secs(5));
    group.sample_size(40);

    let tables = setup_tables(2000, 100);
    for metric in [
        SimilarityMetric::Intersection,
        SimilarityMetric::RankBiasedOverlap(0.9),
        SimilarityMetric::Spearman,
    ] {
        group.bench_function(BenchmarkId::new(metric.to_string(), "at=5,10,100"), |b| {
            b.iter(|| {
                let comparator = PairwiseComparator::new(&tables, &[5, 10, 100], &[metric]).unwrap();
                black_box(comparator.run())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);

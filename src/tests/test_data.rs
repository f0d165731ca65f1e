use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::index::NeighborTable;
use crate::loader::EmbeddingSpace;

/// `n × dims` standard-normal rows, reproducible from `seed`.
pub fn gaussian_rows(n: usize, dims: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dims).map(|_| StandardNormal.sample(&mut rng)).collect())
        .collect()
}

pub fn gaussian_space(name: &str, n: usize, dims: usize, seed: u64) -> EmbeddingSpace {
    EmbeddingSpace::from_rows(name, &gaussian_rows(n, dims, seed)).unwrap()
}

/// Every value multiplied by `factor`. A power-of-two factor scales every
/// Euclidean distance exactly, so neighbour lists are unchanged.
pub fn scaled(rows: &[Vec<f64>], factor: f64) -> Vec<Vec<f64>> {
    rows.iter()
        .map(|r| r.iter().map(|v| v * factor).collect())
        .collect()
}

/// 3-NN lists over 10 items built from ring offsets.
pub fn ring_table(space: &str, offsets: [usize; 3]) -> NeighborTable {
    let lists = (0..10)
        .map(|i| offsets.iter().map(|o| (i + o) % 10).collect())
        .collect();
    NeighborTable::from_lists(space, lists).unwrap()
}

/// Reference table `a`, an identical copy, a table sharing no neighbour
/// with `a` and one sharing exactly one neighbour per item.
pub fn ring_tables() -> Vec<NeighborTable> {
    vec![
        ring_table("a", [1, 2, 3]),
        ring_table("same", [1, 2, 3]),
        ring_table("disjoint", [4, 5, 6]),
        ring_table("one", [1, 5, 6]),
    ]
}

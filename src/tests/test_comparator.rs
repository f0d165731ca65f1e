use approx::assert_relative_eq;

use crate::comparator::{mean_defined, PairwiseComparator};
use crate::error::NnSimError;
use crate::metrics::SimilarityMetric;
use crate::tests::init;
use crate::tests::test_data::{ring_table, ring_tables};

#[test]
fn test_three_nn_scenarios() {
    init();
    let tables = ring_tables();
    let comparator =
        PairwiseComparator::new(&tables, &[3], &[SimilarityMetric::Intersection]).unwrap();
    let m = SimilarityMetric::Intersection;

    let same = comparator.compare(&tables[0], &tables[1], 3, m);
    assert_eq!(same.similarity, 1.0);
    assert_eq!(same.excluded, 0);

    let disjoint = comparator.compare(&tables[0], &tables[2], 3, m);
    assert_eq!(disjoint.similarity, 0.0);

    let one = comparator.compare(&tables[0], &tables[3], 3, m);
    assert_relative_eq!(one.similarity, 1.0 / 3.0, epsilon = 1e-12);
}

#[test]
fn test_identical_tables_under_every_metric() {
    let tables = ring_tables();
    let metrics = [
        SimilarityMetric::Intersection,
        SimilarityMetric::RankBiasedOverlap(0.9),
        SimilarityMetric::Spearman,
    ];
    let comparator = PairwiseComparator::new(&tables[..2], &[2, 3], &metrics).unwrap();
    for r in comparator.run() {
        assert_relative_eq!(r.similarity, 1.0, epsilon = 1e-12);
        assert_eq!(r.excluded, 0);
    }
}

#[test]
fn test_result_order() {
    let tables = ring_tables();
    let metrics = [SimilarityMetric::Intersection, SimilarityMetric::Spearman];
    let comparator = PairwiseComparator::new(&tables[..3], &[3, 1, 3], &metrics).unwrap();
    assert_eq!(comparator.cutoffs(), &[1, 3]);
    assert_eq!(comparator.pairs(), vec![(0, 1), (0, 2), (1, 2)]);

    let rows = comparator.run();
    assert_eq!(rows.len(), 3 * 2 * 2);
    let keys: Vec<(&str, &str, usize, SimilarityMetric)> = rows
        .iter()
        .map(|r| (r.src.as_str(), r.dst.as_str(), r.k, r.metric))
        .collect();
    assert_eq!(keys[0], ("a", "same", 1, SimilarityMetric::Intersection));
    assert_eq!(keys[1], ("a", "same", 1, SimilarityMetric::Spearman));
    assert_eq!(keys[2], ("a", "same", 3, SimilarityMetric::Intersection));
    assert_eq!(keys[4], ("a", "disjoint", 1, SimilarityMetric::Intersection));
    assert_eq!(keys[11], ("same", "disjoint", 3, SimilarityMetric::Spearman));
}

#[test]
fn test_undefined_scores_are_excluded() {
    init();
    let tables = ring_tables();
    let comparator =
        PairwiseComparator::new(&tables, &[1], &[SimilarityMetric::Spearman]).unwrap();

    // one identical neighbour per item: a single ranked item everywhere
    let same = comparator.compare(&tables[0], &tables[1], 1, SimilarityMetric::Spearman);
    assert!(same.similarity.is_nan());
    assert_eq!(same.excluded, 10);

    // different first neighbours: two ranked items, perfectly reversed
    let disjoint = comparator.compare(&tables[0], &tables[2], 1, SimilarityMetric::Spearman);
    assert_relative_eq!(disjoint.similarity, -1.0);
    assert_eq!(disjoint.excluded, 0);
}

#[test]
fn test_invalid_configuration() {
    let tables = ring_tables();
    let m = [SimilarityMetric::Intersection];
    assert!(PairwiseComparator::new(&tables, &[4], &m).unwrap_err().is_config());
    assert!(PairwiseComparator::new(&tables, &[0, 2], &m).unwrap_err().is_config());
    assert!(PairwiseComparator::new(&tables, &[], &m).unwrap_err().is_config());
    assert!(PairwiseComparator::new(&tables, &[2], &[]).unwrap_err().is_config());
    assert!(
        PairwiseComparator::new(&tables, &[2], &[SimilarityMetric::RankBiasedOverlap(1.5)])
            .unwrap_err()
            .is_config()
    );

    let mut short = tables.clone();
    short.push(crate::index::NeighborTable::from_lists("tiny", vec![vec![1], vec![0]]).unwrap());
    assert!(PairwiseComparator::new(&short, &[1], &m).is_err());

    let pair = vec![ring_table("a", [1, 2, 3]), {
        let lists = (0..9).map(|i| vec![(i + 1) % 9, (i + 2) % 9, (i + 3) % 9]).collect();
        crate::index::NeighborTable::from_lists("nine", lists).unwrap()
    }];
    assert!(matches!(
        PairwiseComparator::new(&pair, &[3], &m),
        Err(NnSimError::ItemCountMismatch { expected: 10, got: 9, .. })
    ));
}

#[test]
fn test_deterministic_runs() {
    let tables = ring_tables();
    let metrics = [
        SimilarityMetric::Intersection,
        SimilarityMetric::RankBiasedOverlap(0.8),
        SimilarityMetric::Spearman,
    ];
    let comparator = PairwiseComparator::new(&tables, &[1, 2, 3], &metrics).unwrap();
    let first = comparator.run();
    for _ in 0..3 {
        let again = comparator.run();
        for (a, b) in first.iter().zip(&again) {
            assert_eq!(a.similarity.to_bits(), b.similarity.to_bits());
            assert_eq!(a.excluded, b.excluded);
        }
    }
}

#[test]
fn test_mean_defined() {
    assert_eq!(mean_defined(&[Some(1.0), None, Some(0.0)]), (0.5, 1));
    let (mean, excluded) = mean_defined(&[None, None]);
    assert!(mean.is_nan());
    assert_eq!(excluded, 2);
    assert!(mean_defined(&[]).0.is_nan());
}

use std::fs;
use std::path::Path;

use log::debug;

use crate::builder::{AnalysisBuilder, AnalysisParams, DEFAULT_CUTOFFS};
use crate::distance::DistanceMetric;
use crate::error::NnSimError;
use crate::loader::{npy_bytes_f64, EmbeddingSpace};
use crate::metrics::SimilarityMetric;
use crate::tests::init;
use crate::tests::test_data::{gaussian_rows, scaled};

/// Three spaces over 40 items: `base`, an exactly rescaled copy and an
/// unrelated one. Returns the registry path.
fn write_fixture(dir: &Path) -> std::path::PathBuf {
    let base = gaussian_rows(40, 6, 21);
    fs::write(dir.join("base.npy"), npy_bytes_f64(&base)).unwrap();
    fs::write(dir.join("double.npy"), npy_bytes_f64(&scaled(&base, 2.0))).unwrap();
    let other: String = gaussian_rows(40, 3, 99)
        .iter()
        .map(|r| {
            r.iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ")
                + "\n"
        })
        .collect();
    fs::write(dir.join("other.txt"), other).unwrap();

    let registry = dir.join("spaces.csv");
    fs::write(
        &registry,
        "# name,file\nNAME,FILE\nbase,base.npy\ndouble,double.npy\nother,other.txt\n",
    )
    .unwrap();
    registry
}

#[test]
fn test_default_params() {
    let params = AnalysisParams::default();
    assert_eq!(params.cutoffs, DEFAULT_CUTOFFS.to_vec());
    assert_eq!(params.k_max(), 200);
    assert_eq!(params.distance, DistanceMetric::Minkowski(2));
    assert_eq!(params.metrics, vec![SimilarityMetric::Intersection]);
    assert!(params.validate().is_ok());
}

#[test]
fn test_end_to_end_from_registry() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let registry = write_fixture(dir.path());

    let builder = AnalysisBuilder::new()
        .with_cutoffs(&[5, 2, 5])
        .with_metrics(&[SimilarityMetric::Intersection, SimilarityMetric::Spearman]);
    assert_eq!(builder.params().cutoffs, vec![2, 5]);

    let table = builder.run(&registry, dir.path()).unwrap();
    assert_eq!(table.len(), 3 * 2 * 2);
    assert_eq!(table.names(), vec!["base", "double", "other"]);

    for k in [2, 5] {
        for metric in [SimilarityMetric::Intersection, SimilarityMetric::Spearman] {
            let same = table.similarity("base", "double", k, metric).unwrap();
            assert_eq!(same, 1.0, "rescaled copy @{} ({})", k, metric);
            let other = table.similarity("base", "other", k, metric).unwrap();
            debug!("base vs other @{} ({}): {}", k, metric, other);
            assert!(other < 1.0);
        }
    }

    let m = table.matrix(5, SimilarityMetric::Intersection);
    assert_eq!(m.get("double", "base"), Some(1.0));
    assert_eq!(m.get("other", "other"), Some(1.0));
}

#[test]
fn test_runs_are_deterministic() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let registry = write_fixture(dir.path());
    let builder = AnalysisBuilder::new()
        .with_cutoffs(&[1, 4, 8])
        .with_metrics(&[
            SimilarityMetric::Intersection,
            SimilarityMetric::RankBiasedOverlap(0.9),
            SimilarityMetric::Spearman,
        ])
        .with_cache_dir(dir.path().join("cache"));

    let cold = builder.run(&registry, dir.path()).unwrap();
    let warm = builder.run(&registry, dir.path()).unwrap();
    assert_eq!(cold.len(), warm.len());
    for (a, b) in cold.rows().iter().zip(warm.rows()) {
        assert_eq!((&a.src, &a.dst, a.k, a.metric), (&b.src, &b.dst, b.k, b.metric));
        assert_eq!(a.similarity.to_bits(), b.similarity.to_bits());
        assert_eq!(a.excluded, b.excluded);
    }
}

#[test]
fn test_row_subset() {
    let dir = tempfile::tempdir().unwrap();
    let registry = write_fixture(dir.path());
    let indices: Vec<usize> = (0..40).step_by(2).collect();
    fs::write(
        dir.path().join("idx.txt"),
        indices.iter().map(|i| format!("{}\n", i)).collect::<String>(),
    )
    .unwrap();

    let from_file = AnalysisBuilder::new()
        .with_cutoffs(&[3])
        .with_indices_file(dir.path().join("idx.txt"))
        .run(&registry, dir.path())
        .unwrap();
    let in_memory = AnalysisBuilder::new().with_cutoffs(&[3]).with_indices(indices);

    let spaces = AnalysisBuilder::new().load(&registry, dir.path()).unwrap();
    assert_eq!(spaces[0].nitems(), 40);
    let subset = in_memory.run_spaces(&spaces).unwrap();
    assert_eq!(from_file, subset);
    assert_eq!(
        subset.similarity("base", "double", 3, SimilarityMetric::Intersection),
        Some(1.0)
    );
}

#[test]
fn test_configuration_rejected_before_loading() {
    let missing = Path::new("/nonexistent/spaces.csv");
    let dir = Path::new("/nonexistent");

    let err = AnalysisBuilder::new()
        .with_cutoffs(&[0, 5])
        .run(missing, dir)
        .unwrap_err();
    assert!(err.is_config(), "{}", err);

    let err = AnalysisBuilder::new()
        .with_metric(SimilarityMetric::RankBiasedOverlap(0.0))
        .run(missing, dir)
        .unwrap_err();
    assert!(err.is_config(), "{}", err);

    let err = AnalysisBuilder::new().with_metrics(&[]).run(missing, dir).unwrap_err();
    assert!(err.is_config(), "{}", err);

    // valid configuration reaches the loader
    assert!(matches!(
        AnalysisBuilder::new().run(missing, dir).unwrap_err(),
        NnSimError::Input { .. }
    ));
}

#[test]
fn test_cutoff_must_leave_room() {
    let rows = gaussian_rows(6, 2, 3);
    let spaces = vec![
        EmbeddingSpace::from_rows("a", &rows).unwrap(),
        EmbeddingSpace::from_rows("b", &scaled(&rows, 4.0)).unwrap(),
    ];
    let err = AnalysisBuilder::new()
        .with_cutoffs(&[6])
        .run_spaces(&spaces)
        .unwrap_err();
    assert!(err.is_config(), "{}", err);

    let ok = AnalysisBuilder::new()
        .with_cutoffs(&[5])
        .with_distance(DistanceMetric::Cosine)
        .run_spaces(&spaces)
        .unwrap();
    // all five other items at k = n - 1
    assert_eq!(ok.rows()[0].similarity, 1.0);
}

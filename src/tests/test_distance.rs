use approx::assert_relative_eq;
use smartcore::metrics::distance::Distance;

use crate::distance::DistanceMetric;

#[test]
fn test_minkowski_family() {
    let (a, b) = (vec![0.0, 0.0], vec![3.0, 4.0]);
    assert_relative_eq!(DistanceMetric::Minkowski(2).eval(&a, &b), 5.0);
    assert_relative_eq!(DistanceMetric::Minkowski(1).eval(&a, &b), 7.0);
    assert_relative_eq!(
        DistanceMetric::Minkowski(3).eval(&a, &b),
        (27.0f64 + 64.0).powf(1.0 / 3.0),
        epsilon = 1e-12
    );
    // smartcore entry point agrees
    assert_eq!(
        DistanceMetric::Minkowski(2).distance(&a, &b),
        DistanceMetric::Minkowski(2).eval(&a, &b)
    );
}

#[test]
fn test_cosine() {
    let d = DistanceMetric::Cosine;
    assert_relative_eq!(d.eval(&[1.0, 0.0], &[0.0, 2.0]), 1.0);
    assert_relative_eq!(d.eval(&[1.0, 1.0], &[2.0, 2.0]), 0.0, epsilon = 1e-12);
    assert_relative_eq!(d.eval(&[1.0, 0.0], &[-1.0, 0.0]), 2.0);
    assert_eq!(d.eval(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
}

#[test]
fn test_symmetry() {
    let (a, b) = (vec![0.3, -1.2, 4.0], vec![2.5, 0.1, -0.7]);
    for d in [
        DistanceMetric::Minkowski(1),
        DistanceMetric::Minkowski(2),
        DistanceMetric::Minkowski(4),
        DistanceMetric::Cosine,
    ] {
        assert_eq!(d.eval(&a, &b), d.eval(&b, &a), "{} not symmetric", d);
    }
}

#[test]
fn test_distance_tags() {
    let parse = |s: &str| s.parse::<DistanceMetric>().unwrap();
    assert_eq!(parse("minkowski"), DistanceMetric::Minkowski(2));
    assert_eq!(parse("Euclidean"), DistanceMetric::Minkowski(2));
    assert_eq!(parse("manhattan"), DistanceMetric::Minkowski(1));
    assert_eq!(parse("minkowski:3"), DistanceMetric::Minkowski(3));
    assert_eq!(parse("cosine"), DistanceMetric::Cosine);
    assert!("minkowski:0".parse::<DistanceMetric>().unwrap_err().is_config());
    assert!("hamming".parse::<DistanceMetric>().unwrap_err().is_config());

    assert_eq!(DistanceMetric::default().to_string(), "minkowski:2");
    assert!(DistanceMetric::Minkowski(1).is_metric());
    assert!(!DistanceMetric::Cosine.is_metric());
}

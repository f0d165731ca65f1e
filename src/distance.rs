//! Distance metrics used to build per-space neighbour structures.
//!
//! `DistanceMetric` implements smartcore's `Distance` so it can be handed
//! directly to `CoverTree` and `LinearKNNSearch`. Every variant is
//! symmetric bit-for-bit: `d(a, b)` and `d(b, a)` evaluate the same
//! floating point operations, which keeps tie detection stable.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smartcore::metrics::distance::Distance;

use crate::error::NnSimError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Minkowski distance of order `p` (`p = 2` is Euclidean, `p = 1` Manhattan).
    Minkowski(u16),
    /// `1 - cos(a, b)`; zero vectors are at distance 1 from everything.
    Cosine,
}

impl Default for DistanceMetric {
    fn default() -> Self {
        DistanceMetric::Minkowski(2)
    }
}

impl DistanceMetric {
    /// True when the triangle inequality holds, which a cover tree needs.
    #[inline]
    pub fn is_metric(&self) -> bool {
        matches!(self, DistanceMetric::Minkowski(p) if *p >= 1)
    }

    pub fn eval(&self, a: &[f64], b: &[f64]) -> f64 {
        debug_assert_eq!(a.len(), b.len(), "Dimension mismatch");
        match *self {
            DistanceMetric::Minkowski(1) => a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum(),
            DistanceMetric::Minkowski(2) => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f64>()
                .sqrt(),
            DistanceMetric::Minkowski(p) => {
                let p = p as f64;
                a.iter()
                    .zip(b)
                    .map(|(x, y)| (x - y).abs().powf(p))
                    .sum::<f64>()
                    .powf(1.0 / p)
            }
            DistanceMetric::Cosine => {
                let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let na: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
                let nb: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
                if na == 0.0 || nb == 0.0 {
                    return 1.0;
                }
                (1.0 - dot / (na * nb)).max(0.0)
            }
        }
    }
}

impl Distance<Vec<f64>> for DistanceMetric {
    fn distance(&self, a: &Vec<f64>, b: &Vec<f64>) -> f64 {
        self.eval(a, b)
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::Minkowski(p) => write!(f, "minkowski:{}", p),
            DistanceMetric::Cosine => write!(f, "cosine"),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = NnSimError;

    /// Accepts `minkowski`, `minkowski:<p>`, `euclidean`, `l2`,
    /// `manhattan`, `l1`, `cityblock` and `cosine`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let (name, arg) = match lower.split_once(':') {
            Some((n, a)) => (n, Some(a)),
            None => (lower.as_str(), None),
        };
        match (name, arg) {
            ("minkowski", None) | ("euclidean", None) | ("l2", None) => {
                Ok(DistanceMetric::Minkowski(2))
            }
            ("manhattan", None) | ("l1", None) | ("cityblock", None) => {
                Ok(DistanceMetric::Minkowski(1))
            }
            ("minkowski", Some(p)) => match p.parse::<u16>() {
                Ok(p) if p >= 1 => Ok(DistanceMetric::Minkowski(p)),
                _ => Err(NnSimError::config(format!(
                    "minkowski order must be an integer >= 1, got '{}'",
                    p
                ))),
            },
            ("cosine", None) => Ok(DistanceMetric::Cosine),
            _ => Err(NnSimError::config(format!("unknown distance metric '{}'", s))),
        }
    }
}

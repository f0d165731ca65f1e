//! Similarity between two neighbour lists truncated to the same cutoff.
//!
//! - `Intersection`: `|src ∩ dst| / k`, order ignored, range `[0, 1]`.
//! - `RankBiasedOverlap(p)`: extrapolated rank-biased overlap with
//!   persistence `p`; agreement at shallow depths weighs more. Range
//!   `[0, 1]`, and exactly 1 for identical lists. `p = 1` gives the plain
//!   average overlap `mean_d(X_d / d)`, without extrapolation.
//! - `Spearman`: rank correlation over the union of both lists, where an
//!   item missing from a list gets the penalty rank `len(list)`. Ranks are
//!   re-ranked with averaged ties before the Pearson correlation, so the
//!   penalty rank is shared by all absent items. Range `[-1, 1]`.
//!
//! Every metric is pure. `None` marks an undefined score (e.g. Spearman over
//! fewer than two distinct items); the comparator excludes and counts those.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{NnSimError, Result};

/// Default persistence for rank-biased overlap.
pub const RBO_PERSISTENCE: f64 = 0.9;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum SimilarityMetric {
    #[default]
    Intersection,
    RankBiasedOverlap(f64),
    Spearman,
}

impl SimilarityMetric {
    /// Score two lists truncated to the same cutoff.
    pub fn score(&self, src: &[usize], dst: &[usize]) -> Option<f64> {
        debug_assert_eq!(src.len(), dst.len(), "lists must share the cutoff");
        match *self {
            SimilarityMetric::Intersection => intersect(src, dst),
            SimilarityMetric::RankBiasedOverlap(p) => rank_biased_overlap(src, dst, p),
            SimilarityMetric::Spearman => spearman(src, dst),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            SimilarityMetric::RankBiasedOverlap(p) if !(p > 0.0 && p <= 1.0) => Err(
                NnSimError::config(format!("RBO persistence must lie in (0, 1], got {}", p)),
            ),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimilarityMetric::Intersection => write!(f, "intersect"),
            SimilarityMetric::RankBiasedOverlap(p) => write!(f, "rbo:{}", p),
            SimilarityMetric::Spearman => write!(f, "spearman"),
        }
    }
}

impl FromStr for SimilarityMetric {
    type Err = NnSimError;

    /// Accepts `intersect`, `rbo`, `rbo:<p>` and `spearman`.
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        let metric = match lower.split_once(':') {
            None if lower == "intersect" || lower == "intersection" => {
                SimilarityMetric::Intersection
            }
            None if lower == "rbo" => SimilarityMetric::RankBiasedOverlap(RBO_PERSISTENCE),
            None if lower == "spearman" => SimilarityMetric::Spearman,
            Some(("rbo", p)) => match p.parse::<f64>() {
                Ok(p) => SimilarityMetric::RankBiasedOverlap(p),
                Err(_) => {
                    return Err(NnSimError::config(format!(
                        "invalid RBO persistence '{}'",
                        p
                    )))
                }
            },
            _ => return Err(NnSimError::config(format!("unknown similarity metric '{}'", s))),
        };
        metric.validate()?;
        Ok(metric)
    }
}

/// Fraction of `src` also present in `dst`.
pub fn intersect(src: &[usize], dst: &[usize]) -> Option<f64> {
    if src.is_empty() {
        return None;
    }
    let dst: HashSet<usize> = dst.iter().copied().collect();
    let common = src.iter().filter(|i| dst.contains(i)).count();
    Some(common as f64 / src.len() as f64)
}

/// Extrapolated rank-biased overlap (Webber et al., 2010) at depth
/// `k = min(|src|, |dst|)`:
///
/// `RBO_ext = (X_k / k) p^k + (1 - p) / p * Σ_{d=1..k} (X_d / d) p^d`
///
/// where `X_d` is the size of the overlap of the two depth-`d` prefixes.
/// With `p = 1` the weights vanish and the average overlap
/// `(1 / k) Σ_{d=1..k} X_d / d` is returned instead.
pub fn rank_biased_overlap(src: &[usize], dst: &[usize], p: f64) -> Option<f64> {
    let k = src.len().min(dst.len());
    if k == 0 {
        return None;
    }

    let mut seen_src: HashSet<usize> = HashSet::with_capacity(k);
    let mut seen_dst: HashSet<usize> = HashSet::with_capacity(k);
    let mut overlap = 0usize;
    let mut weighted = 0.0;
    let mut agreement_sum = 0.0;
    let mut p_d = 1.0;

    for d in 0..k {
        let (s, t) = (src[d], dst[d]);
        if s == t {
            overlap += 1;
        } else {
            if seen_dst.contains(&s) {
                overlap += 1;
            }
            if seen_src.contains(&t) {
                overlap += 1;
            }
        }
        seen_src.insert(s);
        seen_dst.insert(t);

        let agreement = overlap as f64 / (d + 1) as f64;
        agreement_sum += agreement;
        p_d *= p;
        weighted += agreement * p_d;
    }

    if p >= 1.0 {
        return Some((agreement_sum / k as f64).clamp(0.0, 1.0));
    }

    let agreement_k = overlap as f64 / k as f64;
    let rbo = agreement_k * p_d + (1.0 - p) / p * weighted;
    Some(rbo.clamp(0.0, 1.0))
}

/// Spearman rank correlation over the union of both lists.
///
/// Returns `None` when the union holds fewer than two items or when either
/// rank vector is constant.
pub fn spearman(src: &[usize], dst: &[usize]) -> Option<f64> {
    let union: BTreeSet<usize> = src.iter().chain(dst).copied().collect();
    if union.len() < 2 {
        return None;
    }

    let src_pos: HashMap<usize, usize> = src.iter().enumerate().map(|(r, &i)| (i, r)).collect();
    let dst_pos: HashMap<usize, usize> = dst.iter().enumerate().map(|(r, &i)| (i, r)).collect();

    let src_ranks: Vec<f64> = union
        .iter()
        .map(|i| src_pos.get(i).copied().unwrap_or(src.len()) as f64)
        .collect();
    let dst_ranks: Vec<f64> = union
        .iter()
        .map(|i| dst_pos.get(i).copied().unwrap_or(dst.len()) as f64)
        .collect();

    pearson(&average_ranks(&src_ranks), &average_ranks(&dst_ranks))
}

/// Fractional ranking: tied values share the mean of their positions.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // positions start..end (0-based) → mean 1-based rank
        let rank = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        start = end;
    }
    ranks
}

fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len() as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let (dx, dy) = (a - mx, b - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

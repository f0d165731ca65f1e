//! Pairwise comparison of neighbour tables.
//!
//! For every unordered pair of spaces (input order, `i < j`), every cutoff
//! (ascending) and every metric, each item's two neighbour lists are
//! truncated to `k` and scored; the per-item scores are averaged into one
//! `PairResult`.
//!
//! Items whose score is undefined are left out of the mean and reported in
//! `PairResult::excluded`. If every item is excluded the similarity is NaN.
//!
//! **DETERMINISTIC**: item scores are computed in parallel but collected in
//! item order and summed sequentially, so repeated runs produce identical
//! bits.

use log::{debug, info, trace, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{NnSimError, Result};
use crate::index::NeighborTable;
use crate::metrics::SimilarityMetric;

/// Mean similarity of one space pair at one cutoff under one metric.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PairResult {
    pub src: String,
    pub dst: String,
    /// Cutoff the neighbour lists were truncated to.
    pub k: usize,
    pub metric: SimilarityMetric,
    pub similarity: f64,
    /// Items left out of the mean because their score was undefined.
    pub excluded: usize,
}

#[derive(Debug)]
pub struct PairwiseComparator<'a> {
    tables: &'a [NeighborTable],
    cutoffs: Vec<usize>,
    metrics: Vec<SimilarityMetric>,
}

impl<'a> PairwiseComparator<'a> {
    /// Validate the inputs of a comparison run.
    ///
    /// Cutoffs are sorted and deduplicated; each must lie in `1..=k_max` of
    /// every table. All tables must cover the same items.
    pub fn new(
        tables: &'a [NeighborTable],
        cutoffs: &[usize],
        metrics: &[SimilarityMetric],
    ) -> Result<Self> {
        if metrics.is_empty() {
            return Err(NnSimError::config("no similarity metric requested"));
        }
        for m in metrics {
            m.validate()?;
        }

        let mut cutoffs = cutoffs.to_vec();
        cutoffs.sort_unstable();
        cutoffs.dedup();
        let k_limit = tables.iter().map(|t| t.k_max).min().unwrap_or(0);
        match (cutoffs.first(), cutoffs.last()) {
            (Some(&lo), Some(&hi)) if lo >= 1 && hi <= k_limit => {}
            (Some(_), Some(&hi)) => {
                return Err(NnSimError::config(format!(
                    "cutoffs must lie in 1..={}, got up to {}",
                    k_limit, hi
                )))
            }
            _ => return Err(NnSimError::config("no cutoff requested")),
        }

        if let Some(first) = tables.first() {
            for t in &tables[1..] {
                if t.nitems() != first.nitems() {
                    return Err(NnSimError::ItemCountMismatch {
                        space: t.space.clone(),
                        expected: first.nitems(),
                        got: t.nitems(),
                    });
                }
            }
        }
        if tables.len() < 2 {
            warn!("Fewer than two spaces given, nothing to compare");
        }

        debug!("Comparator: cutoffs={:?}, metrics={:?}", cutoffs, metrics);
        Ok(Self {
            tables,
            cutoffs,
            metrics: metrics.to_vec(),
        })
    }

    pub fn cutoffs(&self) -> &[usize] {
        &self.cutoffs
    }

    /// Unordered space pairs `(i, j)`, `i < j`, in input order.
    pub fn pairs(&self) -> Vec<(usize, usize)> {
        let n = self.tables.len();
        (0..n)
            .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
            .collect()
    }

    /// Score one pair at one cutoff.
    pub fn compare(
        &self,
        src: &NeighborTable,
        dst: &NeighborTable,
        k: usize,
        metric: SimilarityMetric,
    ) -> PairResult {
        let scores: Vec<Option<f64>> = (0..src.nitems())
            .into_par_iter()
            .map(|i| metric.score(src.at(i, k), dst.at(i, k)))
            .collect();
        let (similarity, excluded) = mean_defined(&scores);

        if excluded > 0 {
            warn!(
                "{} vs {} @{} ({}): {} of {} items undefined and excluded",
                src.space,
                dst.space,
                k,
                metric,
                excluded,
                scores.len()
            );
        }
        trace!(
            "{} vs {} @{} ({}): {:.6}",
            src.space,
            dst.space,
            k,
            metric,
            similarity
        );

        PairResult {
            src: src.space.clone(),
            dst: dst.space.clone(),
            k,
            metric,
            similarity,
            excluded,
        }
    }

    /// Every (pair, cutoff, metric) result, pair-major then cutoff then
    /// metric.
    pub fn run(&self) -> Vec<PairResult> {
        let pairs = self.pairs();
        info!(
            "Comparing {} space pairs at cutoffs {:?} with {} metric(s)",
            pairs.len(),
            self.cutoffs,
            self.metrics.len()
        );

        let mut results = Vec::with_capacity(pairs.len() * self.cutoffs.len() * self.metrics.len());
        for (i, j) in pairs {
            let (src, dst) = (&self.tables[i], &self.tables[j]);
            for &k in &self.cutoffs {
                for &metric in &self.metrics {
                    results.push(self.compare(src, dst, k, metric));
                }
            }
        }
        results
    }
}

/// Arithmetic mean of the defined scores and the number of undefined ones.
/// NaN when nothing is defined.
pub fn mean_defined(scores: &[Option<f64>]) -> (f64, usize) {
    let (sum, count) = scores
        .iter()
        .flatten()
        .fold((0.0, 0usize), |(s, c), &v| (s + v, c + 1));
    let excluded = scores.len() - count;
    if count == 0 {
        (f64::NAN, excluded)
    } else {
        (sum / count as f64, excluded)
    }
}

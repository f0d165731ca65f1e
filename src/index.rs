//! Per-space k-nearest-neighbour structure.
//!
//! `NeighborIndex` wraps an off-the-shelf smartcore search structure:
//! a `CoverTree` for true metrics (Minkowski family) and a
//! `LinearKNNSearch` for cosine distance, which breaks the triangle
//! inequality the cover tree relies on. The index is built once per space
//! and answers every cutoff `k <= K_max`.
//!
//! Neighbour lists are ordered by `(distance, item index)`. Equidistant
//! items are therefore ordered by index, which makes lists reproducible and
//! gives the monotonic-prefix property: the first `k'` entries of a
//! `K_max` list equal the list obtained by querying `k'` directly.
//!
//! ## Complexity
//! - cover tree: build `O(n log n)`, query `O(log n)` expected per item
//! - linear search: query `O(n d)` per item
//!
//! All item queries of a space run in parallel with rayon; spaces are also
//! indexed in parallel and joined before comparison starts.

use std::cmp::Ordering;

use log::{debug, info, trace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smartcore::algorithm::neighbour::cover_tree::CoverTree;
use smartcore::algorithm::neighbour::linear_search::LinearKNNSearch;

use crate::cache::NeighborCache;
use crate::distance::DistanceMetric;
use crate::error::{NnSimError, Result};
use crate::loader::EmbeddingSpace;

/// For every item of one space, its `k_max` nearest other items,
/// nearest first, self excluded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborTable {
    pub space: String,
    pub k_max: usize,
    neighbors: Vec<Vec<usize>>,
}

impl NeighborTable {
    /// Build a table from explicit neighbour lists.
    ///
    /// Every list must have the same length, contain no duplicates, stay in
    /// range and never contain its own item.
    pub fn from_lists(space: impl Into<String>, neighbors: Vec<Vec<usize>>) -> Result<Self> {
        let space = space.into();
        let n = neighbors.len();
        let k_max = neighbors.first().map(|l| l.len()).unwrap_or(0);
        for (i, list) in neighbors.iter().enumerate() {
            if list.len() != k_max {
                return Err(NnSimError::config(format!(
                    "space '{}': item {} has {} neighbours, expected {}",
                    space,
                    i,
                    list.len(),
                    k_max
                )));
            }
            for (pos, &j) in list.iter().enumerate() {
                if j >= n || j == i || list[..pos].contains(&j) {
                    return Err(NnSimError::config(format!(
                        "space '{}': invalid neighbour {} for item {}",
                        space, j, i
                    )));
                }
            }
        }
        Ok(Self {
            space,
            k_max,
            neighbors,
        })
    }

    #[inline]
    pub fn nitems(&self) -> usize {
        self.neighbors.len()
    }

    /// Full `k_max` list of item `i`.
    #[inline]
    pub fn list(&self, i: usize) -> &[usize] {
        &self.neighbors[i]
    }

    /// List of item `i` truncated to the cutoff `k`.
    ///
    /// # Panics
    /// Panics if `k > k_max`; callers validate cutoffs up front.
    #[inline]
    pub fn at(&self, i: usize, k: usize) -> &[usize] {
        assert!(
            k <= self.k_max,
            "cutoff {} exceeds k_max {}",
            k,
            self.k_max
        );
        &self.neighbors[i][..k]
    }

    /// Re-check lists that did not come from `from_lists`, e.g. a
    /// deserialized table.
    pub(crate) fn validated(self) -> Result<Self> {
        let table = Self::from_lists(self.space, self.neighbors)?;
        if table.k_max != self.k_max {
            return Err(NnSimError::config(format!(
                "space '{}': lists hold {} neighbours, table claims {}",
                table.space, table.k_max, self.k_max
            )));
        }
        Ok(table)
    }

    /// A copy of the table truncated to `k` neighbours per item.
    pub fn truncated(&self, k: usize) -> Result<Self> {
        if k > self.k_max {
            return Err(NnSimError::config(format!(
                "cutoff {} exceeds the {} neighbours computed for '{}'",
                k, self.k_max, self.space
            )));
        }
        Ok(Self {
            space: self.space.clone(),
            k_max: k,
            neighbors: self.neighbors.iter().map(|l| l[..k].to_vec()).collect(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &[usize]> {
        self.neighbors.iter().map(|l| l.as_slice())
    }
}

enum Searcher {
    Cover(CoverTree<Vec<f64>, DistanceMetric>),
    Linear(LinearKNNSearch<Vec<f64>, DistanceMetric>),
}

/// k-NN query structure over one space's items.
pub struct NeighborIndex {
    rows: Vec<Vec<f64>>,
    distance: DistanceMetric,
    searcher: Searcher,
}

impl NeighborIndex {
    pub fn build(space: &EmbeddingSpace, distance: DistanceMetric) -> Result<Self> {
        let rows = space.rows();
        debug!(
            "Building {} index for '{}' ({} items × {} features)",
            if distance.is_metric() { "cover-tree" } else { "linear" },
            space.name,
            space.nitems(),
            space.nfeatures()
        );
        let searcher = if distance.is_metric() {
            Searcher::Cover(
                CoverTree::new(rows.clone(), distance)
                    .map_err(|e| NnSimError::config(format!("cover tree: {}", e)))?,
            )
        } else {
            Searcher::Linear(
                LinearKNNSearch::new(rows.clone(), distance)
                    .map_err(|e| NnSimError::config(format!("linear search: {}", e)))?,
            )
        };
        Ok(Self {
            rows,
            distance,
            searcher,
        })
    }

    #[inline]
    pub fn nitems(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn distance(&self) -> DistanceMetric {
        self.distance
    }

    fn find(&self, point: &Vec<f64>, k: usize) -> Result<Vec<(usize, f64)>> {
        let found = match &self.searcher {
            Searcher::Cover(tree) => tree.find(point, k),
            Searcher::Linear(lin) => lin.find(point, k),
        }
        .map_err(|e| NnSimError::config(format!("k-NN query failed: {}", e)))?;
        Ok(found.into_iter().map(|(j, d, _)| (j, d)).collect())
    }

    fn find_radius(&self, point: &Vec<f64>, radius: f64) -> Result<Vec<(usize, f64)>> {
        let found = match &self.searcher {
            Searcher::Cover(tree) => tree.find_radius(point, radius),
            Searcher::Linear(lin) => lin.find_radius(point, radius),
        }
        .map_err(|e| NnSimError::config(format!("radius query failed: {}", e)))?;
        Ok(found.into_iter().map(|(j, d, _)| (j, d)).collect())
    }

    /// The `k` nearest items to item `i`, self excluded, ordered by
    /// `(distance, index)`.
    pub fn query(&self, i: usize, k: usize) -> Result<Vec<usize>> {
        let n = self.nitems();
        if k == 0 || k >= n {
            return Err(NnSimError::config(format!(
                "cannot retrieve {} neighbours among {} items",
                k, n
            )));
        }
        let point = &self.rows[i];

        // one spare slot for self, one to detect a tie across the cutoff
        let m = (k + 2).min(n);
        let mut cand = self.find(point, m)?;
        cand.retain(|&(j, _)| j != i);
        cand.sort_by(by_distance_then_index);

        let settled = m == n || (cand.len() > k && cand[k].1 > cand[k - 1].1);
        if !settled {
            if cand.len() < k {
                trace!("Short k-NN answer for item {}, scanning exhaustively", i);
                cand = self.scan(i);
            } else if cand[k - 1].1 <= 0.0 {
                // duplicates tied at zero; radius queries need a positive radius
                trace!("Zero-distance tie for item {}, scanning exhaustively", i);
                cand = self.scan(i);
            } else {
                // pull in every item tied with the k-th distance
                let radius = cand[k - 1].1;
                cand = self.find_radius(point, radius)?;
                cand.retain(|&(j, _)| j != i);
                cand.sort_by(by_distance_then_index);
            }
        }

        cand.truncate(k);
        Ok(cand.into_iter().map(|(j, _)| j).collect())
    }

    fn scan(&self, i: usize) -> Vec<(usize, f64)> {
        let point = &self.rows[i];
        let mut all: Vec<(usize, f64)> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(j, row)| (j, self.distance.eval(point, row)))
            .collect();
        all.sort_by(by_distance_then_index);
        all
    }

    /// Neighbour lists of length `k_max` for every item.
    pub fn neighbor_table(&self, space: &str, k_max: usize) -> Result<NeighborTable> {
        let neighbors = (0..self.nitems())
            .into_par_iter()
            .map(|i| self.query(i, k_max))
            .collect::<Result<Vec<_>>>()?;
        Ok(NeighborTable {
            space: space.to_string(),
            k_max,
            neighbors,
        })
    }
}

fn by_distance_then_index(a: &(usize, f64), b: &(usize, f64)) -> Ordering {
    a.1.total_cmp(&b.1).then(a.0.cmp(&b.0))
}

/// Compute the `k_max` neighbour table of one space.
///
/// Fails with a configuration error unless the space has more than `k_max`
/// items.
pub fn compute_neighbors(
    space: &EmbeddingSpace,
    distance: DistanceMetric,
    k_max: usize,
) -> Result<NeighborTable> {
    let n = space.nitems();
    if k_max == 0 || n <= k_max {
        return Err(NnSimError::config(format!(
            "space '{}' has {} items, need more than k_max = {}",
            space.name, n, k_max
        )));
    }
    let index = NeighborIndex::build(space, distance)?;
    index.neighbor_table(&space.name, k_max)
}

/// Neighbour tables for every space, in input order.
///
/// Spaces are indexed in parallel; with a cache, fresh entries are reused
/// and missing or stale ones are recomputed and written back.
pub fn compute_all(
    spaces: &[EmbeddingSpace],
    distance: DistanceMetric,
    k_max: usize,
    cache: Option<&NeighborCache>,
) -> Result<Vec<NeighborTable>> {
    info!(
        "Computing {}-NN tables for {} spaces with {} distance",
        k_max,
        spaces.len(),
        distance
    );
    spaces
        .par_iter()
        .map(|space| {
            let Some(cache) = cache else {
                return compute_neighbors(space, distance, k_max);
            };
            let path = cache.entry_path(space, distance, k_max);
            if let Some(table) = cache.load_entry(&path, space, k_max) {
                debug!("Neighbour cache hit for '{}'", space.name);
                return Ok(table);
            }
            let table = compute_neighbors(space, distance, k_max)?;
            cache.store_entry(&path, &table)?;
            Ok(table)
        })
        .collect()
}

//! Similarity table and per-cutoff symmetric matrices.
//!
//! The table holds one `PairResult` per (unordered pair, cutoff, metric) in
//! comparison order. `matrix` folds the rows for one cutoff and metric into
//! a symmetric `|spaces| × |spaces|` matrix with a unit diagonal, the shape
//! a heatmap renderer expects.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::comparator::PairResult;
use crate::error::{NnSimError, Result};
use crate::metrics::SimilarityMetric;

pub const CSV_HEADER: &str = "src,dst,at,metric,similarity,excluded";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarityTable {
    rows: Vec<PairResult>,
}

/// Symmetric similarity matrix for one cutoff and metric.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatrix {
    pub k: usize,
    pub metric: SimilarityMetric,
    /// Row/column labels, in order of first appearance in the table.
    pub names: Vec<String>,
    /// `values[i][j]`; diagonal is 1, pairs absent from the table are NaN.
    pub values: Vec<Vec<f64>>,
}

impl SimilarityMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.names.iter().position(|n| n == a)?;
        let j = self.names.iter().position(|n| n == b)?;
        Some(self.values[i][j])
    }
}

impl SimilarityTable {
    pub fn new(rows: Vec<PairResult>) -> Self {
        Self { rows }
    }

    pub fn push(&mut self, row: PairResult) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[PairResult] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct cutoffs, ascending.
    pub fn cutoffs(&self) -> Vec<usize> {
        let mut ks: Vec<usize> = self.rows.iter().map(|r| r.k).collect();
        ks.sort_unstable();
        ks.dedup();
        ks
    }

    /// Distinct metrics in order of first appearance.
    pub fn metrics(&self) -> Vec<SimilarityMetric> {
        let mut out: Vec<SimilarityMetric> = Vec::new();
        for r in &self.rows {
            if !out.contains(&r.metric) {
                out.push(r.metric);
            }
        }
        out
    }

    /// Space names in order of first appearance.
    pub fn names(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for r in &self.rows {
            for name in [&r.src, &r.dst] {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
        }
        out
    }

    /// Look up the score of an unordered pair.
    pub fn similarity(&self, a: &str, b: &str, k: usize, metric: SimilarityMetric) -> Option<f64> {
        self.rows
            .iter()
            .find(|r| {
                r.k == k
                    && r.metric == metric
                    && ((r.src == a && r.dst == b) || (r.src == b && r.dst == a))
            })
            .map(|r| r.similarity)
    }

    /// Symmetric matrix of all spaces at cutoff `k` under `metric`.
    pub fn matrix(&self, k: usize, metric: SimilarityMetric) -> SimilarityMatrix {
        let names = self.names();
        let n = names.len();
        let mut values = vec![vec![f64::NAN; n]; n];
        for (i, row) in values.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        let pos = |name: &str| names.iter().position(|n| n == name);
        for r in self.rows.iter().filter(|r| r.k == k && r.metric == metric) {
            if let (Some(i), Some(j)) = (pos(&r.src), pos(&r.dst)) {
                if i != j {
                    values[i][j] = r.similarity;
                    values[j][i] = r.similarity;
                }
            }
        }
        debug!("Assembled {}×{} similarity matrix @{} ({})", n, n, k, metric);
        SimilarityMatrix {
            k,
            metric,
            names,
            values,
        }
    }

    /// One matrix per (cutoff, metric), cutoffs ascending.
    pub fn matrices(&self) -> Vec<SimilarityMatrix> {
        let metrics = self.metrics();
        self.cutoffs()
            .into_iter()
            .flat_map(|k| metrics.iter().map(move |&m| (k, m)))
            .map(|(k, m)| self.matrix(k, m))
            .collect()
    }

    pub fn to_csv<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        writeln!(out, "{}", CSV_HEADER)?;
        for r in &self.rows {
            writeln!(
                out,
                "{},{},{},{},{},{}",
                r.src, r.dst, r.k, r.metric, r.similarity, r.excluded
            )?;
        }
        out.flush()
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let file = create_file(path)?;
        self.to_csv(BufWriter::new(file))
            .map_err(|e| NnSimError::input(path, e.to_string()))?;
        info!("Wrote {} similarity rows to {}", self.rows.len(), path.display());
        Ok(())
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = create_file(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.rows)
            .map_err(|e| NnSimError::input(path, e.to_string()))?;
        info!("Wrote {} similarity rows to {}", self.rows.len(), path.display());
        Ok(())
    }
}

pub(crate) fn create_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| NnSimError::input(parent, e.to_string()))?;
    }
    File::create(path).map_err(|e| NnSimError::input(path, e.to_string()))
}

use std::path::{Path, PathBuf};

use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use crate::aggregate::SimilarityTable;
use crate::cache::NeighborCache;
use crate::comparator::PairwiseComparator;
use crate::distance::DistanceMetric;
use crate::error::{NnSimError, Result};
use crate::index::{compute_all, NeighborTable};
use crate::loader::{check_alignment, load_spaces, read_indices, read_registry, EmbeddingSpace};
use crate::metrics::SimilarityMetric;

/// Cutoffs used when none are configured.
pub const DEFAULT_CUTOFFS: [usize; 4] = [5, 10, 100, 200];

/// Resolved run configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParams {
    pub distance: DistanceMetric,
    pub metrics: Vec<SimilarityMetric>,
    pub cutoffs: Vec<usize>,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            distance: DistanceMetric::default(),
            metrics: vec![SimilarityMetric::Intersection],
            cutoffs: DEFAULT_CUTOFFS.to_vec(),
        }
    }
}

impl AnalysisParams {
    /// Neighbourhood size to index: the largest cutoff.
    #[inline]
    pub fn k_max(&self) -> usize {
        self.cutoffs.iter().copied().max().unwrap_or(0)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cutoffs.is_empty() {
            return Err(NnSimError::config("no cutoff requested"));
        }
        if self.cutoffs.contains(&0) {
            return Err(NnSimError::config("cutoffs must be at least 1"));
        }
        if self.metrics.is_empty() {
            return Err(NnSimError::config("no similarity metric requested"));
        }
        self.metrics.iter().try_for_each(|m| m.validate())
    }
}

/// Configures and runs the pipeline
/// `load → index (per space) → compare (per pair × cutoff × metric) → aggregate`.
///
/// Each stage completes for the whole run or the run fails.
#[derive(Clone, Debug, Default)]
pub struct AnalysisBuilder {
    params: AnalysisParams,
    indices: Option<Vec<usize>>,
    indices_file: Option<PathBuf>,
    cache: Option<NeighborCache>,
}

impl AnalysisBuilder {
    pub fn new() -> Self {
        info!("Initializing new AnalysisBuilder");
        Self::default()
    }

    // -------------------- Configuration --------------------

    pub fn with_cutoffs(mut self, cutoffs: &[usize]) -> Self {
        info!("Setting cutoffs: {:?}", cutoffs);
        let mut cutoffs = cutoffs.to_vec();
        cutoffs.sort_unstable();
        cutoffs.dedup();
        self.params.cutoffs = cutoffs;
        self
    }

    pub fn with_distance(mut self, distance: DistanceMetric) -> Self {
        info!("Setting distance: {}", distance);
        self.params.distance = distance;
        self
    }

    pub fn with_metric(self, metric: SimilarityMetric) -> Self {
        self.with_metrics(&[metric])
    }

    pub fn with_metrics(mut self, metrics: &[SimilarityMetric]) -> Self {
        info!("Setting similarity metrics: {:?}", metrics);
        self.params.metrics = metrics.to_vec();
        self
    }

    /// Restrict every space to these rows.
    pub fn with_indices(mut self, indices: Vec<usize>) -> Self {
        info!("Restricting spaces to {} rows", indices.len());
        self.indices = Some(indices);
        self
    }

    /// Restrict every space to the rows listed in `path` (read at run time).
    pub fn with_indices_file(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        info!("Row subset file: {}", path.display());
        self.indices_file = Some(path);
        self
    }

    /// Reuse and persist neighbour tables under `dir`.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let cache = NeighborCache::new(dir);
        info!("Neighbour cache at {}", cache.dir().display());
        self.cache = Some(cache);
        self
    }

    pub fn params(&self) -> &AnalysisParams {
        &self.params
    }

    // -------------------- Stages --------------------

    fn resolve_indices(&self) -> Result<Option<Vec<usize>>> {
        match (&self.indices, &self.indices_file) {
            (Some(idx), _) => Ok(Some(idx.clone())),
            (None, Some(path)) => read_indices(path).map(Some),
            (None, None) => Ok(None),
        }
    }

    /// Load the spaces listed in `registry`, paths relative to `input_dir`.
    pub fn load(&self, registry: &Path, input_dir: &Path) -> Result<Vec<EmbeddingSpace>> {
        let entries = read_registry(registry)?;
        let indices = self.resolve_indices()?;
        load_spaces(&entries, input_dir, indices.as_deref())
    }

    /// Neighbour tables for every space at `k_max`.
    pub fn neighbors(&self, spaces: &[EmbeddingSpace]) -> Result<Vec<NeighborTable>> {
        self.params.validate()?;
        check_alignment(spaces)?;
        compute_all(
            spaces,
            self.params.distance,
            self.params.k_max(),
            self.cache.as_ref(),
        )
    }

    /// Compare precomputed tables.
    pub fn compare(&self, tables: &[NeighborTable]) -> Result<SimilarityTable> {
        self.params.validate()?;
        let comparator = PairwiseComparator::new(tables, &self.params.cutoffs, &self.params.metrics)?;
        let table = SimilarityTable::new(comparator.run());
        debug!("Similarity table holds {} rows", table.len());
        Ok(table)
    }

    /// Run on spaces that are already in memory. Row subsets configured on
    /// the builder are applied here too.
    pub fn run_spaces(&self, spaces: &[EmbeddingSpace]) -> Result<SimilarityTable> {
        self.params.validate()?;
        let table = match self.resolve_indices()? {
            Some(idx) => {
                let subset = spaces
                    .iter()
                    .map(|s| s.select_rows(&idx))
                    .collect::<Result<Vec<_>>>()?;
                let tables = self.neighbors(&subset)?;
                self.compare(&tables)?
            }
            None => {
                let tables = self.neighbors(spaces)?;
                self.compare(&tables)?
            }
        };
        Ok(table)
    }

    /// Full run from a registry file.
    pub fn run(&self, registry: &Path, input_dir: &Path) -> Result<SimilarityTable> {
        info!(
            "Running analysis: distance={}, metrics={:?}, cutoffs={:?}",
            self.params.distance, self.params.metrics, self.params.cutoffs
        );
        // reject bad configuration before touching any file
        self.params.validate()?;

        let spaces = self.load(registry, input_dir)?;
        trace!("Loaded spaces: {:?}", spaces.iter().map(|s| &s.name).collect::<Vec<_>>());
        let tables = self.neighbors(&spaces)?;
        let table = self.compare(&tables)?;

        info!("Analysis completed with {} rows", table.len());
        Ok(table)
    }
}

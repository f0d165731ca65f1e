//! # nnsim
//!
//! Compare embedding spaces through the nearest-neighbour structure they
//! induce over a shared item collection.
//!
//! Every space holds one vector per item (row `i` is the same item in all
//! spaces). For each space a k-NN structure gives every item its `K_max`
//! nearest other items; for each pair of spaces and each cutoff `k` the
//! truncated lists of every item are scored with a [`SimilarityMetric`] and
//! averaged into one similarity value.
//!
//! ```ignore
//! use nnsim::builder::AnalysisBuilder;
//! use nnsim::metrics::SimilarityMetric;
//!
//! let table = AnalysisBuilder::new()
//!     .with_cutoffs(&[5, 10, 100])
//!     .with_metrics(&[SimilarityMetric::Intersection, SimilarityMetric::Spearman])
//!     .with_cache_dir("cache")
//!     .run("spaces.csv".as_ref(), "embeddings".as_ref())?;
//! table.write_csv("similarity.csv".as_ref())?;
//! ```
//!
//! Pipeline stages live in their own modules: [`loader`] → [`index`]
//! (+ [`cache`]) → [`comparator`] with [`metrics`] → [`aggregate`].
//! [`sampling`] builds listening-test examples from the same neighbour
//! tables.

pub mod aggregate;
pub mod builder;
pub mod cache;
pub mod comparator;
pub mod distance;
pub mod error;
pub mod index;
pub mod loader;
pub mod metrics;
pub mod sampling;

pub use aggregate::{SimilarityMatrix, SimilarityTable};
pub use builder::{AnalysisBuilder, AnalysisParams};
pub use comparator::{PairResult, PairwiseComparator};
pub use distance::DistanceMetric;
pub use error::{NnSimError, Result};
pub use index::{NeighborIndex, NeighborTable};
pub use loader::{EmbeddingSpace, ItemIdMap};
pub use metrics::SimilarityMetric;

#[cfg(test)]
mod tests;

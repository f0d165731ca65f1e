//! Error taxonomy for a similarity run.
//!
//! Load-time and configuration errors abort the run. Per-item metric gaps
//! (e.g. a Spearman correlation over fewer than two ranked items) are not
//! errors: metrics return `None` and the comparator counts the exclusions.

use std::path::{Path, PathBuf};

/// Errors that stop a similarity run.
#[derive(Debug, thiserror::Error)]
pub enum NnSimError {
    /// Missing, unreadable or malformed input file (registry, embeddings,
    /// subset indices, id map or cache entry).
    #[error("input error in {}: {reason}", path.display())]
    Input { path: PathBuf, reason: String },

    /// A space does not have the same number of items as the others.
    #[error("space '{space}' has {got} items, expected {expected} like the other spaces")]
    ItemCountMismatch {
        space: String,
        expected: usize,
        got: usize,
    },

    /// The registry names the same space twice.
    #[error("duplicate space name in registry: '{0}'")]
    DuplicateSpace(String),

    /// Invalid run configuration: unknown tags, cutoffs out of range,
    /// too few items for the requested neighbourhood size.
    #[error("configuration error: {0}")]
    Config(String),
}

impl NnSimError {
    pub fn input(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::Input {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }

    /// Configuration errors are raised before any data is touched.
    #[inline]
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, NnSimError>;

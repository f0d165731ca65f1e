//! Reference-item selection for listening-test examples.
//!
//! An example pairs a reference item with, for every space, its nearest
//! neighbours translated to external item ids. References are picked by a
//! `ReferenceStrategy`; random picks use the caller's RNG so a seed makes
//! the selection reproducible without any process-wide state.

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, info, trace};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::aggregate::create_file;
use crate::error::{NnSimError, Result};
use crate::index::NeighborTable;
use crate::loader::ItemIdMap;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceStrategy {
    /// `n` distinct items drawn uniformly at random.
    Random(usize),
    /// The given external ids, in order.
    Custom(Vec<i64>),
    /// Reserved: items whose neighbourhoods disagree most across spaces.
    /// No selection policy is defined for it yet.
    Dissimilar,
}

impl ReferenceStrategy {
    /// Resolve a strategy tag as given on the command line.
    ///
    /// `custom` requires exactly `n` ids.
    pub fn from_parts(tag: &str, n: usize, custom_ids: Option<Vec<i64>>) -> Result<Self> {
        match tag.trim().to_lowercase().as_str() {
            "random" => Ok(ReferenceStrategy::Random(n)),
            "custom" => {
                let ids = custom_ids.unwrap_or_default();
                if ids.len() != n {
                    return Err(NnSimError::config(format!(
                        "custom strategy expects exactly {} ids, got {}",
                        n,
                        ids.len()
                    )));
                }
                Ok(ReferenceStrategy::Custom(ids))
            }
            "dissimilar" => Ok(ReferenceStrategy::Dissimilar),
            other => Err(NnSimError::config(format!(
                "unknown reference strategy '{}'",
                other
            ))),
        }
    }
}

/// One reference item and its neighbours per space, as external ids.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceExample {
    pub reference: i64,
    pub options: BTreeMap<String, Vec<i64>>,
}

/// Row indices of the reference items.
pub fn select_references<R: Rng + ?Sized>(
    strategy: &ReferenceStrategy,
    ids: &ItemIdMap,
    rng: &mut R,
) -> Result<Vec<usize>> {
    match strategy {
        ReferenceStrategy::Random(n) => {
            if *n > ids.len() {
                return Err(NnSimError::config(format!(
                    "cannot draw {} distinct references from {} items",
                    n,
                    ids.len()
                )));
            }
            let rows = rand::seq::index::sample(rng, ids.len(), *n).into_vec();
            trace!("Random references: {:?}", rows);
            Ok(rows)
        }
        ReferenceStrategy::Custom(custom) => custom
            .iter()
            .map(|&id| {
                ids.row_of(id).ok_or_else(|| {
                    NnSimError::config(format!("reference id {} is not in the id map", id))
                })
            })
            .collect(),
        ReferenceStrategy::Dissimilar => Err(NnSimError::config(
            "the 'dissimilar' reference strategy is not supported",
        )),
    }
}

/// Build examples from neighbour tables truncated to `k`.
pub fn generate_examples<R: Rng + ?Sized>(
    tables: &[NeighborTable],
    ids: &ItemIdMap,
    strategy: &ReferenceStrategy,
    k: usize,
    rng: &mut R,
) -> Result<Vec<ReferenceExample>> {
    for t in tables {
        if t.nitems() != ids.len() {
            return Err(NnSimError::ItemCountMismatch {
                space: t.space.clone(),
                expected: ids.len(),
                got: t.nitems(),
            });
        }
        if k == 0 || k > t.k_max {
            return Err(NnSimError::config(format!(
                "cutoff {} outside 1..={} for '{}'",
                k, t.k_max, t.space
            )));
        }
    }

    let rows = select_references(strategy, ids, rng)?;
    info!(
        "Generating {} examples with {} neighbours from {} spaces",
        rows.len(),
        k,
        tables.len()
    );

    rows.into_iter()
        .map(|row| {
            let reference = external_id(ids, row)?;
            let options = tables
                .iter()
                .map(|t| {
                    let neighbours = t
                        .at(row, k)
                        .iter()
                        .map(|&j| external_id(ids, j))
                        .collect::<Result<Vec<_>>>()?;
                    Ok((t.space.clone(), neighbours))
                })
                .collect::<Result<BTreeMap<_, _>>>()?;
            debug!("Reference {} (row {})", reference, row);
            Ok(ReferenceExample { reference, options })
        })
        .collect()
}

fn external_id(ids: &ItemIdMap, row: usize) -> Result<i64> {
    ids.id_of(row)
        .ok_or_else(|| NnSimError::config(format!("row {} has no external id", row)))
}

pub fn write_examples(path: &Path, examples: &[ReferenceExample]) -> Result<()> {
    let file = create_file(path)?;
    serde_json::to_writer(std::io::BufWriter::new(file), examples)
        .map_err(|e| NnSimError::input(path, e.to_string()))?;
    info!("Wrote {} examples to {}", examples.len(), path.display());
    Ok(())
}

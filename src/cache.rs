//! On-disk cache of neighbour tables.
//!
//! Entries are keyed by space name *and* a fingerprint of everything the
//! table depends on: the space content (after row subsetting), the distance
//! metric and `k_max`. Editing an embedding file, switching metric or
//! asking for more neighbours therefore never hits a stale entry.
//!
//! File layout:
//! ```text
//! [magic "NNBR"][version u8][bincode(NeighborTable)][xxh64 checksum u64 LE]
//! ```
//! Entries are written to a temp file and renamed into place. Reads that
//! fail for any reason (missing, truncated, checksum mismatch, malformed
//! lists, different key) are treated as misses.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, trace, warn};
use xxhash_rust::xxh64::{xxh64, Xxh64};

use crate::distance::DistanceMetric;
use crate::error::{NnSimError, Result};
use crate::index::NeighborTable;
use crate::loader::EmbeddingSpace;

const CACHE_MAGIC: [u8; 4] = *b"NNBR";
const CACHE_VERSION: u8 = 1;
const CACHE_EXT: &str = "nbrs";
const FINGERPRINT_SEED: u64 = 0;

#[derive(Clone, Debug)]
pub struct NeighborCache {
    dir: PathBuf,
}

impl NeighborCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Content/metric/k_max fingerprint of a space's neighbour table.
    pub fn fingerprint(space: &EmbeddingSpace, distance: DistanceMetric, k_max: usize) -> u64 {
        let mut hasher = Xxh64::new(FINGERPRINT_SEED);
        space.visit_content(|bytes| hasher.update(bytes));
        hasher.update(distance.to_string().as_bytes());
        hasher.update(&(k_max as u64).to_le_bytes());
        hasher.digest()
    }

    pub fn entry_path(&self, space: &EmbeddingSpace, distance: DistanceMetric, k_max: usize) -> PathBuf {
        let fp = Self::fingerprint(space, distance, k_max);
        self.dir
            .join(format!("{}-{:016x}.{}", sanitize(&space.name), fp, CACHE_EXT))
    }

    /// Fetch a fresh table for `space`, or `None` on any kind of miss.
    pub fn load(
        &self,
        space: &EmbeddingSpace,
        distance: DistanceMetric,
        k_max: usize,
    ) -> Option<NeighborTable> {
        self.load_entry(&self.entry_path(space, distance, k_max), space, k_max)
    }

    /// Read the entry at `path` (from `entry_path`) for `space`.
    pub fn load_entry(
        &self,
        path: &Path,
        space: &EmbeddingSpace,
        k_max: usize,
    ) -> Option<NeighborTable> {
        let data = match fs::read(path) {
            Ok(d) => d,
            Err(_) => {
                trace!("No cache entry at {}", path.display());
                return None;
            }
        };
        match decode(&data).and_then(|t| t.validated().map_err(|e| e.to_string())) {
            Ok(table)
                if table.space == space.name
                    && table.k_max == k_max
                    && table.nitems() == space.nitems() =>
            {
                Some(table)
            }
            Ok(_) => {
                warn!("Cache entry {} does not match its key, ignoring", path.display());
                None
            }
            Err(reason) => {
                warn!("Ignoring unreadable cache entry {}: {}", path.display(), reason);
                None
            }
        }
    }

    /// Persist `table` under the key of `space`.
    pub fn store(
        &self,
        space: &EmbeddingSpace,
        distance: DistanceMetric,
        table: &NeighborTable,
    ) -> Result<()> {
        self.store_entry(&self.entry_path(space, distance, table.k_max), table)
    }

    /// Write `table` to `path` via a temp file and rename.
    pub fn store_entry(&self, path: &Path, table: &NeighborTable) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| NnSimError::input(&self.dir, e.to_string()))?;

        let data = encode(table).map_err(|reason| NnSimError::input(path, reason))?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &data).map_err(|e| NnSimError::input(&tmp, e.to_string()))?;
        fs::rename(&tmp, path).map_err(|e| NnSimError::input(path, e.to_string()))?;
        debug!(
            "Cached {} neighbour lists of '{}' at {}",
            table.nitems(),
            table.space,
            path.display()
        );
        Ok(())
    }
}

fn encode(table: &NeighborTable) -> std::result::Result<Vec<u8>, String> {
    let payload = bincode::serialize(table).map_err(|e| format!("serialization failed: {}", e))?;
    let mut data = Vec::with_capacity(payload.len() + 13);
    data.extend_from_slice(&CACHE_MAGIC);
    data.push(CACHE_VERSION);
    data.extend_from_slice(&payload);
    let checksum = xxh64(&data, 0);
    data.extend_from_slice(&checksum.to_le_bytes());
    Ok(data)
}

fn decode(data: &[u8]) -> std::result::Result<NeighborTable, String> {
    // magic(4) + version(1) + checksum(8)
    if data.len() < 13 {
        return Err("file too small".to_string());
    }
    if data[..4] != CACHE_MAGIC {
        return Err("bad magic".to_string());
    }
    if data[4] != CACHE_VERSION {
        return Err(format!("unsupported version {}", data[4]));
    }
    let checksum_offset = data.len() - 8;
    let mut stored = [0u8; 8];
    stored.copy_from_slice(&data[checksum_offset..]);
    let stored = u64::from_le_bytes(stored);
    let computed = xxh64(&data[..checksum_offset], 0);
    if stored != computed {
        return Err(format!(
            "checksum mismatch (stored={:#x}, computed={:#x})",
            stored, computed
        ));
    }
    bincode::deserialize(&data[5..checksum_offset]).map_err(|e| format!("decode failed: {}", e))
}

/// Keep file names portable whatever the space is called.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

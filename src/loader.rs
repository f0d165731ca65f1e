//! Embedding-space loading.
//!
//! A run starts from a registry (`NAME,FILE` table, `#` lines ignored)
//! listing one embedding file per space. Every file must hold a dense 2-D
//! numeric matrix whose rows are the shared items: row `i` of every space
//! denotes the same item, so all spaces must have the same number of rows.
//! An optional subset of row indices is applied identically to every space.
//!
//! Supported embedding formats:
//! - `.npy` (little-endian `<f8`/`<f4`/`<i8`/`<i4`, C or Fortran order, 2-D)
//! - plain text, one row per line, whitespace- or comma-separated
//!
//! NaN and infinite values are rejected at load time.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, trace};
use rayon::prelude::*;
use smartcore::linalg::basic::arrays::{Array, Array2};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::error::{NnSimError, Result};

const COMMENT: char = '#';
const NPY_MAGIC: &[u8] = b"\x93NUMPY";

/// One named embedding space: N items × D features, row-major.
#[derive(Clone, Debug)]
pub struct EmbeddingSpace {
    pub name: String,
    pub data: DenseMatrix<f64>,
}

impl EmbeddingSpace {
    pub fn new(name: impl Into<String>, data: DenseMatrix<f64>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Build a space from owned rows. All rows must share the same length.
    pub fn from_rows(name: impl Into<String>, rows: &[Vec<f64>]) -> Result<Self> {
        let name = name.into();
        let data = dense_from_rows(rows)
            .map_err(|reason| NnSimError::config(format!("space '{}': {}", name, reason)))?;
        Ok(Self { name, data })
    }

    #[inline]
    pub fn nitems(&self) -> usize {
        self.data.shape().0
    }

    #[inline]
    pub fn nfeatures(&self) -> usize {
        self.data.shape().1
    }

    pub fn row(&self, i: usize) -> Vec<f64> {
        self.data.get_row(i).iterator(0).copied().collect()
    }

    pub fn rows(&self) -> Vec<Vec<f64>> {
        (0..self.nitems()).map(|i| self.row(i)).collect()
    }

    /// Restrict the space to `indices`, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Result<Self> {
        let n = self.nitems();
        if let Some(&bad) = indices.iter().find(|&&i| i >= n) {
            return Err(NnSimError::config(format!(
                "subset index {} out of range for space '{}' with {} items",
                bad, self.name, n
            )));
        }
        let f = self.nfeatures();
        let flat: Vec<f64> = indices.iter().flat_map(|&i| self.row(i)).collect();
        Ok(Self {
            name: self.name.clone(),
            data: DenseMatrix::from_iterator(flat.into_iter(), indices.len(), f, 0),
        })
    }

    /// Feed the shape and every value, row-major and little-endian, to
    /// `sink`. Used to fingerprint a space's content without copying it.
    pub fn visit_content(&self, mut sink: impl FnMut(&[u8])) {
        let (n, f) = self.data.shape();
        sink(&(n as u64).to_le_bytes());
        sink(&(f as u64).to_le_bytes());
        for i in 0..n {
            for v in self.data.get_row(i).iterator(0) {
                sink(&v.to_le_bytes());
            }
        }
    }
}

/// One registry line: space name and its embedding file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryEntry {
    pub name: String,
    pub file: PathBuf,
}

/// Parse the space registry.
///
/// The first non-comment line is a header; columns named `name` and `file`
/// (case-insensitive) are used when present, otherwise the first two
/// columns. Names must be unique.
pub fn read_registry(path: &Path) -> Result<Vec<RegistryEntry>> {
    let text = fs::read_to_string(path).map_err(|e| NnSimError::input(path, e.to_string()))?;
    let mut lines = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with(COMMENT));

    let header: Vec<String> = match lines.next() {
        Some(h) => h.split(',').map(|c| c.trim().to_lowercase()).collect(),
        None => return Err(NnSimError::input(path, "registry is empty")),
    };
    let name_col = header.iter().position(|c| c == "name").unwrap_or(0);
    let file_col = header.iter().position(|c| c == "file").unwrap_or(1);
    debug!(
        "Registry header {:?}: name column {}, file column {}",
        header, name_col, file_col
    );

    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for (lineno, line) in lines.enumerate() {
        let cols: Vec<&str> = line.split(',').map(str::trim).collect();
        let (name, file) = match (cols.as_slice().get(name_col), cols.as_slice().get(file_col)) {
            (Some(n), Some(f)) if !n.is_empty() && !f.is_empty() => (*n, *f),
            _ => {
                return Err(NnSimError::input(
                    path,
                    format!("registry row {} is missing a name or file: '{}'", lineno + 1, line),
                ))
            }
        };
        if !seen.insert(name.to_string()) {
            return Err(NnSimError::DuplicateSpace(name.to_string()));
        }
        entries.push(RegistryEntry {
            name: name.to_string(),
            file: PathBuf::from(file),
        });
    }

    if entries.is_empty() {
        return Err(NnSimError::input(path, "registry lists no spaces"));
    }
    info!("Registry {} lists {} spaces", path.display(), entries.len());
    Ok(entries)
}

/// Read a row-subset file: one non-negative integer per line (or
/// whitespace separated), order preserved.
pub fn read_indices(path: &Path) -> Result<Vec<usize>> {
    read_integers(path)?
        .into_iter()
        .map(|v| {
            usize::try_from(v)
                .map_err(|_| NnSimError::input(path, format!("negative row index {}", v)))
        })
        .collect()
}

fn read_integers(path: &Path) -> Result<Vec<i64>> {
    let text = fs::read_to_string(path).map_err(|e| NnSimError::input(path, e.to_string()))?;
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with(COMMENT))
        .flat_map(|l| l.split(|c: char| c.is_whitespace() || c == ','))
        .filter(|tok| !tok.is_empty())
        .map(|tok| {
            // np.savetxt writes integers as floats by default
            tok.parse::<i64>()
                .or_else(|_| match tok.parse::<f64>() {
                    Ok(v) if v.fract() == 0.0 => Ok(v as i64),
                    _ => Err(()),
                })
                .map_err(|_| NnSimError::input(path, format!("'{}' is not an integer", tok)))
        })
        .collect()
}

/// Maps row indices to external item ids.
///
/// The ids are strictly ascending so an external id can be resolved back to
/// its row with a binary search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemIdMap {
    ids: Vec<i64>,
}

impl ItemIdMap {
    pub fn new(ids: Vec<i64>) -> Result<Self> {
        if let Some(w) = ids.windows(2).find(|w| w[0] >= w[1]) {
            return Err(NnSimError::config(format!(
                "item ids must be strictly ascending, found {} before {}",
                w[0], w[1]
            )));
        }
        Ok(Self { ids })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let ids = read_integers(path)?;
        Self::new(ids).map_err(|e| NnSimError::input(path, e.to_string()))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[inline]
    pub fn id_of(&self, row: usize) -> Option<i64> {
        self.ids.as_slice().get(row).copied()
    }

    #[inline]
    pub fn row_of(&self, id: i64) -> Option<usize> {
        self.ids.binary_search(&id).ok()
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }
}

/// Load every registry entry (paths relative to `input_dir`), apply the
/// optional row subset and check that all spaces have the same item count.
///
/// The returned spaces keep registry order.
pub fn load_spaces(
    entries: &[RegistryEntry],
    input_dir: &Path,
    indices: Option<&[usize]>,
) -> Result<Vec<EmbeddingSpace>> {
    info!(
        "Loading {} embedding spaces from {}",
        entries.len(),
        input_dir.display()
    );

    let spaces: Vec<EmbeddingSpace> = entries
        .par_iter()
        .map(|entry| {
            let path = input_dir.join(&entry.file);
            let data = read_matrix(&path)?;
            let space = EmbeddingSpace::new(entry.name.clone(), data);
            trace!(
                "Loaded '{}' from {}: {:?}",
                space.name,
                path.display(),
                space.data.shape()
            );
            match indices {
                Some(idx) => space
                    .select_rows(idx)
                    .map_err(|e| NnSimError::input(&path, e.to_string())),
                None => Ok(space),
            }
        })
        .collect::<Result<Vec<_>>>()?;

    check_alignment(&spaces)?;
    debug!(
        "All spaces aligned on {} items",
        spaces.first().map(|s| s.nitems()).unwrap_or(0)
    );
    Ok(spaces)
}

/// All spaces of a run must describe the same items.
pub fn check_alignment(spaces: &[EmbeddingSpace]) -> Result<()> {
    let Some(first) = spaces.first() else {
        return Err(NnSimError::config("no embedding spaces to compare"));
    };
    let expected = first.nitems();
    for space in &spaces[1..] {
        if space.nitems() != expected {
            return Err(NnSimError::ItemCountMismatch {
                space: space.name.clone(),
                expected,
                got: space.nitems(),
            });
        }
    }
    Ok(())
}

/// Read a dense 2-D matrix from `.npy` or plain text.
pub fn read_matrix(path: &Path) -> Result<DenseMatrix<f64>> {
    let bytes = fs::read(path).map_err(|e| NnSimError::input(path, e.to_string()))?;
    let matrix = if bytes.starts_with(NPY_MAGIC) {
        parse_npy(&bytes)
    } else {
        std::str::from_utf8(&bytes)
            .map_err(|_| "neither a .npy file nor UTF-8 text".to_string())
            .and_then(parse_text)
    };
    matrix.map_err(|reason| NnSimError::input(path, reason))
}

fn dense_from_rows(rows: &[Vec<f64>]) -> std::result::Result<DenseMatrix<f64>, String> {
    let n = rows.len();
    let f = rows.first().map(|r| r.len()).unwrap_or(0);
    if n == 0 || f == 0 {
        return Err("matrix has no rows or no columns".to_string());
    }
    if let Some(i) = rows.iter().position(|r| r.len() != f) {
        return Err(format!(
            "row {} has {} columns, expected {}",
            i,
            rows[i].len(),
            f
        ));
    }
    for (i, row) in rows.iter().enumerate() {
        if let Some(j) = row.iter().position(|v| !v.is_finite()) {
            return Err(non_finite(i, j, row[j]));
        }
    }
    Ok(DenseMatrix::from_iterator(
        rows.iter().flatten().copied(),
        n,
        f,
        0,
    ))
}

fn parse_text(text: &str) -> std::result::Result<DenseMatrix<f64>, String> {
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let l = line.trim();
        if l.is_empty() || l.starts_with(COMMENT) {
            continue;
        }
        let row = l
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|tok| !tok.is_empty())
            .map(|tok| {
                tok.parse::<f64>()
                    .map_err(|_| format!("line {}: '{}' is not a number", lineno + 1, tok))
            })
            .collect::<std::result::Result<Vec<f64>, String>>()?;
        rows.push(row);
    }
    dense_from_rows(&rows)
}

/// Element types accepted in `.npy` payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NpyDtype {
    F8,
    F4,
    I8,
    I4,
}

impl NpyDtype {
    fn parse(descr: &str) -> std::result::Result<Self, String> {
        match descr {
            "<f8" | "f8" => Ok(Self::F8),
            "<f4" | "f4" => Ok(Self::F4),
            "<i8" | "i8" => Ok(Self::I8),
            "<i4" | "i4" => Ok(Self::I4),
            other => Err(format!("unsupported .npy dtype '{}'", other)),
        }
    }

    fn width(self) -> usize {
        match self {
            Self::F8 | Self::I8 => 8,
            Self::F4 | Self::I4 => 4,
        }
    }

    fn decode(self, b: &[u8]) -> f64 {
        match self {
            Self::F8 => f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]),
            Self::F4 => f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
            Self::I8 => i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f64,
            Self::I4 => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
        }
    }
}

fn parse_npy(bytes: &[u8]) -> std::result::Result<DenseMatrix<f64>, String> {
    let major = *bytes.get(6).ok_or("truncated .npy preamble")?;
    let (header_len, header_start) = match major {
        1 => {
            let b = bytes.get(8..10).ok_or("truncated .npy header length")?;
            (u16::from_le_bytes([b[0], b[1]]) as usize, 10)
        }
        2 | 3 => {
            let b = bytes.get(8..12).ok_or("truncated .npy header length")?;
            (u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize, 12)
        }
        v => return Err(format!("unsupported .npy version {}", v)),
    };
    let header = bytes
        .get(header_start..header_start + header_len)
        .ok_or("truncated .npy header")?;
    let header = std::str::from_utf8(header).map_err(|_| "non-text .npy header")?;

    let dtype = NpyDtype::parse(&header_value(header, "descr")?.replace('\'', ""))?;
    let fortran = header_value(header, "fortran_order")? == "True";
    let shape: Vec<usize> = header_value(header, "shape")?
        .trim_matches(|c| c == '(' || c == ')')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|_| format!("bad .npy shape entry '{}'", s)))
        .collect::<std::result::Result<_, _>>()?;
    let (n, f) = match shape[..] {
        [n, f] if n > 0 && f > 0 => (n, f),
        _ => return Err(format!("expected a non-empty 2-D array, got shape {:?}", shape)),
    };

    let payload = &bytes[header_start + header_len..];
    let width = dtype.width();
    if payload.len() != n * f * width {
        return Err(format!(
            "payload has {} bytes, shape {:?} of {:?} needs {}",
            payload.len(),
            shape,
            dtype,
            n * f * width
        ));
    }
    let values: Vec<f64> = payload.chunks_exact(width).map(|b| dtype.decode(b)).collect();
    if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
        let (i, j) = if fortran { (pos % n, pos / n) } else { (pos / f, pos % f) };
        return Err(non_finite(i, j, values[pos]));
    }
    // axis 1 reads the iterator column-major
    let axis = if fortran { 1 } else { 0 };
    Ok(DenseMatrix::from_iterator(values.into_iter(), n, f, axis))
}

fn non_finite(row: usize, col: usize, value: f64) -> String {
    format!("non-finite value {} at row {}, column {}", value, row, col)
}

/// Extract the raw value for `key` from a numpy header dict literal.
fn header_value<'a>(header: &'a str, key: &str) -> std::result::Result<&'a str, String> {
    let needle = format!("'{}':", key);
    let start = header
        .find(&needle)
        .map(|i| i + needle.len())
        .ok_or_else(|| format!(".npy header has no '{}'", key))?;
    let rest = header[start..].trim_start();
    let end = if rest.starts_with('(') {
        rest.find(')').map(|i| i + 1)
    } else {
        rest.find([',', '}'])
    }
    .ok_or_else(|| format!("unterminated '{}' in .npy header", key))?;
    Ok(rest[..end].trim())
}

#[cfg(test)]
pub(crate) fn npy_bytes_f64(rows: &[Vec<f64>]) -> Vec<u8> {
    let n = rows.len();
    let f = rows[0].len();
    let mut header = format!(
        "{{'descr': '<f8', 'fortran_order': False, 'shape': ({}, {}), }}",
        n, f
    );
    // pad so that magic + version + len + header is a multiple of 64
    while (10 + header.len() + 1) % 64 != 0 {
        header.push(' ');
    }
    header.push('\n');
    let mut out = Vec::new();
    out.extend_from_slice(NPY_MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    for v in rows.iter().flatten() {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

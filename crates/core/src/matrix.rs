//! Sparse matrix export helpers.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sprs::CsMat;

use crate::errors::DataError;

/// Non-zero entries of one matrix row, as submitted to the scoring endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseRow {
    pub keys: Vec<usize>,
    pub values: Vec<f32>,
}

/// Split a CSR matrix into owned rows.
pub fn sparse_rows(matrix: &CsMat<f32>) -> Vec<SparseRow> {
    matrix
        .outer_iterator()
        .map(|row| SparseRow { keys: row.indices().to_vec(), values: row.data().to_vec() })
        .collect()
}

/// Write `matrix` in libsvm text format, one `<target> <col>:<value>...` line per row.
pub fn write_libsvm<W: Write>(
    matrix: &CsMat<f32>,
    targets: &[f32],
    writer: &mut W,
) -> io::Result<()> {
    if targets.len() != matrix.rows() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} targets for {} rows", targets.len(), matrix.rows()),
        ));
    }

    for (row, target) in matrix.outer_iterator().zip(targets) {
        write!(writer, "{target}")?;
        for (column, value) in row.iter() {
            write!(writer, " {column}:{value}")?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

pub fn write_libsvm_file(
    matrix: &CsMat<f32>,
    targets: &[f32],
    path: &Path,
) -> Result<(), DataError> {
    let to_error = |source| DataError::WriteFile { path: path.to_path_buf(), source };
    let file = File::create(path).map_err(to_error)?;
    let mut writer = BufWriter::new(file);
    write_libsvm(matrix, targets, &mut writer).map_err(to_error)?;
    writer.flush().map_err(to_error)
}

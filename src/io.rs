// src/io.rs

//! CSV input and output of dense matrices and Ritz values.

use csv::{ReaderBuilder, WriterBuilder};
use nalgebra::DMatrix;
use std::io;
use std::path::Path;

/// Loads a headerless CSV file, one matrix row per line.
pub fn load_matrix_csv<P: AsRef<Path>>(csv_path: P) -> io::Result<DMatrix<f64>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(csv_path)?;

    let mut rows: Vec<Vec<f64>> = Vec::new();
    for record in rdr.deserialize() {
        let row: Vec<f64> = record?;
        if let Some(first) = rows.first() {
            if row.len() != first.len() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("row {} has {} entries, expected {}", rows.len() + 1, row.len(), first.len()),
                ));
            }
        }
        rows.push(row);
    }

    let ncols = rows.first().map_or(0, Vec::len);
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Ok(DMatrix::from_row_slice(rows.len(), ncols, &flat))
}

/// Loads a CSV matrix and checks that it is square.
pub fn load_square_matrix_csv<P: AsRef<Path>>(csv_path: P) -> io::Result<DMatrix<f64>> {
    let matrix = load_matrix_csv(csv_path)?;
    if matrix.nrows() != matrix.ncols() || matrix.nrows() == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("expected a non-empty square matrix, got {}x{}", matrix.nrows(), matrix.ncols()),
        ));
    }
    Ok(matrix)
}

/// Saves a dense matrix to a CSV file, one row per line.
pub fn save_matrix_csv<P: AsRef<Path>>(matrix: &DMatrix<f64>, csv_path: P) -> io::Result<()> {
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .from_path(csv_path)?;

    for row in matrix.row_iter() {
        wtr.serialize(row.iter().copied().collect::<Vec<f64>>())?;
    }

    wtr.flush()?;
    Ok(())
}

/// Saves Ritz values to a CSV file as a single row.
pub fn save_vector_csv<P: AsRef<Path>>(vector: &[f64], csv_path: P) -> io::Result<()> {
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .from_path(csv_path)?;
    wtr.serialize(vector.to_vec())?;
    wtr.flush()?;
    Ok(())
}

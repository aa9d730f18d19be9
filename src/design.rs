//! Helpers that turn categorical covariates into indicator columns before they reach
//! [`ChoiceDataBuilder`](crate::data::ChoiceDataBuilder).
//!
//! A categorical variable with `L` levels contributes `L - 1` indicator columns. A full set
//! of indicators sums to one for every alternative, which the softmax cannot identify, so
//! one reference level is dropped.

use std::collections::BTreeSet;

use nalgebra::DMatrix;

use crate::error::{ChoiceError, Result};

/// Indicator expansion of one categorical column.
#[derive(Clone, Debug, PartialEq)]
pub struct IndicatorColumns {
    /// Level that was dropped; rows at this level are all zeros.
    pub reference: String,
    /// Column names, formatted as `{variable}_{level}`.
    pub names: Vec<String>,
    /// `rows x (levels - 1)` matrix of 0/1 indicators.
    pub matrix: DMatrix<f64>,
}

/// Expands `values` into indicator columns named after `variable`.
///
/// Levels are ordered lexicographically. When `reference` is `None` the first level is
/// dropped, otherwise the named level is.
pub fn expand_categorical<S: AsRef<str>>(
    variable: &str,
    values: &[S],
    reference: Option<&str>,
) -> Result<IndicatorColumns> {
    let levels: BTreeSet<&str> = values.iter().map(|v| v.as_ref()).collect();
    let reference = match reference {
        Some(level) if levels.contains(level) => level,
        Some(level) => {
            return Err(ChoiceError::invalid_configuration(
                "reference level",
                format!("`{level}` does not occur in `{variable}`"),
            ))
        }
        None => *levels
            .iter()
            .next()
            .ok_or(ChoiceError::EmptyDataset)?,
    };

    let kept: Vec<&str> = levels.into_iter().filter(|l| *l != reference).collect();
    let matrix = DMatrix::from_fn(values.len(), kept.len(), |row, col| {
        if values[row].as_ref() == kept[col] {
            1.0
        } else {
            0.0
        }
    });
    let names = kept
        .iter()
        .map(|level| format!("{variable}_{level}"))
        .collect();

    Ok(IndicatorColumns {
        reference: reference.to_string(),
        names,
        matrix,
    })
}

/// Concatenates feature blocks column-wise, returning the combined matrix and names.
pub fn hstack(blocks: &[(&[String], &DMatrix<f64>)]) -> Result<(Vec<String>, DMatrix<f64>)> {
    let rows = blocks.first().map(|(_, m)| m.nrows()).unwrap_or(0);
    let mut names = Vec::new();
    let mut columns = 0usize;
    for (block_names, matrix) in blocks {
        if matrix.nrows() != rows {
            return Err(ChoiceError::dimension_mismatch(
                "feature block rows",
                rows,
                matrix.nrows(),
            ));
        }
        if block_names.len() != matrix.ncols() {
            return Err(ChoiceError::dimension_mismatch(
                "feature block names",
                matrix.ncols(),
                block_names.len(),
            ));
        }
        names.extend(block_names.iter().cloned());
        columns += matrix.ncols();
    }

    let mut combined = DMatrix::zeros(rows, columns);
    let mut offset = 0usize;
    for (_, matrix) in blocks {
        combined
            .columns_mut(offset, matrix.ncols())
            .copy_from(matrix);
        offset += matrix.ncols();
    }
    Ok((names, combined))
}

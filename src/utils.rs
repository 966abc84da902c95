//! Small numeric helpers used when writing step and update functions.

use nalgebra::{DMatrix, DVector};

use crate::error::{EquilibriumError, Result};

/// Returns one if `x` is zero and `x` otherwise, so `y / zero_safe(x)` never divides by zero.
pub fn zero_safe(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        x
    }
}

/// Divides `v` in place by `factor`, or by `zero_safe(v[0])` when no factor is given.
///
/// The default makes the first element the numeraire (nominal prices); pass
/// `Some(v.sum())` to turn a vector of weights into shares.
pub fn normalise(v: &mut DVector<f64>, factor: Option<f64>) {
    if v.is_empty() {
        return;
    }
    let factor = zero_safe(factor.unwrap_or(v[0]));
    *v /= factor;
}

/// Splits `v` into consecutive slices of length `n`.
pub fn chunk(v: &DVector<f64>, n: usize) -> Result<Vec<&[f64]>> {
    if n == 0 || v.len() % n != 0 {
        return Err(EquilibriumError::dimension_mismatch(
            "chunk length",
            n,
            v.len(),
        ));
    }
    Ok(v.as_slice().chunks(n).collect())
}

/// Whether the matrix has as many rows as columns.
pub fn is_square(m: &DMatrix<f64>) -> bool {
    m.nrows() == m.ncols()
}

/// Diagonal of a square matrix.
pub fn diagonal(m: &DMatrix<f64>) -> Result<DVector<f64>> {
    ensure_square(m)?;
    Ok(m.diagonal())
}

/// Off-diagonal entries of a square matrix in column-major order.
pub fn off_diagonal(m: &DMatrix<f64>) -> Result<Vec<f64>> {
    ensure_square(m)?;
    let n = m.nrows();
    let mut values = Vec::with_capacity(n * n.saturating_sub(1));
    for col in 0..n {
        for row in 0..n {
            if row != col {
                values.push(m[(row, col)]);
            }
        }
    }
    Ok(values)
}

fn ensure_square(m: &DMatrix<f64>) -> Result<()> {
    if is_square(m) {
        Ok(())
    } else {
        Err(EquilibriumError::dimension_mismatch(
            "square matrix columns",
            m.nrows(),
            m.ncols(),
        ))
    }
}

/// Layout of [`pretty`] tables.
#[derive(Clone, Debug)]
pub struct PrettyOptions {
    /// Column width.
    pub pad: usize,
    /// Digits after the decimal point.
    pub digits: usize,
    /// Spaces between columns.
    pub spacer: usize,
}

impl Default for PrettyOptions {
    fn default() -> Self {
        Self {
            pad: 8,
            digits: 4,
            spacer: 2,
        }
    }
}

/// Renders named columns of equal length as a right-aligned text table.
pub fn pretty(columns: &[(&str, &[f64])], options: &PrettyOptions) -> Result<String> {
    let rows = columns.first().map_or(0, |(_, values)| values.len());
    for (_, values) in columns {
        if values.len() != rows {
            return Err(EquilibriumError::dimension_mismatch(
                "pretty column length",
                rows,
                values.len(),
            ));
        }
    }

    let gap = " ".repeat(options.spacer);
    let pad = options.pad;
    let digits = options.digits;

    let header: Vec<String> = columns
        .iter()
        .map(|(name, _)| format!("{name:>pad$}"))
        .collect();
    let mut out = header.join(&gap);

    for row in 0..rows {
        out.push('\n');
        let cells: Vec<String> = columns
            .iter()
            .map(|(_, values)| format!("{:>pad$.digits$}", values[row]))
            .collect();
        out.push_str(&cells.join(&gap));
    }
    Ok(out)
}

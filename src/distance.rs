//! Deviation metrics between two iterates.

use nalgebra::DVector;

use crate::error::{EquilibriumError, Result};
use crate::utils::zero_safe;

/// Signature shared by every deviation metric.
///
/// Metrics are passed around as plain function values; any function with this
/// signature can replace the default in [`UpdateOptions`](crate::update::UpdateOptions).
pub type DistanceFn = fn(&DVector<f64>, &DVector<f64>) -> Result<f64>;

/// Sum of absolute elementwise differences. This is the default metric.
pub fn sum_abs_diff(v1: &DVector<f64>, v2: &DVector<f64>) -> Result<f64> {
    ensure_same_length(v1, v2)?;
    Ok(v1.iter().zip(v2.iter()).map(|(a, b)| (a - b).abs()).sum())
}

/// Largest absolute elementwise difference (supremum norm).
pub fn max_abs_diff(v1: &DVector<f64>, v2: &DVector<f64>) -> Result<f64> {
    ensure_same_length(v1, v2)?;
    Ok(v1
        .iter()
        .zip(v2.iter())
        .fold(0.0_f64, |acc, (a, b)| acc.max((a - b).abs())))
}

/// Largest absolute percentage deviation of `v1` from `v2`.
///
/// Components where `v2` is zero fall back to the absolute difference.
pub fn infnorm_pctdev(v1: &DVector<f64>, v2: &DVector<f64>) -> Result<f64> {
    ensure_same_length(v1, v2)?;
    Ok(v1
        .iter()
        .zip(v2.iter())
        .fold(0.0_f64, |acc, (a, b)| acc.max((a - b).abs() / zero_safe(b.abs()))))
}

pub(crate) fn ensure_same_length(v1: &DVector<f64>, v2: &DVector<f64>) -> Result<()> {
    if v1.len() != v2.len() {
        return Err(EquilibriumError::dimension_mismatch(
            "deviation operands",
            v1.len(),
            v2.len(),
        ));
    }
    Ok(())
}

//! Bounded Newton–Raphson root finder for scalar equations.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{EquilibriumError, Result};

/// Stopping rules and bounds for [`newton`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NewtonConfig {
    /// Log the iterate, function value and step every iteration.
    pub verbose: bool,
    /// Stop once the absolute step falls below this tolerance.
    pub step_tol: f64,
    /// Stop once the absolute function value falls below this tolerance.
    pub f_tol: f64,
    /// Maximum number of iterations before giving up.
    pub max_iter: usize,
    /// Warning emitted when `max_iter` is reached.
    pub message: String,
    /// Left bound of the search interval.
    pub lower: f64,
    /// Right bound of the search interval.
    pub upper: f64,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            step_tol: 1e-8,
            f_tol: 1e-8,
            max_iter: 750,
            message: "No Newton convergence".to_string(),
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
        }
    }
}

impl NewtonConfig {
    /// Restrict the search to `[lower, upper]`.
    pub fn with_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    /// Set both tolerances.
    pub fn with_tolerances(mut self, step_tol: f64, f_tol: f64) -> Self {
        self.step_tol = step_tol;
        self.f_tol = f_tol;
        self
    }

    /// Set the iteration cap.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    fn validate(&self, x0: f64) -> Result<()> {
        if self.step_tol.is_nan() || self.step_tol < 0.0 {
            return Err(EquilibriumError::invalid_parameter(
                "step_tol",
                self.step_tol,
                "must be non-negative",
            ));
        }
        if self.f_tol.is_nan() || self.f_tol < 0.0 {
            return Err(EquilibriumError::invalid_parameter(
                "f_tol",
                self.f_tol,
                "must be non-negative",
            ));
        }
        if self.max_iter == 0 {
            return Err(EquilibriumError::invalid_parameter(
                "max_iter",
                0.0,
                "must be positive",
            ));
        }
        if self.lower.is_nan() || self.upper.is_nan() || self.lower >= self.upper {
            return Err(EquilibriumError::invalid_parameter(
                "lower",
                self.lower,
                "must be below upper",
            ));
        }
        if x0.is_nan() || x0 < self.lower || x0 > self.upper {
            return Err(EquilibriumError::invalid_parameter(
                "x0",
                x0,
                "must lie within [lower, upper]",
            ));
        }
        Ok(())
    }
}

/// Result of a Newton search.
#[derive(Clone, Debug, PartialEq)]
pub struct NewtonSummary {
    /// Final iterate.
    pub root: f64,
    /// Function value at the final iterate.
    pub value: f64,
    /// Number of function evaluations.
    pub iterations: usize,
    /// Whether either tolerance was met within `max_iter`.
    pub converged: bool,
}

/// Finds a root of `f` starting from `x0`, where `f_df(x)` returns `(f(x), f'(x))`.
///
/// Steps that would leave `[lower, upper]` are replaced by moving halfway to the
/// violated bound. A zero or non-finite derivative is a numerical error;
/// exhausting `max_iter` only logs the configured warning.
pub fn newton<F>(mut f_df: F, x0: f64, config: &NewtonConfig) -> Result<NewtonSummary>
where
    F: FnMut(f64) -> Result<(f64, f64)>,
{
    config.validate(x0)?;

    let mut x = x0;
    let mut value = f64::NAN;
    for iteration in 1..=config.max_iter {
        let (f, df) = f_df(x)?;
        value = f;
        if !f.is_finite() {
            return Err(EquilibriumError::NumericalError {
                context: "Newton function value",
            });
        }
        if f.abs() < config.f_tol {
            return Ok(NewtonSummary {
                root: x,
                value,
                iterations: iteration,
                converged: true,
            });
        }
        if df == 0.0 || !df.is_finite() {
            return Err(EquilibriumError::NumericalError {
                context: "Newton derivative",
            });
        }

        let mut next = x - f / df;
        if next < config.lower {
            next = 0.5 * (x + config.lower);
        } else if next > config.upper {
            next = 0.5 * (x + config.upper);
        }
        let step = next - x;
        if config.verbose {
            info!("newton {iteration}: x = {x:e}, f = {f:e}, step = {step:e}");
        }
        x = next;

        if step.abs() < config.step_tol {
            return Ok(NewtonSummary {
                root: x,
                value,
                iterations: iteration,
                converged: true,
            });
        }
    }

    warn!("{} (x = {x:e}, f = {value:e})", config.message);
    Ok(NewtonSummary {
        root: x,
        value,
        iterations: config.max_iter,
        converged: false,
    })
}

/// Same as [`newton`] with the function and its derivative supplied separately.
pub fn newton_split<F, D>(mut f: F, mut df: D, x0: f64, config: &NewtonConfig) -> Result<NewtonSummary>
where
    F: FnMut(f64) -> Result<f64>,
    D: FnMut(f64) -> Result<f64>,
{
    newton(|x| Ok((f(x)?, df(x)?)), x0, config)
}

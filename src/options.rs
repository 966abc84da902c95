//! Configuration structures for the convergence driver and the dampening controller.
//!
//! Every field has a documented default, so partial configuration documents can be
//! deserialized with `serde`; unknown keys are rejected and [`validate`](ConvergeConfig::validate)
//! enforces the value ranges.

use serde::{Deserialize, Serialize};

use crate::error::{EquilibriumError, Result};

/// Stopping rules for [`converge`](crate::converge).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConvergeConfig {
    /// Stop once the deviation reported by the step function falls below this tolerance.
    pub diff_tol: f64,
    /// Stop once the update size falls below this tolerance (a stall, not convergence).
    pub update_tol: f64,
    /// Maximum number of iterations before giving up.
    pub max_iter: usize,
    /// Log the deviation of every iteration at `info` level.
    pub verbose: bool,
    /// Warning emitted when `max_iter` is reached without convergence.
    pub message: String,
}

impl Default for ConvergeConfig {
    fn default() -> Self {
        Self {
            diff_tol: 1e-6,
            update_tol: 0.0,
            max_iter: 200,
            verbose: false,
            message: "No convergence".to_string(),
        }
    }
}

impl ConvergeConfig {
    /// Override the deviation tolerance.
    pub fn with_diff_tol(mut self, diff_tol: f64) -> Self {
        self.diff_tol = diff_tol;
        self
    }

    /// Override the update-size tolerance.
    pub fn with_update_tol(mut self, update_tol: f64) -> Self {
        self.update_tol = update_tol;
        self
    }

    /// Set the iteration cap.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Enable or disable per-iteration diagnostics.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Replace the non-convergence warning.
    pub fn with_message<S: Into<String>>(mut self, message: S) -> Self {
        self.message = message.into();
        self
    }

    /// Checks that tolerances are non-negative and the iteration cap is positive.
    pub fn validate(&self) -> Result<()> {
        non_negative("diff_tol", self.diff_tol)?;
        non_negative("update_tol", self.update_tol)?;
        if self.max_iter == 0 {
            return Err(EquilibriumError::invalid_parameter(
                "max_iter",
                0.0,
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// Tuning knobs for [`dynamic_dampen`](crate::dampen::dynamic_dampen).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DampenConfig {
    /// Added to the coefficient when loosening; negative so loosening lowers it.
    pub loosen_step: f64,
    /// Added to the coefficient when tightening.
    pub tighten_step: f64,
    /// Lower bound on the coefficient.
    pub min_dampen: f64,
    /// Upper bound on the coefficient; must stay below one.
    pub max_dampen: f64,
    /// Loosening resumes only once the deviation drops below `scale * reference_diff`.
    pub scale: f64,
    /// Share of components that must flip sign to count as overshooting.
    pub overshoot_share: f64,
    /// Iterations at the start of a run during which no loosening is attempted.
    pub grace_period: usize,
    /// Minimum iterations between two tightenings.
    pub tighten_wait: usize,
    /// Minimum iterations between two loosenings.
    pub loosen_wait: usize,
}

impl Default for DampenConfig {
    fn default() -> Self {
        Self {
            loosen_step: -0.01,
            tighten_step: 0.01,
            min_dampen: 0.0,
            max_dampen: 0.999,
            scale: 0.925,
            overshoot_share: 0.5,
            grace_period: 50,
            tighten_wait: 30,
            loosen_wait: 40,
        }
    }
}

impl DampenConfig {
    /// Set the per-iteration adjustment sizes; `loosen` is negated if given as a magnitude.
    pub fn with_steps(mut self, loosen: f64, tighten: f64) -> Self {
        self.loosen_step = -loosen.abs();
        self.tighten_step = tighten;
        self
    }

    /// Set the coefficient bounds.
    pub fn with_bounds(mut self, min_dampen: f64, max_dampen: f64) -> Self {
        self.min_dampen = min_dampen;
        self.max_dampen = max_dampen;
        self
    }

    /// Set the hysteresis periods.
    pub fn with_waits(mut self, grace_period: usize, tighten_wait: usize, loosen_wait: usize) -> Self {
        self.grace_period = grace_period;
        self.tighten_wait = tighten_wait;
        self.loosen_wait = loosen_wait;
        self
    }

    /// Set the loosening gate.
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Set the overshooting threshold.
    pub fn with_overshoot_share(mut self, share: f64) -> Self {
        self.overshoot_share = share;
        self
    }

    /// Checks bounds ordering and the ranges of every real-valued field.
    pub fn validate(&self) -> Result<()> {
        non_negative("min_dampen", self.min_dampen)?;
        if self.max_dampen.is_nan() || self.max_dampen >= 1.0 {
            return Err(EquilibriumError::invalid_parameter(
                "max_dampen",
                self.max_dampen,
                "must be below 1",
            ));
        }
        if self.min_dampen > self.max_dampen {
            return Err(EquilibriumError::invalid_parameter(
                "min_dampen",
                self.min_dampen,
                "must not exceed max_dampen",
            ));
        }
        if self.loosen_step.is_nan() || self.loosen_step > 0.0 {
            return Err(EquilibriumError::invalid_parameter(
                "loosen_step",
                self.loosen_step,
                "must be non-positive",
            ));
        }
        non_negative("tighten_step", self.tighten_step)?;
        unit_interval("scale", self.scale)?;
        unit_interval("overshoot_share", self.overshoot_share)?;
        Ok(())
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<()> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(EquilibriumError::invalid_parameter(
            name,
            value,
            "must be non-negative",
        ))
    }
}

fn unit_interval(name: &'static str, value: f64) -> Result<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(EquilibriumError::invalid_parameter(
            name,
            value,
            "must lie in (0, 1]",
        ))
    }
}

/// Reports every key of `needed` that is absent from `given`.
///
/// Useful when configuration arrives as loose key/value pairs (command-line overrides,
/// environment variables) before it is deserialized into one of the structs above.
pub fn validate_keys<G, N>(given: &[G], needed: &[N]) -> Result<()>
where
    G: AsRef<str>,
    N: AsRef<str>,
{
    let missing: Vec<String> = needed
        .iter()
        .filter(|key| !given.iter().any(|g| g.as_ref() == key.as_ref()))
        .map(|key| key.as_ref().to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(EquilibriumError::MissingKeys { missing })
    }
}

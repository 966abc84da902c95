//! Damped update combinator used to write the update half of an iteration.
//!
//! The caller keeps two buffers: `main`, the current iterate, and `secondary`,
//! which receives the candidate produced by a mapping evaluation. The combinator
//! moves `main` toward the candidate through a concave map scaled by
//! `1 - dampen`, then leaves the previous iterate in `secondary` so both
//! iterates stay available for diagnostics.

use nalgebra::DVector;

use crate::distance::{ensure_same_length, sum_abs_diff, DistanceFn};
use crate::error::{EquilibriumError, Result};

/// Parameters of a single damped update.
#[derive(Clone, Debug)]
pub struct UpdateOptions {
    /// Share of the movement that is held back, in `[0, 1)`.
    pub dampen: f64,
    /// Move against the deviation instead of along it.
    pub rev: bool,
    /// Metric used to report the size of the update.
    pub distance: DistanceFn,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            dampen: 0.5,
            rev: false,
            distance: sum_abs_diff,
        }
    }
}

impl UpdateOptions {
    /// Override the dampening coefficient, e.g. with the one chosen by the controller.
    pub fn with_dampen(mut self, dampen: f64) -> Self {
        self.dampen = dampen;
        self
    }

    /// Flip the sign convention of the deviation.
    pub fn with_rev(mut self, rev: bool) -> Self {
        self.rev = rev;
        self
    }

    /// Replace the metric used to measure the step.
    pub fn with_distance(mut self, distance: DistanceFn) -> Self {
        self.distance = distance;
        self
    }

    fn validate(&self) -> Result<()> {
        validate_dampen(self.dampen)
    }

    fn step(&self, current: f64, candidate: f64) -> f64 {
        let shift = (1.0 - self.dampen) * concave_shift(candidate - current);
        if self.rev {
            current - shift
        } else {
            current + shift
        }
    }
}

/// Concave image of a raw deviation: `2 (sqrt(1 + |delta|) - 1)` with the sign of `delta`.
///
/// Slope one at the origin and strictly decreasing marginal movement, so the result
/// never exceeds `|delta|` in magnitude.
fn concave_shift(delta: f64) -> f64 {
    let magnitude = delta.abs();
    let shift = 2.0 * magnitude / ((1.0 + magnitude).sqrt() + 1.0);
    shift.copysign(delta)
}

fn validate_dampen(dampen: f64) -> Result<()> {
    if (0.0..1.0).contains(&dampen) {
        Ok(())
    } else {
        Err(EquilibriumError::invalid_parameter(
            "dampen",
            dampen,
            "must lie in [0, 1)",
        ))
    }
}

/// Computes the next iterate from `current` and `candidate` without touching either.
///
/// Returns the next iterate together with its distance from `current`.
pub fn update(
    current: &DVector<f64>,
    candidate: &DVector<f64>,
    options: &UpdateOptions,
) -> Result<(DVector<f64>, f64)> {
    options.validate()?;
    ensure_same_length(current, candidate)?;

    let next = current.zip_map(candidate, |c, k| options.step(c, k));
    let step_size = (options.distance)(&next, current)?;
    Ok((next, step_size))
}

/// Updates `main` toward the candidate held in `secondary`.
///
/// On return `main` holds the next iterate and `secondary` holds the previous
/// value of `main`, copied unchanged. The returned value is the distance between
/// the two, which callers typically compare against an update tolerance.
pub fn update_in_place(
    main: &mut DVector<f64>,
    secondary: &mut DVector<f64>,
    options: &UpdateOptions,
) -> Result<f64> {
    options.validate()?;
    ensure_same_length(main, secondary)?;

    for (current, candidate) in main.iter_mut().zip(secondary.iter_mut()) {
        let previous = *current;
        *current = options.step(previous, *candidate);
        *candidate = previous;
    }
    (options.distance)(main, secondary)
}

/// Scales a positive quantity `x` according to a deviation `dev`.
///
/// A positive `dev` raises `x`, a negative one lowers it (reversed when `rev` is
/// set). The scaling factor is `1 + (1 - dampen) * dev / (1 + |dev|)`, which
/// flattens as `|dev|` grows and always lies strictly between `dampen` and
/// `2 - dampen`.
pub fn concave_update(x: f64, dev: f64, dampen: f64, rev: bool) -> Result<f64> {
    validate_dampen(dampen)?;
    let direction = if rev { -dev } else { dev };
    let squashed = direction / (1.0 + direction.abs());
    Ok(x * (1.0 + (1.0 - dampen) * squashed))
}

//! Generalised fixed-point iteration driver.
//!
//! [`converge`] repeatedly calls a *step* function, which evaluates the mapping
//! and reports how far the iterate is from a fixed point, and an *update*
//! function, which moves the iterate and reports how far it moved. The caller's
//! problem state is threaded through both as `&mut T`, so they can share
//! buffers without interior mutability.
//!
//! [`converge_dampened`] additionally runs the adaptive dampening controller
//! between the two calls and hands the refreshed coefficient to the update.

use log::{debug, info, trace, warn};
use nalgebra::DVector;

use crate::dampen::{dynamic_dampen, DampenState};
use crate::error::{EquilibriumError, Result};
use crate::options::{ConvergeConfig, DampenConfig};

/// What a step function reports back to the driver.
#[derive(Clone, Debug, PartialEq)]
pub struct StepReport {
    /// Scalar deviation compared against `diff_tol`.
    pub diff: f64,
    /// Signed per-component deviations, used by the overshooting check.
    pub deviations: Option<DVector<f64>>,
}

impl StepReport {
    /// Report carrying only a scalar deviation.
    pub fn new(diff: f64) -> Self {
        Self {
            diff,
            deviations: None,
        }
    }

    /// Attach the per-component deviations of this step.
    pub fn with_deviations(mut self, deviations: DVector<f64>) -> Self {
        self.deviations = Some(deviations);
        self
    }
}

impl From<f64> for StepReport {
    fn from(diff: f64) -> Self {
        Self::new(diff)
    }
}

/// Terminal state of a convergence run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The deviation fell below `diff_tol`.
    Converged,
    /// The update size fell below `update_tol` first.
    Stalled,
    /// `max_iter` iterations ran without meeting either tolerance.
    Exhausted,
}

/// Diagnostics returned by the driver.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvergeSummary {
    /// How the run ended.
    pub outcome: Outcome,
    /// Number of step evaluations performed.
    pub iterations: usize,
    /// Deviation reported by the final step.
    pub last_diff: f64,
    /// Size of the final update, if any update ran.
    pub last_step: Option<f64>,
}

impl ConvergeSummary {
    /// Whether the deviation tolerance was met.
    pub fn converged(&self) -> bool {
        self.outcome == Outcome::Converged
    }

    /// Whether iteration stopped because the update became too small.
    pub fn stalled(&self) -> bool {
        self.outcome == Outcome::Stalled
    }

    /// The `(converged, stalled)` pair.
    pub fn as_pair(&self) -> (bool, bool) {
        (self.converged(), self.stalled())
    }

    /// Turns an exhausted run into [`EquilibriumError::DidNotConverge`] for callers
    /// that treat non-convergence as fatal.
    pub fn into_result(self) -> Result<Self> {
        match self.outcome {
            Outcome::Exhausted => Err(EquilibriumError::DidNotConverge {
                iterations: self.iterations,
                last_diff: self.last_diff,
            }),
            _ => Ok(self),
        }
    }
}

type InitFn<'a, T> = Box<dyn FnOnce(&mut T) -> Result<()> + 'a>;

/// Builder for a convergence run with optional initialisation and history sink.
pub struct Converge<'a, T> {
    config: ConvergeConfig,
    init: Option<InitFn<'a, T>>,
    history: Option<&'a mut Vec<f64>>,
}

impl<'a, T> Converge<'a, T> {
    /// Start configuring a run.
    pub fn new(config: ConvergeConfig) -> Self {
        Self {
            config,
            init: None,
            history: None,
        }
    }

    /// Function invoked once on the iterate before the first step.
    pub fn with_init<F>(mut self, init: F) -> Self
    where
        F: FnOnce(&mut T) -> Result<()> + 'a,
    {
        self.init = Some(Box::new(init));
        self
    }

    /// Append every step deviation to `sink`.
    pub fn with_history(mut self, sink: &'a mut Vec<f64>) -> Self {
        self.history = Some(sink);
        self
    }

    /// Iterates with a caller-controlled update.
    pub fn run<S, R, U>(self, iterate: &mut T, step: S, mut update: U) -> Result<ConvergeSummary>
    where
        S: FnMut(&mut T) -> Result<R>,
        R: Into<StepReport>,
        U: FnMut(&mut T) -> Result<f64>,
    {
        self.drive(iterate, None, step, |it, _| update(it))
    }

    /// Iterates with the dampening coefficient chosen by the adaptive controller.
    ///
    /// Every deviation is appended to `state`'s history and the component
    /// deviations reported by `step` (empty when it reports none) are rotated
    /// into it, so `state` stays current for the next run as well. The grace
    /// period restarts with each run. `update` receives the coefficient
    /// refreshed after the current step.
    pub fn run_dampened<S, R, U>(
        self,
        iterate: &mut T,
        state: &mut DampenState,
        dampen_config: &DampenConfig,
        step: S,
        mut update: U,
    ) -> Result<ConvergeSummary>
    where
        S: FnMut(&mut T) -> Result<R>,
        R: Into<StepReport>,
        U: FnMut(&mut T, f64) -> Result<f64>,
    {
        dampen_config.validate()?;
        // The coefficient is always present when a controller is attached.
        self.drive(iterate, Some((state, dampen_config)), step, |it, dampen| {
            update(it, dampen.unwrap_or_default())
        })
    }

    fn drive<S, R, U>(
        self,
        iterate: &mut T,
        mut controller: Option<(&mut DampenState, &DampenConfig)>,
        mut step: S,
        mut update: U,
    ) -> Result<ConvergeSummary>
    where
        S: FnMut(&mut T) -> Result<R>,
        R: Into<StepReport>,
        U: FnMut(&mut T, Option<f64>) -> Result<f64>,
    {
        let Converge {
            config,
            init,
            mut history,
        } = self;
        config.validate()?;

        if let Some(init) = init {
            init(iterate)?;
        }
        if let Some((state, _)) = controller.as_mut() {
            state.begin_run();
        }

        let mut last_diff = f64::INFINITY;
        let mut last_step = None;

        for iteration in 1..=config.max_iter {
            let report: StepReport = step(iterate)?.into();
            let diff = report.diff;
            last_diff = diff;

            if config.verbose {
                info!("iteration {iteration}: diff = {diff:e}");
            } else {
                trace!("iteration {iteration}: diff = {diff:e}");
            }

            if let Some(sink) = history.as_deref_mut() {
                sink.push(diff);
            }
            if let Some((state, _)) = controller.as_mut() {
                state.record_step(diff, report.deviations);
            }

            if diff < config.diff_tol {
                debug!("converged after {iteration} iterations (diff {diff:e})");
                return Ok(ConvergeSummary {
                    outcome: Outcome::Converged,
                    iterations: iteration,
                    last_diff,
                    last_step,
                });
            }

            let dampen = controller.as_mut().map(|(state, dampen_config)| {
                dynamic_dampen(state, dampen_config);
                state.dampen()
            });

            let step_size = update(iterate, dampen)?;
            last_step = Some(step_size);

            if step_size < config.update_tol {
                debug!("update stalled after {iteration} iterations (step {step_size:e})");
                return Ok(ConvergeSummary {
                    outcome: Outcome::Stalled,
                    iterations: iteration,
                    last_diff,
                    last_step,
                });
            }
        }

        warn!(
            "{} (diff {last_diff:e} after {} iterations)",
            config.message, config.max_iter
        );
        Ok(ConvergeSummary {
            outcome: Outcome::Exhausted,
            iterations: config.max_iter,
            last_diff,
            last_step,
        })
    }
}

/// Iterates `step` then `update` on `iterate` until one of the stopping rules in
/// `config` fires.
///
/// Each iteration calls `step` exactly once and, unless the deviation already
/// meets `diff_tol`, `update` exactly once. Running out of iterations is not an
/// error: the summary reports [`Outcome::Exhausted`] and the configured message
/// is logged as a warning.
pub fn converge<T, S, R, U>(
    iterate: &mut T,
    step: S,
    update: U,
    config: &ConvergeConfig,
) -> Result<ConvergeSummary>
where
    S: FnMut(&mut T) -> Result<R>,
    R: Into<StepReport>,
    U: FnMut(&mut T) -> Result<f64>,
{
    Converge::new(config.clone()).run(iterate, step, update)
}

/// Like [`converge`], with the dampening coefficient managed by
/// [`dynamic_dampen`] between each step and update.
pub fn converge_dampened<T, S, R, U>(
    iterate: &mut T,
    state: &mut DampenState,
    dampen_config: &DampenConfig,
    step: S,
    update: U,
    config: &ConvergeConfig,
) -> Result<ConvergeSummary>
where
    S: FnMut(&mut T) -> Result<R>,
    R: Into<StepReport>,
    U: FnMut(&mut T, f64) -> Result<f64>,
{
    Converge::new(config.clone()).run_dampened(iterate, state, dampen_config, step, update)
}

//! Adaptive dampening: the state carried across iterations and the controller
//! that tightens or loosens the coefficient from the convergence path.
//!
//! The controller reads three signals:
//!
//! - the scalar deviation history, to detect divergence ([`is_diverging`]),
//! - the per-component deviations of the last two steps, to detect
//!   overshooting ([`is_overshooting`]),
//! - hysteresis counters, so that consecutive adjustments are separated by a
//!   minimum number of iterations.
//!
//! Escalation (tightening) is checked first. Loosening only happens once the
//! run is past its grace period, both wait periods have elapsed, and the
//! deviation has dropped sufficiently below the value recorded at the previous
//! adjustment.

use log::debug;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::options::DampenConfig;

/// Mutable dampening state owned by one convergence run.
///
/// A state can be kept and handed to a later run to carry the coefficient and
/// history over.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DampenState {
    dampen: f64,
    iters_since_loosened: Option<usize>,
    iters_since_tightened: Option<usize>,
    reference_diff: Option<f64>,
    last_deviations: DVector<f64>,
    penultimate_deviations: DVector<f64>,
    history: Vec<f64>,
    #[serde(default)]
    run_start: usize,
}

impl Default for DampenState {
    fn default() -> Self {
        Self::with_dampen(0.85)
    }
}

impl DampenState {
    /// Fresh state with the default coefficient of 0.85.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh state starting from the given coefficient.
    pub fn with_dampen(dampen: f64) -> Self {
        Self {
            dampen,
            iters_since_loosened: None,
            iters_since_tightened: None,
            reference_diff: None,
            last_deviations: DVector::zeros(0),
            penultimate_deviations: DVector::zeros(0),
            history: Vec::new(),
            run_start: 0,
        }
    }

    /// Current dampening coefficient.
    pub fn dampen(&self) -> f64 {
        self.dampen
    }

    /// Overrides the dampening coefficient.
    pub fn set_dampen(&mut self, dampen: f64) {
        self.dampen = dampen;
    }

    /// Iterations since the last loosening, `None` if it never happened.
    pub fn iters_since_loosened(&self) -> Option<usize> {
        self.iters_since_loosened
    }

    /// Iterations since the last tightening, `None` if it never happened.
    pub fn iters_since_tightened(&self) -> Option<usize> {
        self.iters_since_tightened
    }

    /// Deviation recorded at the last adjustment, `None` before the first one.
    pub fn reference_diff(&self) -> Option<f64> {
        self.reference_diff
    }

    /// Component deviations reported by the most recent step.
    pub fn last_deviations(&self) -> &DVector<f64> {
        &self.last_deviations
    }

    /// Component deviations reported by the step before that.
    pub fn penultimate_deviations(&self) -> &DVector<f64> {
        &self.penultimate_deviations
    }

    /// Every scalar deviation recorded so far.
    pub fn history(&self) -> &[f64] {
        &self.history
    }

    /// Most recent scalar deviation.
    pub fn trailing_diff(&self) -> Option<f64> {
        self.history.last().copied()
    }

    /// Appends a scalar deviation to the history.
    pub fn push_history(&mut self, diff: f64) {
        self.history.push(diff);
    }

    /// Stores the component deviations of a new step, shifting the previous
    /// ones into the penultimate slot.
    pub fn record_deviations(&mut self, deviations: DVector<f64>) {
        self.penultimate_deviations = std::mem::replace(&mut self.last_deviations, deviations);
    }

    /// Records one step: its scalar deviation and, if reported, its component
    /// deviations. A step without components still shifts the slots, leaving
    /// `last_deviations` empty.
    pub fn record_step(&mut self, diff: f64, deviations: Option<DVector<f64>>) {
        self.push_history(diff);
        self.record_deviations(deviations.unwrap_or_else(|| DVector::zeros(0)));
    }

    /// Marks the start of a new run. The grace period counts from here while
    /// the history, counters and coefficient carry over.
    pub fn begin_run(&mut self) {
        self.run_start = self.history.len();
    }

    /// Number of deviations recorded since the last [`begin_run`](Self::begin_run).
    pub fn run_iterations(&self) -> usize {
        self.history.len().saturating_sub(self.run_start)
    }

    /// Applies a decision taken by [`decide`] and clamps the coefficient into bounds.
    pub fn apply(&mut self, action: DampenAction, config: &DampenConfig) {
        match action {
            DampenAction::Tighten => {
                self.dampen += config.tighten_step;
                self.iters_since_tightened = Some(0);
                self.iters_since_loosened = increment(self.iters_since_loosened);
                self.reference_diff = self.trailing_diff();
            }
            DampenAction::Loosen => {
                self.dampen += config.loosen_step;
                self.iters_since_loosened = Some(0);
                self.iters_since_tightened = increment(self.iters_since_tightened);
                self.reference_diff = self.trailing_diff();
            }
            DampenAction::Hold(_) => {
                self.iters_since_loosened = increment(self.iters_since_loosened);
                self.iters_since_tightened = increment(self.iters_since_tightened);
            }
        }
        self.dampen = self.dampen.max(config.min_dampen).min(config.max_dampen);
    }
}

fn increment(counter: Option<usize>) -> Option<usize> {
    counter.map(|n| n.saturating_add(1))
}

fn waited(counter: Option<usize>, wait: usize) -> bool {
    counter.map_or(true, |n| n >= wait)
}

/// Outcome of one controller evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DampenAction {
    /// Raise the coefficient by `tighten_step`.
    Tighten,
    /// Lower the coefficient by `|loosen_step|`.
    Loosen,
    /// Leave the coefficient unchanged.
    Hold(HoldReason),
}

/// Why the controller left the coefficient unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HoldReason {
    /// Divergence or overshooting was detected but the last tightening is too recent.
    EscalationCoolingDown,
    /// The current run has not yet completed `grace_period` iterations.
    GracePeriod,
    /// Fewer than `tighten_wait` iterations since the last tightening.
    TightenWait,
    /// Fewer than `loosen_wait` iterations since the last loosening.
    LoosenWait,
    /// The deviation is still above `scale * reference_diff`.
    NotCalm,
}

/// Decides the next adjustment without modifying the state.
pub fn decide(state: &DampenState, config: &DampenConfig) -> DampenAction {
    let escalate = is_diverging(&state.history)
        || is_overshooting(
            &state.last_deviations,
            &state.penultimate_deviations,
            config.overshoot_share,
        );
    if escalate {
        return if waited(state.iters_since_tightened, config.tighten_wait) {
            DampenAction::Tighten
        } else {
            DampenAction::Hold(HoldReason::EscalationCoolingDown)
        };
    }

    // A run with no recorded step counts as still being in the grace period.
    if state.run_iterations() == 0 || state.run_iterations() < config.grace_period {
        return DampenAction::Hold(HoldReason::GracePeriod);
    }
    if !waited(state.iters_since_tightened, config.tighten_wait) {
        return DampenAction::Hold(HoldReason::TightenWait);
    }
    if !waited(state.iters_since_loosened, config.loosen_wait) {
        return DampenAction::Hold(HoldReason::LoosenWait);
    }
    if let (Some(trailing), Some(reference)) = (state.trailing_diff(), state.reference_diff) {
        if trailing > config.scale * reference {
            return DampenAction::Hold(HoldReason::NotCalm);
        }
    }
    DampenAction::Loosen
}

/// Updates the dampening coefficient based on the convergence path.
///
/// Equivalent to [`decide`] followed by [`DampenState::apply`].
pub fn dynamic_dampen(state: &mut DampenState, config: &DampenConfig) -> DampenAction {
    let action = decide(state, config);
    let before = state.dampen;
    state.apply(action, config);
    match action {
        DampenAction::Hold(_) => {}
        _ => debug!(
            "dampening {:?}: {before:.4} -> {:.4} after {} iterations",
            action,
            state.dampen,
            state.history.len()
        ),
    }
    action
}

/// Checks whether iteration is on a bad path.
///
/// Looks at the last three transitions of `history` (fewer if the history is
/// short) and reports divergence when at least two of them increased the
/// deviation. This catches both a blow-up and an improve/worsen oscillation.
/// Histories with fewer than three entries are never diverging.
pub fn is_diverging(history: &[f64]) -> bool {
    if history.len() < 3 {
        return false;
    }
    let window = &history[history.len().saturating_sub(4)..];
    let worsened = window.windows(2).filter(|pair| pair[1] > pair[0]).count();
    worsened >= 2
}

/// Checks whether more than `share` of the component deviations flipped sign
/// between the last two iterations.
///
/// Returns false when either vector is empty or their lengths differ, which
/// happens during the first iteration of a run.
pub fn is_overshooting(
    last_deviations: &DVector<f64>,
    penultimate_deviations: &DVector<f64>,
    share: f64,
) -> bool {
    let n = last_deviations.len();
    if n == 0 || n != penultimate_deviations.len() {
        return false;
    }
    let flipped = last_deviations
        .iter()
        .zip(penultimate_deviations.iter())
        .filter(|(a, b)| *a * *b < 0.0)
        .count();
    flipped as f64 / n as f64 > share
}

/// Checks whether the last `tail` deviations decrease at a decelerating rate.
///
/// Every first difference must be at most `tol` (no meaningful increase) and
/// every second difference at least `-tol` (no acceleration). Requires
/// `tail >= 3` and at least `tail` entries.
pub fn is_convex(history: &[f64], tail: usize, tol: f64) -> bool {
    if tail < 3 || history.len() < tail {
        return false;
    }
    let window = &history[history.len() - tail..];
    let decreasing = window.windows(2).all(|pair| pair[1] - pair[0] <= tol);
    let decelerating = window
        .windows(3)
        .all(|triple| triple[2] - 2.0 * triple[1] + triple[0] >= -tol);
    decreasing && decelerating
}

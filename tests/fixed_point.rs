use std::ops::Range;

use approx::assert_relative_eq;
use equilibria::distance::max_abs_diff;
use equilibria::update::{update_in_place, UpdateOptions};
use equilibria::{
    converge, converge_dampened, Converge, ConvergeConfig, DampenConfig, DampenState, Outcome,
    StepReport,
};
use nalgebra::DVector;

/// Mean-utility inversion for a homogeneous logit: find `delta` such that predicted
/// shares match observed shares, iterating `delta + ln(s) - ln(s(delta))`.
struct LogitInversion {
    markets: Vec<Range<usize>>,
    observed: DVector<f64>,
    delta: DVector<f64>,
    candidate: DVector<f64>,
}

impl LogitInversion {
    fn new(markets: Vec<Range<usize>>, observed: DVector<f64>) -> Self {
        let n = observed.len();
        Self {
            markets,
            observed,
            delta: DVector::zeros(n),
            candidate: DVector::zeros(n),
        }
    }

    fn predicted_shares(&self) -> DVector<f64> {
        let mut predicted = DVector::zeros(self.delta.len());
        for market in &self.markets {
            let denominator: f64 = 1.0 + market.clone().map(|j| self.delta[j].exp()).sum::<f64>();
            for j in market.clone() {
                predicted[j] = self.delta[j].exp() / denominator;
            }
        }
        predicted
    }

    /// Writes the contraction image into `candidate` and returns the log-share gaps.
    fn evaluate(&mut self) -> DVector<f64> {
        let predicted = self.predicted_shares();
        let gaps = self.observed.zip_map(&predicted, |s, p| s.ln() - p.ln());
        self.candidate = &self.delta + &gaps;
        gaps
    }
}

fn two_market_problem() -> LogitInversion {
    LogitInversion::new(vec![0..2, 2..3], DVector::from_vec(vec![0.3, 0.2, 0.4]))
}

fn closed_form_delta() -> DVector<f64> {
    DVector::from_vec(vec![
        -0.510_825_623_765_9907,
        -0.916_290_731_874_155,
        -0.405_465_108_108_1644,
    ])
}

#[test]
fn fixed_dampening_recovers_logit_delta() {
    let mut problem = two_market_problem();
    let options = UpdateOptions::default()
        .with_dampen(0.0)
        .with_distance(max_abs_diff);
    let config = ConvergeConfig::default()
        .with_diff_tol(1e-13)
        .with_max_iter(500);

    let summary = converge(
        &mut problem,
        |p| {
            p.evaluate();
            max_abs_diff(&p.candidate, &p.delta)
        },
        |p| update_in_place(&mut p.delta, &mut p.candidate, &options),
        &config,
    )
    .unwrap();

    assert!(summary.converged());
    assert!(summary.iterations < 100);
    assert_relative_eq!(problem.delta, closed_form_delta(), epsilon = 1e-10);
    let predicted = problem.predicted_shares();
    assert_relative_eq!(predicted, problem.observed, epsilon = 1e-10);
}

#[test]
fn adaptive_dampening_recovers_logit_delta_and_tracks_history() {
    let mut problem = two_market_problem();
    let mut state = DampenState::new();
    let config = ConvergeConfig::default()
        .with_diff_tol(1e-12)
        .with_max_iter(2_000);

    let summary = converge_dampened(
        &mut problem,
        &mut state,
        &DampenConfig::default(),
        |p| {
            let gaps = p.evaluate();
            let diff = max_abs_diff(&p.candidate, &p.delta)?;
            Ok(StepReport::new(diff).with_deviations(gaps))
        },
        |p, dampen| {
            let options = UpdateOptions::default().with_dampen(dampen);
            update_in_place(&mut p.delta, &mut p.candidate, &options)
        },
        &config,
    )
    .unwrap();

    assert_eq!(summary.outcome, Outcome::Converged);
    assert_eq!(state.history().len(), summary.iterations);
    assert_eq!(state.last_deviations().len(), 3);
    // A monotone contraction never trips the escalation heuristics, so the
    // controller only ever loosens.
    assert!(state.dampen() < 0.85);
    assert!(state.iters_since_tightened().is_none());
    assert_relative_eq!(problem.delta, closed_form_delta(), epsilon = 1e-9);
}

/// Scalar mapping `g(x) = 2.5 - 1.5 x` with fixed point 1. Undamped iteration
/// crosses the fixed point on every step.
struct Oscillator {
    x: DVector<f64>,
    candidate: DVector<f64>,
}

impl Oscillator {
    fn new() -> Self {
        Self {
            x: DVector::zeros(1),
            candidate: DVector::zeros(1),
        }
    }

    fn step(&mut self) -> StepReport {
        self.candidate = self.x.map(|x| 2.5 - 1.5 * x);
        let deviations = &self.candidate - &self.x;
        StepReport::new(deviations.amax()).with_deviations(deviations)
    }
}

#[test]
fn undamped_oscillation_exhausts_iterations() {
    let mut oscillator = Oscillator::new();
    let options = UpdateOptions::default().with_dampen(0.0);
    let config = ConvergeConfig::default()
        .with_diff_tol(1e-10)
        .with_max_iter(500);

    let summary = converge(
        &mut oscillator,
        |o| Ok(o.step()),
        |o| update_in_place(&mut o.x, &mut o.candidate, &options),
        &config,
    )
    .unwrap();

    assert_eq!(summary.as_pair(), (false, false));
    assert_eq!(summary.iterations, 500);
    // The concave step settles into a cycle of amplitude 0.5 around the fixed point.
    assert_relative_eq!(summary.last_diff, 1.25, epsilon = 1e-6);
}

#[test]
fn adaptive_dampening_stops_the_oscillation() {
    let mut oscillator = Oscillator::new();
    let mut state = DampenState::with_dampen(0.0);
    let dampen_config = DampenConfig::default()
        .with_steps(0.01, 0.05)
        .with_bounds(0.0, 0.95)
        .with_waits(5, 2, 10);
    let mut history = Vec::new();
    let config = ConvergeConfig::default()
        .with_diff_tol(1e-10)
        .with_max_iter(500);

    let summary = Converge::new(config)
        .with_history(&mut history)
        .run_dampened(
            &mut oscillator,
            &mut state,
            &dampen_config,
            |o| Ok(o.step()),
            |o, dampen| {
                let options = UpdateOptions::default().with_dampen(dampen);
                update_in_place(&mut o.x, &mut o.candidate, &options)
            },
        )
        .unwrap();

    assert!(summary.converged());
    assert!(summary.iterations < 100);
    assert!(state.dampen() > 0.2);
    assert_eq!(history.as_slice(), state.history());
    assert_relative_eq!(oscillator.x[0], 1.0, epsilon = 1e-9);
}

#[test]
fn state_carries_over_between_runs() {
    let mut state = DampenState::with_dampen(0.3);
    let dampen_config = DampenConfig::default().with_waits(0, 0, 0);
    let config = ConvergeConfig::default().with_max_iter(3);
    let mut unit = ();

    for _ in 0..2 {
        let summary = converge_dampened(
            &mut unit,
            &mut state,
            &dampen_config,
            |_| Ok(1.0),
            |_, _| Ok(1.0),
            &config,
        )
        .unwrap();
        assert_eq!(summary.outcome, Outcome::Exhausted);
    }

    assert_eq!(state.history(), &[1.0; 6]);
    assert!(state.dampen() < 0.3);
}

fn assert_coefficients(seen: &[f64], expected: &[f64]) {
    assert_eq!(seen.len(), expected.len(), "{seen:?}");
    for (got, want) in seen.iter().zip(expected) {
        assert_relative_eq!(*got, *want, epsilon = 1e-12);
    }
}

#[test]
fn grace_period_restarts_when_state_is_reused() {
    let dampen_config = DampenConfig::default().with_waits(3, 0, 0);
    let mut state = DampenState::with_dampen(0.5);
    // Deviation shrinks by 10% per step across both runs, always calm enough to loosen.
    let mut k = 0usize;
    let mut run = |state: &mut DampenState, max_iter: usize| {
        let mut seen = Vec::new();
        converge_dampened(
            &mut k,
            state,
            &dampen_config,
            |k: &mut usize| {
                *k += 1;
                Ok(0.9_f64.powi(*k as i32))
            },
            |_, dampen| {
                seen.push(dampen);
                Ok(1.0)
            },
            &ConvergeConfig::default().with_max_iter(max_iter),
        )
        .unwrap();
        seen
    };

    let first = run(&mut state, 5);
    assert_coefficients(&first, &[0.5, 0.5, 0.49, 0.48, 0.47]);

    let second = run(&mut state, 4);
    assert_coefficients(&second, &[0.47, 0.47, 0.46, 0.45]);
    assert_eq!(state.history().len(), 9);
    assert_eq!(state.run_iterations(), 4);
}

#[test]
fn component_deviations_do_not_leak_into_a_scalar_only_run() {
    let dampen_config = DampenConfig::default().with_waits(0, 0, 0);
    let mut state = DampenState::with_dampen(0.5);

    // First run reports flipping components: loosen, then tighten on the flip.
    let mut sign = 1.0_f64;
    converge_dampened(
        &mut sign,
        &mut state,
        &dampen_config,
        |sign: &mut f64| {
            *sign = -*sign;
            Ok(StepReport::new(1.0).with_deviations(DVector::from_element(2, *sign)))
        },
        |_, _| Ok(1.0),
        &ConvergeConfig::default().with_max_iter(2),
    )
    .unwrap();
    assert_relative_eq!(state.dampen(), 0.5, epsilon = 1e-12);
    assert_eq!(state.iters_since_tightened(), Some(0));
    assert_eq!(state.penultimate_deviations(), &DVector::from_element(2, -1.0));

    // Second run improves monotonically and reports no components.
    let mut seen = Vec::new();
    let mut n = 0usize;
    converge_dampened(
        &mut n,
        &mut state,
        &dampen_config,
        |n: &mut usize| {
            *n += 1;
            Ok(1.0 / *n as f64)
        },
        |_, dampen| {
            seen.push(dampen);
            Ok(1.0)
        },
        &ConvergeConfig::default().with_max_iter(4),
    )
    .unwrap();

    // 1.0 is not below 0.925 times the deviation at the tightening, so the
    // first iteration holds; afterwards every step is calm.
    assert_coefficients(&seen, &[0.5, 0.49, 0.48, 0.47]);
    assert_eq!(state.last_deviations().len(), 0);
    assert_eq!(state.iters_since_tightened(), Some(4));
}

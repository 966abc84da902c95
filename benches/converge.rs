use criterion::{black_box, criterion_group, criterion_main, Criterion};
use equilibria::update::{update_in_place, UpdateOptions};
use equilibria::{converge_dampened, ConvergeConfig, DampenConfig, DampenState, StepReport};
use nalgebra::DVector;

struct Linear {
    x: DVector<f64>,
    candidate: DVector<f64>,
}

/// Componentwise `g(x) = 2.5 - 1.5 x`, which oscillates without dampening.
fn oscillating_system(c: &mut Criterion) {
    let dampen_config = DampenConfig::default()
        .with_steps(0.01, 0.05)
        .with_waits(5, 2, 10);
    let config = ConvergeConfig::default()
        .with_diff_tol(1e-10)
        .with_max_iter(1_000);

    c.bench_function("dampened oscillating system (n = 256)", |b| {
        b.iter(|| {
            let mut system = Linear {
                x: DVector::zeros(256),
                candidate: DVector::zeros(256),
            };
            let mut state = DampenState::with_dampen(0.0);
            let summary = converge_dampened(
                &mut system,
                &mut state,
                &dampen_config,
                |s| {
                    s.candidate = s.x.map(|x| 2.5 - 1.5 * x);
                    let deviations = &s.candidate - &s.x;
                    Ok(StepReport::new(deviations.amax()).with_deviations(deviations))
                },
                |s, dampen| {
                    let options = UpdateOptions::default().with_dampen(dampen);
                    update_in_place(&mut s.x, &mut s.candidate, &options)
                },
                &config,
            )
            .expect("valid configuration");
            black_box(summary)
        })
    });
}

criterion_group!(benches, oscillating_system);
criterion_main!(benches);

//! Fixed-point iteration with adaptive dampening for computing economic equilibria.
//!
//! Equilibrium problems are often solved by iterating a mapping until some
//! condition such as "excess demand = 0" holds. This crate supplies the loop
//! around such a mapping without knowing anything about the model:
//!
//! - a generic convergence driver (`solving` module),
//! - a damped update combinator with concave step sizes (`update` module),
//! - an adaptive dampening controller that tightens on divergence or
//!   overshooting and loosens once iteration calms down (`dampen` module),
//! - deviation metrics (`distance` module),
//! - a bounded Newton–Raphson solver and small vector helpers (`newton` and
//!   `utils` modules).
//!
//! # Quick start
//!
//! ```no_run
//! use equilibria::update::{update_in_place, UpdateOptions};
//! use equilibria::{converge, ConvergeConfig};
//! use nalgebra::DVector;
//!
//! struct Prices {
//!     current: DVector<f64>,
//!     candidate: DVector<f64>,
//! }
//!
//! let mut prices = Prices {
//!     current: DVector::from_element(3, 1.0),
//!     candidate: DVector::zeros(3),
//! };
//! let options = UpdateOptions::default().with_dampen(0.5);
//!
//! let summary = converge(
//!     &mut prices,
//!     |p| {
//!         // Evaluate the mapping and store its image as the candidate.
//!         p.candidate = p.current.map(|x| 0.5 * x + 1.0);
//!         Ok((&p.candidate - &p.current).amax())
//!     },
//!     |p| update_in_place(&mut p.current, &mut p.candidate, &options),
//!     &ConvergeConfig::default(),
//! )
//! .expect("valid configuration");
//! assert!(summary.converged());
//! ```

pub mod dampen;
pub mod distance;
pub mod error;
pub mod newton;
pub mod options;
pub mod solving;
pub mod update;
pub mod utils;

pub use dampen::{dynamic_dampen, DampenAction, DampenState};
pub use error::{EquilibriumError, Result};
pub use options::{ConvergeConfig, DampenConfig};
pub use solving::{converge, converge_dampened, Converge, ConvergeSummary, Outcome, StepReport};

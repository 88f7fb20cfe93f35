//! Nonlinear optimizers over a flat parameter vector.
//!
//! The optimizers never see a network. They minimise an [`Objective`]: any
//! scalar function of a weight vector that can also report its gradient and
//! curvature-vector products. [`NetworkObjective`](crate::NetworkObjective)
//! is the adapter that turns a network, a dataset and a loss into one.
//!
//! Each method implements [`Method::step`], which advances one epoch. The
//! [`Trainer`] owns the loop around it: stopping criteria, the smoothed
//! error, the per-epoch hook and the call counters.
//!
//! | Method | Type | Curvature |
//! |--------|------|-----------|
//! | `gd` | [`GradientDescent`] | none |
//! | `cgfr`, `cgpr` | [`ConjugateGradient`] | none |
//! | `dfp`, `bfgs` | [`QuasiNewton`] | secant estimate |
//! | `lm` | [`LevenbergMarquardt`] | `Hv` or `Gv` products |
//!
//! # Example
//!
//! ```rust
//! use netfit::optimizer::{ConjugateGradient, Objective, StopCriteria, Trainer};
//! use netfit::optimizer::line_search::GoldenSection;
//!
//! /// f(x) = Σ (x_i − 1)²
//! struct Bowl;
//!
//! impl Objective for Bowl {
//!     fn dim(&self) -> usize { 3 }
//!     fn value(&mut self, w: &[f64]) -> f64 {
//!         w.iter().map(|x| (x - 1.0) * (x - 1.0)).sum()
//!     }
//!     fn gradient(&mut self, w: &[f64], grad: &mut [f64]) -> f64 {
//!         for (g, x) in grad.iter_mut().zip(w) { *g = 2.0 * (x - 1.0); }
//!         self.value(w)
//!     }
//!     fn hessian_vector(&mut self, _w: &[f64], v: &[f64], out: &mut [f64]) {
//!         for (o, x) in out.iter_mut().zip(v) { *o = 2.0 * x; }
//!     }
//! }
//!
//! let mut method = ConjugateGradient::polak_ribiere(Box::new(GoldenSection::default()));
//! let mut weights = vec![0.0; 3];
//! let trainer = Trainer::new(StopCriteria { error_tolerance: 1e-12, ..Default::default() });
//! let report = trainer.minimize(&mut method, &mut Bowl, &mut weights, |_| Default::default());
//! assert!(report.error < 1e-8);
//! ```

pub mod conjugate;
pub mod gradient_descent;
pub mod levenberg;
pub mod line_search;
pub mod quasi_newton;
pub mod trainer;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, TrainConfig};

pub use conjugate::{BetaRule, ConjugateGradient};
pub use gradient_descent::{ExponentialDecay, GradientDescent, RateSchedule};
pub use levenberg::LevenbergMarquardt;
pub use line_search::{LineSearch, LineSearchKind};
pub use quasi_newton::{QuasiNewton, SecantUpdate};
pub use trainer::{fit, Control, Progress, Report, StopCriteria, StopReason, Trainer};

/// A scalar function of a weight vector with first and second order
/// information.
pub trait Objective {
    /// Length of the weight vector.
    fn dim(&self) -> usize;

    /// `f(w)`. Non-finite values are treated as `+∞` by the optimizers.
    fn value(&mut self, w: &[f64]) -> f64;

    /// Writes `∇f(w)` into `grad` and returns `f(w)`.
    fn gradient(&mut self, w: &[f64], grad: &mut [f64]) -> f64;

    /// Writes the exact Hessian-vector product `∇²f(w)·v` into `out`.
    fn hessian_vector(&mut self, w: &[f64], v: &[f64], out: &mut [f64]);

    /// Writes a positive semi-definite curvature product into `out`.
    ///
    /// Defaults to the exact Hessian product.
    fn gauss_newton_vector(&mut self, w: &[f64], v: &[f64], out: &mut [f64]) {
        self.hessian_vector(w, v, out);
    }

    /// Called by the trainer after every epoch.
    ///
    /// Returns `true` when the function itself changed (a new pattern
    /// subset), so values and gradients taken before the call are stale.
    fn end_epoch(&mut self, _epoch: usize) -> bool {
        false
    }

    /// Called by the trainer with the final weights.
    fn accept(&mut self, _w: &[f64]) {}
}

/// Which curvature product a second-order method asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Curvature {
    /// Exact `∇²f·v`.
    Hessian,
    /// `Jᵀ·L''·J·v`, never indefinite for convex losses.
    #[default]
    GaussNewton,
}

impl Curvature {
    /// Canonical name.
    pub fn name(self) -> &'static str {
        match self {
            Curvature::Hessian => "hessian",
            Curvature::GaussNewton => "gauss_newton",
        }
    }
}

impl FromStr for Curvature {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hessian" | "exact" => Ok(Curvature::Hessian),
            "gauss_newton" | "gauss-newton" | "gn" => Ok(Curvature::GaussNewton),
            _ => Err(ConfigError::UnknownCurvature(s.to_string())),
        }
    }
}

/// Number of calls made into an objective.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    /// `value` calls.
    pub function_calls: usize,
    /// `gradient` calls.
    pub gradient_calls: usize,
    /// Curvature-product calls.
    pub curvature_calls: usize,
}

/// Counting wrapper the methods evaluate the objective through.
pub struct Evaluator<'o> {
    objective: &'o mut dyn Objective,
    counters: Counters,
}

impl<'o> Evaluator<'o> {
    /// Wraps an objective.
    pub fn new(objective: &'o mut dyn Objective) -> Self {
        Self {
            objective,
            counters: Counters::default(),
        }
    }

    /// Length of the weight vector.
    #[inline]
    pub fn dim(&self) -> usize {
        self.objective.dim()
    }

    /// Calls so far.
    #[inline]
    pub fn counters(&self) -> Counters {
        self.counters
    }

    /// `f(w)`, with non-finite results mapped to `+∞`.
    pub fn value(&mut self, w: &[f64]) -> f64 {
        self.counters.function_calls += 1;
        finite_or_inf(self.objective.value(w))
    }

    /// `∇f(w)` into `grad`; returns `f(w)` mapped like [`value`](Self::value).
    pub fn gradient(&mut self, w: &[f64], grad: &mut [f64]) -> f64 {
        self.counters.gradient_calls += 1;
        finite_or_inf(self.objective.gradient(w, grad))
    }

    /// Curvature product of the requested kind into `out`.
    pub fn curvature(&mut self, w: &[f64], v: &[f64], out: &mut [f64], kind: Curvature) {
        self.counters.curvature_calls += 1;
        match kind {
            Curvature::Hessian => self.objective.hessian_vector(w, v, out),
            Curvature::GaussNewton => self.objective.gauss_newton_vector(w, v, out),
        }
    }

    pub(crate) fn end_epoch(&mut self, epoch: usize) -> bool {
        self.objective.end_epoch(epoch)
    }

    pub(crate) fn accept(&mut self, w: &[f64]) {
        self.objective.accept(w);
    }
}

#[inline]
fn finite_or_inf(f: f64) -> f64 {
    if f.is_finite() {
        f
    } else {
        f64::INFINITY
    }
}

/// Optimizer state carried between epochs.
///
/// On entry to and exit from [`Method::step`], `gradient` and `error` are
/// the gradient and value at `weights`.
#[derive(Debug, Clone, PartialEq)]
pub struct OptState {
    /// Current point.
    pub weights: Vec<f64>,
    /// `∇f(weights)`.
    pub gradient: Vec<f64>,
    /// `f(weights)`.
    pub error: f64,
    /// Length of the last step along the search direction (0 before the first).
    pub step_size: f64,
    /// Completed epochs.
    pub epoch: usize,
}

/// Result of one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The method moved (or legitimately stayed) and can continue.
    Progress,
    /// The gradient is exactly zero; the method did not move.
    Stationary,
    /// No decrease is possible from the current point.
    Stalled,
}

/// An optimization method, advanced one epoch at a time.
pub trait Method {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Discards memory from previous runs and sizes buffers for `dim` weights.
    fn reset(&mut self, dim: usize);

    /// Advances one epoch from `state`.
    fn step(&mut self, eval: &mut Evaluator<'_>, state: &mut OptState) -> StepOutcome;
}

/// The closed set of optimizer methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MethodKind {
    /// Steepest descent with momentum.
    #[serde(rename = "gd")]
    GradientDescent,
    /// Conjugate gradient, Fletcher–Reeves.
    #[serde(rename = "cgfr")]
    ConjugateFletcherReeves,
    /// Conjugate gradient, Polak–Ribière.
    #[serde(rename = "cgpr")]
    ConjugatePolakRibiere,
    /// Quasi-Newton, Davidon–Fletcher–Powell.
    #[serde(rename = "dfp")]
    Dfp,
    /// Quasi-Newton, Broyden–Fletcher–Goldfarb–Shanno.
    #[serde(rename = "bfgs")]
    Bfgs,
    /// Levenberg–Marquardt.
    #[serde(rename = "lm")]
    LevenbergMarquardt,
}

impl MethodKind {
    /// Canonical name.
    pub fn name(self) -> &'static str {
        match self {
            MethodKind::GradientDescent => "gd",
            MethodKind::ConjugateFletcherReeves => "cgfr",
            MethodKind::ConjugatePolakRibiere => "cgpr",
            MethodKind::Dfp => "dfp",
            MethodKind::Bfgs => "bfgs",
            MethodKind::LevenbergMarquardt => "lm",
        }
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MethodKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gd" | "sgd" | "gradient_descent" => Ok(MethodKind::GradientDescent),
            "cgfr" | "fletcher_reeves" => Ok(MethodKind::ConjugateFletcherReeves),
            "cgpr" | "cg" | "polak_ribiere" => Ok(MethodKind::ConjugatePolakRibiere),
            "dfp" => Ok(MethodKind::Dfp),
            "bfgs" => Ok(MethodKind::Bfgs),
            "lm" | "levenberg_marquardt" => Ok(MethodKind::LevenbergMarquardt),
            _ => Err(ConfigError::UnknownMethod(s.to_string())),
        }
    }
}

/// Builds the optimizer a training configuration asks for.
///
/// Gradient descent with the `stc` line search uses search-then-converge
/// as its rate schedule; otherwise it uses `rate · rate_decay^t`.
pub fn build_method(config: &TrainConfig) -> Result<Box<dyn Method>, ConfigError> {
    config.validate()?;
    let search = config.line_search_kind()?;
    let line_search = || search.build(config);
    let method: Box<dyn Method> = match config.method_kind()? {
        MethodKind::GradientDescent => {
            let schedule: Box<dyn RateSchedule> = match search {
                LineSearchKind::SearchThenConverge => Box::new(
                    line_search::SearchThenConverge::new(config.eta0, config.tau),
                ),
                _ => Box::new(ExponentialDecay::new(config.rate, config.rate_decay)),
            };
            Box::new(GradientDescent::new(schedule, config.momentum))
        }
        MethodKind::ConjugateFletcherReeves => Box::new(
            ConjugateGradient::fletcher_reeves(line_search()).with_restart(config.restart_every),
        ),
        MethodKind::ConjugatePolakRibiere => Box::new(
            ConjugateGradient::polak_ribiere(line_search()).with_restart(config.restart_every),
        ),
        MethodKind::Dfp => Box::new(QuasiNewton::new(SecantUpdate::Dfp, line_search())),
        MethodKind::Bfgs => Box::new(QuasiNewton::new(SecantUpdate::Bfgs, line_search())),
        MethodKind::LevenbergMarquardt => Box::new(
            LevenbergMarquardt::new(config.lambda)
                .with_damping_factors(config.lambda_up, config.lambda_down)
                .with_inner_iterations(config.cg_iterations)
                .with_curvature(config.curvature_kind()?),
        ),
    };
    Ok(method)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant;

    impl Objective for Constant {
        fn dim(&self) -> usize {
            1
        }
        fn value(&mut self, _w: &[f64]) -> f64 {
            f64::NAN
        }
        fn gradient(&mut self, _w: &[f64], grad: &mut [f64]) -> f64 {
            grad[0] = 0.0;
            1.0
        }
        fn hessian_vector(&mut self, _w: &[f64], v: &[f64], out: &mut [f64]) {
            out[0] = 3.0 * v[0];
        }
    }

    #[test]
    fn test_evaluator_counts_and_maps_nan() {
        let mut objective = Constant;
        let mut eval = Evaluator::new(&mut objective);
        assert_eq!(eval.value(&[0.0]), f64::INFINITY);
        let mut g = [1.0];
        assert_eq!(eval.gradient(&[0.0], &mut g), 1.0);
        let mut out = [0.0];
        eval.curvature(&[0.0], &[2.0], &mut out, Curvature::GaussNewton);
        assert_eq!(out[0], 6.0);
        assert_eq!(
            eval.counters(),
            Counters {
                function_calls: 1,
                gradient_calls: 1,
                curvature_calls: 1
            }
        );
    }

    #[test]
    fn test_method_names() {
        for name in ["gd", "cgfr", "cgpr", "dfp", "bfgs", "lm"] {
            let kind: MethodKind = name.parse().unwrap();
            assert_eq!(kind.name(), name);
        }
        assert!("adam".parse::<MethodKind>().is_err());
    }

    #[test]
    fn test_build_every_method() {
        for (method, name) in [
            ("gd", "gd"),
            ("cgfr", "cgfr"),
            ("cgpr", "cgpr"),
            ("dfp", "dfp"),
            ("bfgs", "bfgs"),
            ("lm", "lm"),
        ] {
            let config = TrainConfig {
                method: method.into(),
                ..Default::default()
            };
            assert_eq!(build_method(&config).unwrap().name(), name);
        }
    }

    #[test]
    fn test_curvature_names() {
        assert_eq!("gn".parse::<Curvature>().unwrap(), Curvature::GaussNewton);
        assert_eq!("hessian".parse::<Curvature>().unwrap(), Curvature::Hessian);
        assert!("bogus".parse::<Curvature>().is_err());
    }
}

//! Levenberg–Marquardt with matrix-free inner solves.
//!
//! Each attempt solves the damped system `(B + λI)·p = −g` by linear
//! conjugate gradient, where `B·v` is a curvature product from the
//! objective. The Jacobian is never formed. A trial point that lowers the
//! error is accepted and `λ` shrinks; otherwise `λ` grows and the solve is
//! repeated from the same point.

use log::debug;

use crate::kernels::{axpy, dot, norm, norm_sq};
use crate::optimizer::{Curvature, Evaluator, Method, OptState, StepOutcome};

/// Smallest damping.
pub const MIN_LAMBDA: f64 = 1e-12;

/// Largest damping.
pub const MAX_LAMBDA: f64 = 1e12;

/// Damped solves tried per epoch before giving up.
pub const MAX_ATTEMPTS: usize = 10;

/// Relative residual at which the inner solve stops.
const INNER_TOLERANCE: f64 = 1e-10;

/// Levenberg–Marquardt.
#[derive(Debug, Clone)]
pub struct LevenbergMarquardt {
    initial_lambda: f64,
    lambda: f64,
    up: f64,
    down: f64,
    inner_iterations: Option<usize>,
    curvature: Curvature,
    step: Vec<f64>,
    trial: Vec<f64>,
    residual: Vec<f64>,
    conjugate: Vec<f64>,
    product: Vec<f64>,
}

impl LevenbergMarquardt {
    /// Creates the method with initial damping `lambda`.
    pub fn new(lambda: f64) -> Self {
        let lambda = lambda.clamp(MIN_LAMBDA, MAX_LAMBDA);
        Self {
            initial_lambda: lambda,
            lambda,
            up: 10.0,
            down: 0.1,
            inner_iterations: None,
            curvature: Curvature::default(),
            step: Vec::new(),
            trial: Vec::new(),
            residual: Vec::new(),
            conjugate: Vec::new(),
            product: Vec::new(),
        }
    }

    /// Factors applied to `λ` after a rejected and an accepted step.
    pub fn with_damping_factors(mut self, up: f64, down: f64) -> Self {
        self.up = up;
        self.down = down;
        self
    }

    /// Inner conjugate-gradient iterations; `None` uses the weight count.
    pub fn with_inner_iterations(mut self, iterations: Option<usize>) -> Self {
        self.inner_iterations = iterations;
        self
    }

    /// Curvature product used for `B`.
    pub fn with_curvature(mut self, curvature: Curvature) -> Self {
        self.curvature = curvature;
        self
    }

    /// Current damping.
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Approximately solves `(B + λI)·p = −g` into `self.step`.
    fn solve(&mut self, eval: &mut Evaluator<'_>, weights: &[f64], gradient: &[f64]) {
        let n = weights.len();
        self.step.fill(0.0);
        for (r, g) in self.residual.iter_mut().zip(gradient) {
            *r = -g;
        }
        self.conjugate.copy_from_slice(&self.residual);
        let mut rr = norm_sq(&self.residual);
        let stop = INNER_TOLERANCE * rr.sqrt();

        for _ in 0..self.inner_iterations.unwrap_or(n).max(1) {
            eval.curvature(weights, &self.conjugate, &mut self.product, self.curvature);
            axpy(self.lambda, &self.conjugate, &mut self.product);
            let dbd = dot(&self.conjugate, &self.product);
            if !(dbd > 0.0) {
                break;
            }
            let a = rr / dbd;
            axpy(a, &self.conjugate, &mut self.step);
            axpy(-a, &self.product, &mut self.residual);
            let rr_next = norm_sq(&self.residual);
            if rr_next.sqrt() <= stop {
                break;
            }
            let beta = rr_next / rr;
            for (d, r) in self.conjugate.iter_mut().zip(&self.residual) {
                *d = r + beta * *d;
            }
            rr = rr_next;
        }

        if self.step.iter().all(|&p| p == 0.0) {
            let scale = -1.0 / (1.0 + self.lambda);
            for (p, g) in self.step.iter_mut().zip(gradient) {
                *p = scale * g;
            }
        }
    }
}

impl Method for LevenbergMarquardt {
    fn name(&self) -> &'static str {
        "lm"
    }

    fn reset(&mut self, dim: usize) {
        self.lambda = self.initial_lambda;
        self.step = vec![0.0; dim];
        self.trial = vec![0.0; dim];
        self.residual = vec![0.0; dim];
        self.conjugate = vec![0.0; dim];
        self.product = vec![0.0; dim];
    }

    fn step(&mut self, eval: &mut Evaluator<'_>, state: &mut OptState) -> StepOutcome {
        if self.step.len() != state.weights.len() {
            self.reset(state.weights.len());
        }
        if norm_sq(&state.gradient) == 0.0 {
            state.step_size = 0.0;
            return StepOutcome::Stationary;
        }

        for _ in 0..MAX_ATTEMPTS {
            self.solve(eval, &state.weights, &state.gradient);
            for ((t, w), p) in self.trial.iter_mut().zip(&state.weights).zip(&self.step) {
                *t = w + p;
            }
            let value = eval.value(&self.trial);
            if value < state.error {
                state.weights.copy_from_slice(&self.trial);
                state.error = eval.gradient(&state.weights, &mut state.gradient);
                state.step_size = norm(&self.step);
                self.lambda = (self.lambda * self.down).clamp(MIN_LAMBDA, MAX_LAMBDA);
                return StepOutcome::Progress;
            }
            self.lambda = (self.lambda * self.up).clamp(MIN_LAMBDA, MAX_LAMBDA);
            debug!(
                "lm: rejected step ({:e} >= {:e}), lambda -> {:e}",
                value, state.error, self.lambda
            );
        }
        StepOutcome::Stalled
    }
}

//! Quasi-Newton methods with a dense inverse-Hessian estimate.
//!
//! The estimate `H ≈ (∇²f)⁻¹` starts as the identity and is corrected after
//! every step from `s = w₊ − w` and `y = g₊ − g`. Storage is `n²`, so these
//! methods suit networks with a few thousand weights at most.

use log::{debug, warn};

use crate::kernels::{dot, norm};
use crate::optimizer::line_search::{LineSearch, Ray};
use crate::optimizer::{Evaluator, Method, OptState, StepOutcome};

/// Relative curvature below which a secant pair is skipped.
const CURVATURE_GUARD: f64 = 1e-10;

/// The inverse-Hessian correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecantUpdate {
    /// Davidon–Fletcher–Powell.
    Dfp,
    /// Broyden–Fletcher–Goldfarb–Shanno.
    Bfgs,
}

/// DFP or BFGS with a pluggable line search.
#[derive(Debug)]
pub struct QuasiNewton {
    update: SecantUpdate,
    line_search: Box<dyn LineSearch>,
    /// Row-major `n × n`.
    inverse: Vec<f64>,
    dim: usize,
    identity: bool,
    direction: Vec<f64>,
    s: Vec<f64>,
    y: Vec<f64>,
    hy: Vec<f64>,
}

impl QuasiNewton {
    /// Creates the method.
    pub fn new(update: SecantUpdate, line_search: Box<dyn LineSearch>) -> Self {
        Self {
            update,
            line_search,
            inverse: Vec::new(),
            dim: 0,
            identity: true,
            direction: Vec::new(),
            s: Vec::new(),
            y: Vec::new(),
            hy: Vec::new(),
        }
    }

    /// BFGS.
    pub fn bfgs(line_search: Box<dyn LineSearch>) -> Self {
        Self::new(SecantUpdate::Bfgs, line_search)
    }

    /// DFP.
    pub fn dfp(line_search: Box<dyn LineSearch>) -> Self {
        Self::new(SecantUpdate::Dfp, line_search)
    }

    /// Current inverse-Hessian estimate, row-major.
    pub fn inverse_hessian(&self) -> &[f64] {
        &self.inverse
    }

    fn reset_inverse(&mut self) {
        self.inverse.fill(0.0);
        for i in 0..self.dim {
            self.inverse[i * self.dim + i] = 1.0;
        }
        self.identity = true;
    }

    /// `out = H·v`
    fn apply(&self, v: &[f64], out: &mut [f64]) {
        for (row, o) in self.inverse.chunks_exact(self.dim).zip(out.iter_mut()) {
            *o = dot(row, v);
        }
    }

    fn search_direction(&mut self, gradient: &[f64]) {
        let mut direction = std::mem::take(&mut self.direction);
        self.apply(gradient, &mut direction);
        for d in &mut direction {
            *d = -*d;
        }
        self.direction = direction;
    }

    /// Applies the secant correction from `self.s` and `self.y`.
    fn correct(&mut self) {
        let n = self.dim;
        let ys = dot(&self.y, &self.s);
        if ys <= CURVATURE_GUARD * norm(&self.y) * norm(&self.s) {
            debug!("{}: skipping update, yᵀs = {:e}", self.name(), ys);
            return;
        }
        let mut hy = std::mem::take(&mut self.hy);
        self.apply(&self.y, &mut hy);
        let yhy = dot(&self.y, &hy);

        match self.update {
            SecantUpdate::Bfgs => {
                // H += ((yᵀs + yᵀHy) / (yᵀs)²)·ssᵀ − (Hy·sᵀ + s·(Hy)ᵀ) / yᵀs
                let a = (ys + yhy) / (ys * ys);
                for i in 0..n {
                    let row = &mut self.inverse[i * n..(i + 1) * n];
                    for j in 0..n {
                        row[j] += a * self.s[i] * self.s[j]
                            - (hy[i] * self.s[j] + self.s[i] * hy[j]) / ys;
                    }
                }
            }
            SecantUpdate::Dfp => {
                if yhy <= 0.0 {
                    debug!("dfp: skipping update, yᵀHy = {:e}", yhy);
                    self.hy = hy;
                    return;
                }
                // H += ssᵀ / yᵀs − Hy·(Hy)ᵀ / yᵀHy
                for i in 0..n {
                    let row = &mut self.inverse[i * n..(i + 1) * n];
                    for j in 0..n {
                        row[j] += self.s[i] * self.s[j] / ys - hy[i] * hy[j] / yhy;
                    }
                }
            }
        }
        self.hy = hy;
        self.identity = false;
    }
}

impl Method for QuasiNewton {
    fn name(&self) -> &'static str {
        match self.update {
            SecantUpdate::Dfp => "dfp",
            SecantUpdate::Bfgs => "bfgs",
        }
    }

    fn reset(&mut self, dim: usize) {
        self.dim = dim;
        self.inverse = vec![0.0; dim * dim];
        self.direction = vec![0.0; dim];
        self.s = vec![0.0; dim];
        self.y = vec![0.0; dim];
        self.hy = vec![0.0; dim];
        self.reset_inverse();
        self.line_search.reset();
    }

    fn step(&mut self, eval: &mut Evaluator<'_>, state: &mut OptState) -> StepOutcome {
        if self.dim != state.weights.len() {
            self.reset(state.weights.len());
        }
        if state.gradient.iter().all(|&g| g == 0.0) {
            state.step_size = 0.0;
            return StepOutcome::Stationary;
        }

        let step = loop {
            self.search_direction(&state.gradient);
            let mut slope = dot(&state.gradient, &self.direction);
            if !(slope < 0.0) && !self.identity {
                debug!("{}: estimate lost positive definiteness, resetting", self.name());
                self.reset_inverse();
                self.search_direction(&state.gradient);
                slope = dot(&state.gradient, &self.direction);
            }

            let step = {
                let mut ray = Ray::new(eval, &state.weights, &self.direction);
                self.line_search.search(&mut ray, state.error, slope, 1.0)
            };
            if step.moved() {
                break step;
            }
            if self.identity {
                warn!("{}: line search found no decrease along -g", self.name());
                return StepOutcome::Stalled;
            }
            debug!("{}: no decrease along quasi-Newton direction, resetting", self.name());
            self.reset_inverse();
        };

        for ((w, s), d) in state
            .weights
            .iter_mut()
            .zip(&mut self.s)
            .zip(&self.direction)
        {
            *s = step.alpha * d;
            *w += *s;
        }
        state.step_size = norm(&self.s);

        self.y.copy_from_slice(&state.gradient);
        state.error = eval.gradient(&state.weights, &mut state.gradient);
        for (y, g) in self.y.iter_mut().zip(&state.gradient) {
            *y = g - *y;
        }
        self.correct();
        StepOutcome::Progress
    }
}

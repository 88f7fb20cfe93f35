//! Nonlinear conjugate gradient.

use log::{debug, warn};

use crate::kernels::{dot, norm, norm_sq};
use crate::optimizer::line_search::{LineSearch, Ray};
use crate::optimizer::{Evaluator, Method, OptState, StepOutcome};

/// How the next direction mixes in the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BetaRule {
    /// `β = |g₊|² / |g|²`
    FletcherReeves,
    /// `β = max(0, g₊·(g₊ − g) / |g|²)`
    PolakRibiere,
}

impl BetaRule {
    /// `β` from the previous gradient `g` and the new gradient `g_new`.
    pub fn beta(self, g: &[f64], g_new: &[f64]) -> f64 {
        let denom = norm_sq(g);
        if denom == 0.0 {
            return 0.0;
        }
        match self {
            BetaRule::FletcherReeves => norm_sq(g_new) / denom,
            BetaRule::PolakRibiere => {
                let num: f64 = g_new.iter().zip(g).map(|(n, o)| n * (n - o)).sum();
                (num / denom).max(0.0)
            }
        }
    }
}

/// Conjugate gradient with a pluggable line search.
///
/// Directions are `d₊ = −g₊ + β·d`. The method falls back to steepest
/// descent when the direction stops being a descent direction, every
/// `restart_every` epochs, and when the line search finds no decrease
/// along a conjugate direction.
#[derive(Debug)]
pub struct ConjugateGradient {
    rule: BetaRule,
    line_search: Box<dyn LineSearch>,
    restart_every: Option<usize>,
    direction: Vec<f64>,
    previous_grad: Vec<f64>,
    since_restart: usize,
    last_alpha: f64,
}

impl ConjugateGradient {
    /// Creates the method with an explicit rule.
    pub fn new(rule: BetaRule, line_search: Box<dyn LineSearch>) -> Self {
        Self {
            rule,
            line_search,
            restart_every: None,
            direction: Vec::new(),
            previous_grad: Vec::new(),
            since_restart: 0,
            last_alpha: 0.0,
        }
    }

    /// Fletcher–Reeves.
    pub fn fletcher_reeves(line_search: Box<dyn LineSearch>) -> Self {
        Self::new(BetaRule::FletcherReeves, line_search)
    }

    /// Polak–Ribière.
    pub fn polak_ribiere(line_search: Box<dyn LineSearch>) -> Self {
        Self::new(BetaRule::PolakRibiere, line_search)
    }

    /// Restart period; `None` restarts every `dim` epochs.
    pub fn with_restart(mut self, every: Option<usize>) -> Self {
        self.restart_every = every;
        self
    }

    /// The β rule in use.
    pub fn rule(&self) -> BetaRule {
        self.rule
    }

    fn steepest(&mut self, gradient: &[f64]) {
        for (d, g) in self.direction.iter_mut().zip(gradient) {
            *d = -g;
        }
        self.since_restart = 0;
    }
}

impl Method for ConjugateGradient {
    fn name(&self) -> &'static str {
        match self.rule {
            BetaRule::FletcherReeves => "cgfr",
            BetaRule::PolakRibiere => "cgpr",
        }
    }

    fn reset(&mut self, dim: usize) {
        self.direction = vec![0.0; dim];
        self.previous_grad = vec![0.0; dim];
        self.since_restart = 0;
        self.last_alpha = 0.0;
        self.line_search.reset();
    }

    fn step(&mut self, eval: &mut Evaluator<'_>, state: &mut OptState) -> StepOutcome {
        let n = state.weights.len();
        if self.direction.len() != n {
            self.reset(n);
        }
        if norm_sq(&state.gradient) == 0.0 {
            state.step_size = 0.0;
            return StepOutcome::Stationary;
        }
        if state.epoch == 0 || self.since_restart == 0 {
            self.steepest(&state.gradient);
        }

        let mut slope = dot(&state.gradient, &self.direction);
        if slope >= 0.0 {
            debug!("{}: direction is not a descent direction, restarting", self.name());
            self.steepest(&state.gradient);
            slope = -norm_sq(&state.gradient);
        }

        let mut step = {
            let mut ray = Ray::new(eval, &state.weights, &self.direction);
            self.line_search
                .search(&mut ray, state.error, slope, self.last_alpha)
        };
        if !step.moved() {
            if self.since_restart == 0 {
                warn!("{}: line search found no decrease along -g", self.name());
                return StepOutcome::Stalled;
            }
            debug!("{}: no decrease along conjugate direction, restarting", self.name());
            self.steepest(&state.gradient);
            slope = -norm_sq(&state.gradient);
            let mut ray = Ray::new(eval, &state.weights, &self.direction);
            step = self
                .line_search
                .search(&mut ray, state.error, slope, self.last_alpha);
            if !step.moved() {
                warn!("{}: line search found no decrease along -g", self.name());
                return StepOutcome::Stalled;
            }
        }

        for (w, d) in state.weights.iter_mut().zip(&self.direction) {
            *w += step.alpha * d;
        }
        state.step_size = step.alpha.abs() * norm(&self.direction);
        self.last_alpha = step.alpha;

        self.previous_grad.copy_from_slice(&state.gradient);
        state.error = eval.gradient(&state.weights, &mut state.gradient);
        self.since_restart += 1;

        let period = self.restart_every.unwrap_or(n).max(1);
        if self.since_restart >= period {
            self.since_restart = 0;
        } else {
            let beta = self.rule.beta(&self.previous_grad, &state.gradient);
            for (d, g) in self.direction.iter_mut().zip(&state.gradient) {
                *d = -g + beta * *d;
            }
        }
        StepOutcome::Progress
    }
}

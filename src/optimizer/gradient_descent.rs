//! Gradient descent with momentum and a rate schedule.

use log::debug;

use crate::kernels::norm_sq;
use crate::optimizer::{Evaluator, Method, OptState, StepOutcome};

/// Learning rate schedule trait.
pub trait RateSchedule: std::fmt::Debug {
    /// Learning rate for the given epoch.
    fn rate(&self, epoch: usize) -> f64;
}

/// `rate · decay^epoch`
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialDecay {
    /// Initial learning rate.
    pub rate: f64,
    /// Per-epoch decay factor.
    pub decay: f64,
}

impl ExponentialDecay {
    /// Creates a schedule.
    pub fn new(rate: f64, decay: f64) -> Self {
        Self { rate, decay }
    }

    /// Constant rate.
    pub fn constant(rate: f64) -> Self {
        Self::new(rate, 1.0)
    }
}

impl RateSchedule for ExponentialDecay {
    fn rate(&self, epoch: usize) -> f64 {
        self.rate * self.decay.powi(epoch.min(i32::MAX as usize) as i32)
    }
}

/// Gradient descent with momentum.
///
/// Each epoch moves `w ← w − η_t·u` with `u ← μ·u + ∇f(w)`. The step is
/// taken unconditionally, so the error may rise; with sub-sampling this is
/// the stochastic variant. A step that lands on a non-finite value is
/// undone, the momentum cleared and the rate halved from then on.
#[derive(Debug)]
pub struct GradientDescent {
    schedule: Box<dyn RateSchedule>,
    /// Momentum coefficient.
    pub momentum: f64,
    velocity: Vec<f64>,
    previous: Vec<f64>,
    previous_grad: Vec<f64>,
    damping: f64,
}

impl GradientDescent {
    /// Creates the method with a rate schedule and momentum.
    pub fn new(schedule: Box<dyn RateSchedule>, momentum: f64) -> Self {
        Self {
            schedule,
            momentum,
            velocity: Vec::new(),
            previous: Vec::new(),
            previous_grad: Vec::new(),
            damping: 1.0,
        }
    }

    /// Plain gradient descent with a constant rate.
    pub fn vanilla(rate: f64) -> Self {
        Self::new(Box::new(ExponentialDecay::constant(rate)), 0.0)
    }
}

impl Method for GradientDescent {
    fn name(&self) -> &'static str {
        "gd"
    }

    fn reset(&mut self, dim: usize) {
        self.velocity = vec![0.0; dim];
        self.previous = vec![0.0; dim];
        self.previous_grad = vec![0.0; dim];
        self.damping = 1.0;
    }

    fn step(&mut self, eval: &mut Evaluator<'_>, state: &mut OptState) -> StepOutcome {
        if self.velocity.len() != state.weights.len() {
            self.reset(state.weights.len());
        }
        if norm_sq(&state.gradient) == 0.0 {
            state.step_size = 0.0;
            return StepOutcome::Stationary;
        }

        let rate = self.damping * self.schedule.rate(state.epoch);
        let previous_error = state.error;
        self.previous.copy_from_slice(&state.weights);
        self.previous_grad.copy_from_slice(&state.gradient);

        for ((w, u), g) in state
            .weights
            .iter_mut()
            .zip(&mut self.velocity)
            .zip(&state.gradient)
        {
            *u = self.momentum * *u + g;
            *w -= rate * *u;
        }
        state.error = eval.gradient(&state.weights, &mut state.gradient);
        state.step_size = rate;

        if !state.error.is_finite() {
            debug!(
                "gd: non-finite error at rate {:e}, undoing step and halving the rate",
                rate
            );
            state.weights.copy_from_slice(&self.previous);
            state.gradient.copy_from_slice(&self.previous_grad);
            state.error = previous_error;
            self.velocity.fill(0.0);
            self.damping *= 0.5;
            state.step_size = 0.0;
        }
        StepOutcome::Progress
    }
}

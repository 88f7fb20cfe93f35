//! The epoch loop.
//!
//! [`Trainer::minimize`] drives any [`Method`] over any [`Objective`]:
//! it computes the initial gradient, steps once per epoch, keeps the
//! exponentially smoothed error, calls the user hook with a [`Progress`]
//! snapshot and checks the stopping criteria in a fixed order. [`fit`] is
//! the one-call entry point from a [`TrainConfig`].

use std::fmt;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::config::{TrainConfig, DEFAULT_ERROR_DECAY, DEFAULT_MAX_EPOCHS};
use crate::dataset::Dataset;
use crate::error::NetfitResult;
use crate::kernels::norm;
use crate::network::Network;
use crate::objective::NetworkObjective;
use crate::optimizer::{build_method, Counters, Evaluator, Method, Objective, OptState, StepOutcome};

/// What the per-epoch hook asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Control {
    /// Keep training.
    #[default]
    Continue,
    /// Stop after this epoch.
    Stop,
}

/// Why training ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The error fell below the tolerance.
    ErrorTolerance,
    /// The per-epoch error change fell below the tolerance.
    DeltaTolerance,
    /// The epoch limit was reached.
    MaxEpochs,
    /// The method could not decrease the error.
    Stalled,
    /// The gradient vanished exactly.
    Stationary,
    /// The hook returned [`Control::Stop`].
    HookRequested,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::ErrorTolerance => "error tolerance reached",
            StopReason::DeltaTolerance => "error change below tolerance",
            StopReason::MaxEpochs => "epoch limit reached",
            StopReason::Stalled => "no further decrease",
            StopReason::Stationary => "gradient vanished",
            StopReason::HookRequested => "stopped by hook",
        };
        f.write_str(s)
    }
}

/// When to stop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopCriteria {
    /// Hard upper bound on epochs.
    pub max_epochs: usize,
    /// Tolerance checks start after this many epochs.
    pub min_epochs: usize,
    /// Stop once the error falls below this value.
    pub error_tolerance: f64,
    /// Stop once `|E_{t−1} − E_t|` falls below this value; `0` disables.
    pub delta_tolerance: f64,
}

impl Default for StopCriteria {
    fn default() -> Self {
        Self {
            max_epochs: DEFAULT_MAX_EPOCHS,
            min_epochs: 0,
            error_tolerance: 1e-6,
            delta_tolerance: 0.0,
        }
    }
}

/// Snapshot passed to the hook after every epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Epochs completed, starting at 1.
    pub epoch: usize,
    /// Error at the current weights.
    pub error: f64,
    /// Exponentially smoothed error.
    pub decayed_error: f64,
    /// Length of the last step.
    pub step_size: f64,
    /// `|∇f|` at the current weights.
    pub gradient_norm: f64,
    /// Objective calls so far.
    pub counters: Counters,
}

/// Outcome of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Epochs run.
    pub epochs: usize,
    /// Final error.
    pub error: f64,
    /// Final smoothed error.
    pub decayed_error: f64,
    /// Final `|∇f|`.
    pub gradient_norm: f64,
    /// Why the loop ended.
    pub stop_reason: StopReason,
    /// Objective calls.
    pub counters: Counters,
}

impl Report {
    /// True when a tolerance or a vanished gradient ended the run.
    pub fn converged(&self) -> bool {
        matches!(
            self.stop_reason,
            StopReason::ErrorTolerance | StopReason::DeltaTolerance | StopReason::Stationary
        )
    }
}

/// Epoch loop with stopping criteria.
#[derive(Debug, Clone, PartialEq)]
pub struct Trainer {
    /// Stopping criteria.
    pub criteria: StopCriteria,
    /// Decay `k` of the smoothed error `Ē ← k·Ē + (1 − k)·E`.
    pub error_decay: f64,
}

impl Default for Trainer {
    fn default() -> Self {
        Self::new(StopCriteria::default())
    }
}

impl Trainer {
    /// Creates a trainer.
    pub fn new(criteria: StopCriteria) -> Self {
        Self {
            criteria,
            error_decay: DEFAULT_ERROR_DECAY,
        }
    }

    /// Sets the smoothing factor of the decayed error.
    pub fn with_error_decay(mut self, decay: f64) -> Self {
        self.error_decay = decay;
        self
    }

    /// Minimises `objective` from `weights`, leaving the final point there.
    ///
    /// `hook` runs after every epoch; returning [`Control::Stop`] ends the
    /// run after that epoch. Stopping checks run in this order: hook,
    /// stall, error tolerance, vanished gradient, delta tolerance, epoch
    /// limit. Everything but the hook, the stall and the epoch limit is
    /// only checked from `min_epochs` on; a stall below the error
    /// tolerance from then on is reported as [`StopReason::ErrorTolerance`].
    ///
    /// When the objective redraws its pattern subset between epochs, the
    /// error and gradient are recomputed on the new subset before the
    /// next step.
    pub fn minimize<H>(
        &self,
        method: &mut dyn Method,
        objective: &mut dyn Objective,
        weights: &mut [f64],
        mut hook: H,
    ) -> Report
    where
        H: FnMut(&Progress) -> Control,
    {
        let criteria = &self.criteria;
        let k = self.error_decay;
        let mut eval = Evaluator::new(objective);
        let dim = weights.len();
        method.reset(dim);

        let mut gradient = vec![0.0; dim];
        let error = eval.gradient(weights, &mut gradient);
        let mut state = OptState {
            weights: weights.to_vec(),
            gradient,
            error,
            step_size: 0.0,
            epoch: 0,
        };
        let mut decayed = error;

        info!(
            "{}: {} weights, initial error {:.6e}, up to {} epochs",
            method.name(),
            dim,
            error,
            criteria.max_epochs
        );

        let stop_reason = loop {
            let previous = state.error;
            let outcome = method.step(&mut eval, &mut state);
            state.epoch += 1;
            decayed = decayed * k + state.error * (1.0 - k);

            let progress = Progress {
                epoch: state.epoch,
                error: state.error,
                decayed_error: decayed,
                step_size: state.step_size,
                gradient_norm: norm(&state.gradient),
                counters: eval.counters(),
            };
            debug!(
                "epoch {}: error {:.6e}, decayed {:.6e}, step {:.3e}, |g| {:.3e}",
                progress.epoch,
                progress.error,
                progress.decayed_error,
                progress.step_size,
                progress.gradient_norm
            );
            let control = hook(&progress);

            let checking = state.epoch >= criteria.min_epochs;
            let reached = checking && state.error < criteria.error_tolerance;
            if control == Control::Stop {
                break StopReason::HookRequested;
            }
            if outcome == StepOutcome::Stalled {
                break if reached {
                    StopReason::ErrorTolerance
                } else {
                    StopReason::Stalled
                };
            }
            if reached {
                break StopReason::ErrorTolerance;
            }
            if checking && outcome == StepOutcome::Stationary {
                break StopReason::Stationary;
            }
            if checking
                && criteria.delta_tolerance > 0.0
                && (previous - state.error).abs() < criteria.delta_tolerance
            {
                break StopReason::DeltaTolerance;
            }
            if state.epoch >= criteria.max_epochs {
                break StopReason::MaxEpochs;
            }

            if eval.end_epoch(state.epoch) {
                state.error = eval.gradient(&state.weights, &mut state.gradient);
                debug!("new pattern subset, error {:.6e}", state.error);
            }
        };

        weights.copy_from_slice(&state.weights);
        eval.accept(weights);

        let report = Report {
            epochs: state.epoch,
            error: state.error,
            decayed_error: decayed,
            gradient_norm: norm(&state.gradient),
            stop_reason,
            counters: eval.counters(),
        };
        info!(
            "{}: {} after {} epochs, error {:.6e}",
            method.name(),
            report.stop_reason,
            report.epochs,
            report.error
        );
        report
    }
}

/// Trains `network` on `data` as `config` describes.
///
/// The network's weights are replaced by the final weights.
///
/// # Example
///
/// ```rust
/// use netfit::{fit, MemoryDataset, Network, NetworkConfig, TrainConfig};
///
/// let mut network = Network::new(&NetworkConfig::xor().with_seed(3)).unwrap();
/// let data = MemoryDataset::xor();
/// let config = TrainConfig { max_epochs: 5, ..Default::default() };
/// let report = fit(&mut network, &data, &config, |_| Default::default()).unwrap();
/// assert!(report.epochs <= 5);
/// ```
pub fn fit<D, H>(
    network: &mut Network,
    data: &D,
    config: &TrainConfig,
    hook: H,
) -> NetfitResult<Report>
where
    D: Dataset + ?Sized,
    H: FnMut(&Progress) -> Control,
{
    config.validate()?;
    let mut method = build_method(config)?;
    let loss = config.loss_fn()?;
    let mut weights = network.weights().to_vec();

    let mut objective = NetworkObjective::new(network, data, loss)?;
    if let Some(subsample) = config.subsample {
        objective = objective.with_subsample(subsample, StdRng::seed_from_u64(config.seed))?;
    }

    let trainer = Trainer::new(config.stop_criteria()).with_error_decay(config.error_decay);
    Ok(trainer.minimize(method.as_mut(), &mut objective, &mut weights, hook))
}

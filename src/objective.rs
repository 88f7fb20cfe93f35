//! Network + dataset + loss as an optimizer [`Objective`].
//!
//! The error is the mean over the active patterns of the per-pattern loss
//! summed over outputs:
//!
//! ```text
//! E(w) = (1/|P|) · Σ_{p∈P} Σ_k L(y_k(x_p; w), t_pk)
//! ```
//!
//! `P` is the whole dataset, or with [`SubSample`] a random subset redrawn
//! at every epoch boundary. Within an epoch value, gradient and curvature
//! products all see the same subset.
//!
//! # Example
//!
//! ```rust
//! use netfit::optimizer::Objective;
//! use netfit::{Loss, MemoryDataset, Network, NetworkConfig, NetworkObjective};
//!
//! let mut network = Network::new(&NetworkConfig::xor().with_seed(9)).unwrap();
//! let data = MemoryDataset::xor();
//! let w = network.weights().to_vec();
//!
//! let mut objective = NetworkObjective::new(&mut network, &data, Loss::Quadratic).unwrap();
//! let mut grad = vec![0.0; w.len()];
//! let error = objective.gradient(&w, &mut grad);
//! assert_eq!(error, objective.value(&w));
//! ```

use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::dataset::Dataset;
use crate::error::{NetfitError, NetfitResult};
use crate::loss::Loss;
use crate::network::Network;
use crate::optimizer::Objective;
use crate::workspace::Workspace;

/// Mini-batch schedule: the active fraction at epoch `t` is
/// `1 − (1 − fraction)·decay^t`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubSample {
    /// Fraction of patterns used at epoch 0, in `(0, 1]`.
    pub fraction: f64,
    /// Per-epoch decay of the excluded fraction, in `[0, 1]`.
    pub decay: f64,
}

impl SubSample {
    /// Fixed fraction.
    pub fn fixed(fraction: f64) -> Self {
        Self {
            fraction,
            decay: 1.0,
        }
    }

    /// Fraction of patterns active at `epoch`.
    pub fn fraction_at(&self, epoch: usize) -> f64 {
        let exponent = epoch.min(i32::MAX as usize) as i32;
        1.0 - (1.0 - self.fraction) * self.decay.powi(exponent)
    }

    /// Number of patterns out of `n` active at `epoch`, in `[1, n]`.
    pub fn count_at(&self, epoch: usize, n: usize) -> usize {
        let k = (self.fraction_at(epoch) * n as f64).ceil();
        (k as usize).clamp(1, n.max(1))
    }

    /// Checks both parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fraction > 0.0 && self.fraction <= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "subsample.fraction",
                reason: "must be in (0, 1]",
            });
        }
        if !(0.0..=1.0).contains(&self.decay) {
            return Err(ConfigError::InvalidValue {
                field: "subsample.decay",
                reason: "must be in [0, 1]",
            });
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Sampler {
    schedule: SubSample,
    rng: StdRng,
}

/// Adapter exposing a network's training error to the optimizers.
///
/// Holds the network mutably for its lifetime: every evaluation loads the
/// requested weights into the network first. [`Objective::accept`] leaves
/// the final weights in place.
#[derive(Debug)]
pub struct NetworkObjective<'a, D: Dataset + ?Sized> {
    network: &'a mut Network,
    data: &'a D,
    loss: Loss,
    workspace: Workspace,
    active: Vec<usize>,
    sampler: Option<Sampler>,
    slope: Vec<f64>,
    curvature: Vec<f64>,
    r_seed: Vec<f64>,
}

impl<'a, D: Dataset + ?Sized> NetworkObjective<'a, D> {
    /// Creates an objective over the whole dataset.
    ///
    /// # Errors
    ///
    /// [`NetfitError::EmptyDataset`] for an empty dataset and
    /// [`NetfitError::ShapeMismatch`] when the row lengths differ from the
    /// network's input and output sizes.
    pub fn new(network: &'a mut Network, data: &'a D, loss: Loss) -> NetfitResult<Self> {
        loss.validate()?;
        if data.is_empty() {
            return Err(NetfitError::EmptyDataset);
        }
        if data.x_size() != network.input_size() || data.y_size() != network.output_size() {
            return Err(NetfitError::shape_mismatch(
                &[network.input_size(), network.output_size()],
                &[data.x_size(), data.y_size()],
            ));
        }
        let outputs = network.output_size();
        let workspace = network.create_workspace();
        Ok(Self {
            network,
            data,
            loss,
            workspace,
            active: (0..data.len()).collect(),
            sampler: None,
            slope: vec![0.0; outputs],
            curvature: vec![0.0; outputs],
            r_seed: vec![0.0; outputs],
        })
    }

    /// Evaluates on a random subset drawn from `rng`, redrawn every epoch.
    pub fn with_subsample(mut self, schedule: SubSample, rng: StdRng) -> NetfitResult<Self> {
        schedule.validate()?;
        self.sampler = Some(Sampler { schedule, rng });
        self.draw(0);
        Ok(self)
    }

    /// Error at the network's current weights.
    pub fn error(&mut self) -> f64 {
        self.mean_error()
    }

    /// The wrapped network.
    pub fn network(&self) -> &Network {
        &*self.network
    }

    /// Indices of the patterns currently evaluated.
    pub fn active(&self) -> &[usize] {
        &self.active
    }

    fn draw(&mut self, epoch: usize) {
        let n = self.data.len();
        let Some(sampler) = self.sampler.as_mut() else {
            return;
        };
        let k = sampler.schedule.count_at(epoch, n);
        self.active = if k == n {
            (0..n).collect()
        } else {
            let mut picked = index::sample(&mut sampler.rng, n, k).into_vec();
            picked.sort_unstable();
            picked
        };
    }

    #[inline]
    fn scale(&self) -> f64 {
        1.0 / self.active.len() as f64
    }

    fn mean_error(&mut self) -> f64 {
        let mut sum = 0.0;
        for &p in &self.active {
            let out = self.network.forward(self.data.x(p), &mut self.workspace);
            sum += self.loss.total(out, self.data.y(p));
        }
        sum * self.scale()
    }

    /// Shared by both curvature products.
    fn curvature_product(&mut self, w: &[f64], v: &[f64], out: &mut [f64], exact: bool) {
        self.network.load_weights(w);
        self.workspace.zero_curvature();
        let outputs = self.network.output_layer().units();
        for &p in &self.active {
            let y = self.network.forward(self.data.x(p), &mut self.workspace);
            self.loss
                .accumulate(y, self.data.y(p), &mut self.slope, &mut self.curvature);
            self.network.r_forward(v, &mut self.workspace);
            let ry = &self.workspace.r_act[outputs.clone()];
            for ((r, c), ry) in self.r_seed.iter_mut().zip(&self.curvature).zip(ry) {
                *r = c * ry;
            }
            if exact {
                self.network
                    .r_backward(&self.slope, &self.r_seed, v, &mut self.workspace);
            } else {
                self.network
                    .gauss_newton_backward(&self.r_seed, &mut self.workspace);
            }
        }
        let scale = self.scale();
        for (o, c) in out.iter_mut().zip(self.workspace.curvature_product()) {
            *o = c * scale;
        }
    }
}

impl<D: Dataset + ?Sized> Objective for NetworkObjective<'_, D> {
    fn dim(&self) -> usize {
        self.network.num_weights()
    }

    fn value(&mut self, w: &[f64]) -> f64 {
        self.network.load_weights(w);
        self.mean_error()
    }

    fn gradient(&mut self, w: &[f64], grad: &mut [f64]) -> f64 {
        self.network.load_weights(w);
        self.workspace.zero_gradient();
        let mut sum = 0.0;
        for &p in &self.active {
            let y = self.network.forward(self.data.x(p), &mut self.workspace);
            sum += self
                .loss
                .accumulate(y, self.data.y(p), &mut self.slope, &mut self.curvature);
            self.network.backward(&self.slope, &mut self.workspace);
        }
        let scale = self.scale();
        for (g, acc) in grad.iter_mut().zip(self.workspace.gradient()) {
            *g = acc * scale;
        }
        sum * scale
    }

    fn hessian_vector(&mut self, w: &[f64], v: &[f64], out: &mut [f64]) {
        self.curvature_product(w, v, out, true);
    }

    fn gauss_newton_vector(&mut self, w: &[f64], v: &[f64], out: &mut [f64]) {
        self.curvature_product(w, v, out, false);
    }

    fn end_epoch(&mut self, epoch: usize) -> bool {
        if self.sampler.is_none() {
            return false;
        }
        let previous = std::mem::take(&mut self.active);
        self.draw(epoch);
        self.active != previous
    }

    fn accept(&mut self, w: &[f64]) {
        self.network.load_weights(w);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::dataset::MemoryDataset;
    use rand::SeedableRng;

    fn regression_data(n: usize) -> MemoryDataset {
        let mut data = MemoryDataset::new(2, 1);
        for i in 0..n {
            let x = [i as f64 / n as f64, 1.0 - i as f64 / n as f64];
            data.push(&x, &[x[0] * x[1]]).unwrap();
        }
        data
    }

    #[test]
    fn test_subsample_schedule() {
        let s = SubSample {
            fraction: 0.25,
            decay: 0.5,
        };
        assert_eq!(s.fraction_at(0), 0.25);
        assert_eq!(s.fraction_at(1), 0.625);
        assert_eq!(s.count_at(0, 10), 3);
        assert_eq!(s.count_at(0, 2), 1);
        assert_eq!(SubSample::fixed(1e-9).count_at(0, 100), 1);
        assert_eq!(SubSample::fixed(1.0).count_at(5, 7), 7);
        assert!(SubSample::fixed(0.0).validate().is_err());
        assert!(SubSample { fraction: 0.5, decay: 1.5 }.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_and_mismatched_data() {
        let mut network = Network::new(&NetworkConfig::xor().with_seed(1)).unwrap();
        let empty = MemoryDataset::new(2, 1);
        assert!(matches!(
            NetworkObjective::new(&mut network, &empty, Loss::Quadratic),
            Err(NetfitError::EmptyDataset)
        ));
        let wide = regression_data(3);
        let wrong = MemoryDataset::from_rows(&[vec![1.0]], &[vec![1.0]]).unwrap();
        assert!(NetworkObjective::new(&mut network, &wide, Loss::Quadratic).is_ok());
        assert!(matches!(
            NetworkObjective::new(&mut network, &wrong, Loss::Quadratic),
            Err(NetfitError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_value_is_mean_pattern_loss() {
        let mut network = Network::new(&NetworkConfig::xor().with_seed(4)).unwrap();
        let data = MemoryDataset::xor();
        let w = network.weights().to_vec();
        let mut expected = 0.0;
        for p in 0..data.len() {
            let y = network.evaluate(data.x(p)).unwrap();
            expected += 0.5 * (y[0] - data.y(p)[0]).powi(2);
        }
        expected /= 4.0;
        let mut objective = NetworkObjective::new(&mut network, &data, Loss::Quadratic).unwrap();
        assert!((objective.value(&w) - expected).abs() < 1e-15);
        assert!((objective.error() - expected).abs() < 1e-15);
    }

    #[test]
    fn test_gradient_value_matches_value() {
        let mut network = Network::new(&NetworkConfig::xor().with_seed(8)).unwrap();
        let data = MemoryDataset::xor();
        let w: Vec<f64> = network.weights().iter().map(|x| x * 1.5).collect();
        let mut objective = NetworkObjective::new(&mut network, &data, Loss::LogCosh).unwrap();
        let mut grad = vec![0.0; w.len()];
        let e = objective.gradient(&w, &mut grad);
        assert_eq!(e, objective.value(&w));
        assert!(grad.iter().any(|g| *g != 0.0));
    }

    #[test]
    fn test_subset_fixed_within_epoch() {
        let mut network = Network::new(&NetworkConfig::feed_forward(
            &[2, 3, 1],
            crate::Activation::Tanh,
            crate::Activation::Linear,
        ).with_seed(2))
        .unwrap();
        let data = regression_data(40);
        let mut objective = NetworkObjective::new(&mut network, &data, Loss::Quadratic)
            .unwrap()
            .with_subsample(SubSample::fixed(0.25), StdRng::seed_from_u64(11))
            .unwrap();
        let first = objective.active().to_vec();
        assert_eq!(first.len(), 10);
        assert!(first.windows(2).all(|w| w[0] < w[1]));

        let w = objective.network().weights().to_vec();
        let a = objective.value(&w);
        let b = objective.value(&w);
        assert_eq!(a, b);
        assert_eq!(objective.active(), first.as_slice());

        objective.end_epoch(1);
        assert_eq!(objective.active().len(), 10);
    }

    #[test]
    fn test_subset_grows_with_decay() {
        let mut network = Network::new(&NetworkConfig::feed_forward(
            &[2, 2, 1],
            crate::Activation::Tanh,
            crate::Activation::Linear,
        ).with_seed(3))
        .unwrap();
        let data = regression_data(20);
        let schedule = SubSample {
            fraction: 0.1,
            decay: 0.0,
        };
        let mut objective = NetworkObjective::new(&mut network, &data, Loss::Quadratic)
            .unwrap()
            .with_subsample(schedule, StdRng::seed_from_u64(5))
            .unwrap();
        assert_eq!(objective.active().len(), 2);
        assert!(objective.end_epoch(1));
        assert_eq!(objective.active(), (0..20).collect::<Vec<_>>().as_slice());
        // the full batch redrawn is the same function
        assert!(!objective.end_epoch(2));
    }

    #[test]
    fn test_full_batch_never_changes() {
        let mut network = Network::new(&NetworkConfig::xor().with_seed(6)).unwrap();
        let data = MemoryDataset::xor();
        let mut objective = NetworkObjective::new(&mut network, &data, Loss::Quadratic).unwrap();
        for epoch in 1..5 {
            assert!(!objective.end_epoch(epoch));
        }
        assert_eq!(objective.active(), &[0, 1, 2, 3]);
    }
}

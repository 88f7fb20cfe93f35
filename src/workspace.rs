//! Preallocated signal buffers for the four propagation passes.
//!
//! A [`Workspace`] holds one slot per unit for every quantity the passes
//! produce (pre-activation, activation, their adjoints, and the R-values of
//! all four), plus the gradient and curvature accumulators over the weight
//! vector. Layers address their units through offsets, so each buffer is a
//! single flat `Vec<f64>` and the passes can borrow different buffers at
//! the same time.
//!
//! # Zero-Allocation Pattern
//!
//! Create the workspace once per network and reuse it:
//!
//! ```rust
//! use netfit::{Network, NetworkConfig};
//!
//! let network = Network::new(&NetworkConfig::xor().with_seed(1)).unwrap();
//! let mut workspace = network.create_workspace();
//!
//! for _ in 0..1000 {
//!     let out = network.forward(&[1.0, 0.0], &mut workspace);
//!     assert_eq!(out.len(), 1);
//! }
//! ```
//!
//! # Accumulation
//!
//! The gradient and curvature buffers are additive across patterns: the
//! backward passes add into them and never clear them. Call
//! [`Workspace::zero_gradient`] / [`Workspace::zero_curvature`] between
//! full evaluations.

use crate::network::Network;

/// Per-unit and per-weight buffers reused across passes.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    /// Pre-activations `z`.
    pub(crate) pre: Vec<f64>,
    /// Activations `a = φ(z)`.
    pub(crate) act: Vec<f64>,
    /// `∂E/∂z`
    pub(crate) adj_pre: Vec<f64>,
    /// `∂E/∂a`
    pub(crate) adj_act: Vec<f64>,
    /// `R{z}`
    pub(crate) r_pre: Vec<f64>,
    /// `R{a}`
    pub(crate) r_act: Vec<f64>,
    /// `R{∂E/∂z}`
    pub(crate) r_adj_pre: Vec<f64>,
    /// `R{∂E/∂a}`
    pub(crate) r_adj_act: Vec<f64>,

    /// Gradient accumulator over all weights.
    pub(crate) grad: Vec<f64>,
    /// Curvature-product accumulator over all weights.
    pub(crate) curvature: Vec<f64>,
}

impl Workspace {
    /// Allocates buffers sized for `network`.
    pub fn new(network: &Network) -> Self {
        let units = network.num_units();
        let weights = network.num_weights();
        Self {
            pre: vec![0.0; units],
            act: vec![0.0; units],
            adj_pre: vec![0.0; units],
            adj_act: vec![0.0; units],
            r_pre: vec![0.0; units],
            r_act: vec![0.0; units],
            r_adj_pre: vec![0.0; units],
            r_adj_act: vec![0.0; units],
            grad: vec![0.0; weights],
            curvature: vec![0.0; weights],
        }
    }

    /// True when the buffers match the network's unit and weight counts.
    pub fn fits(&self, network: &Network) -> bool {
        self.pre.len() == network.num_units() && self.grad.len() == network.num_weights()
    }

    /// Clears the gradient accumulator.
    #[inline]
    pub fn zero_gradient(&mut self) {
        self.grad.fill(0.0);
    }

    /// Clears the curvature accumulator.
    #[inline]
    pub fn zero_curvature(&mut self) {
        self.curvature.fill(0.0);
    }

    /// Accumulated gradient.
    #[inline]
    pub fn gradient(&self) -> &[f64] {
        &self.grad
    }

    /// Accumulated curvature product (`Hv` or `Gv`).
    #[inline]
    pub fn curvature_product(&self) -> &[f64] {
        &self.curvature
    }

    /// Activations of every unit after the last forward pass.
    #[inline]
    pub fn activations(&self) -> &[f64] {
        &self.act
    }

    /// R-values of every activation after the last R-forward pass.
    #[inline]
    pub fn r_activations(&self) -> &[f64] {
        &self.r_act
    }

    /// Memory held by the workspace, in bytes.
    pub fn memory_usage(&self) -> usize {
        let floats = self.pre.capacity()
            + self.act.capacity()
            + self.adj_pre.capacity()
            + self.adj_act.capacity()
            + self.r_pre.capacity()
            + self.r_act.capacity()
            + self.r_adj_pre.capacity()
            + self.r_adj_act.capacity()
            + self.grad.capacity()
            + self.curvature.capacity();
        floats * std::mem::size_of::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;

    #[test]
    fn test_sized_for_network() {
        let network = Network::new(&NetworkConfig::xor().with_seed(3)).unwrap();
        let ws = Workspace::new(&network);
        assert_eq!(ws.pre.len(), 4);
        assert_eq!(ws.grad.len(), 7);
        assert!(ws.fits(&network));
        assert!(ws.memory_usage() >= (8 * 4 + 2 * 7) * 8);
    }

    #[test]
    fn test_zeroing() {
        let network = Network::new(&NetworkConfig::xor().with_seed(3)).unwrap();
        let mut ws = network.create_workspace();
        ws.grad.fill(1.0);
        ws.curvature.fill(2.0);
        ws.zero_gradient();
        ws.zero_curvature();
        assert!(ws.gradient().iter().all(|&g| g == 0.0));
        assert!(ws.curvature_product().iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_does_not_fit_other_network() {
        let small = Network::new(&NetworkConfig::xor().with_seed(3)).unwrap();
        let big = Network::new(
            &NetworkConfig::feed_forward(
                &[3, 4, 2],
                crate::Activation::Tanh,
                crate::Activation::Linear,
            )
            .with_seed(3),
        )
        .unwrap();
        assert!(!small.create_workspace().fits(&big));
    }
}

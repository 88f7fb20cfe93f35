//! Layers: groups of units sharing one activation.
//!
//! A layer owns no weights. It knows its size, its activation, and where its
//! units sit in the workspace buffers, and it applies the activation's chain
//! rule in each of the four passes.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::activation::Activation;

/// One layer of a network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// Number of units.
    pub size: usize,
    /// Activation applied to every unit.
    pub activation: Activation,
    /// First unit index in the workspace buffers.
    pub(crate) offset: usize,
}

impl Layer {
    pub(crate) fn new(size: usize, activation: Activation, offset: usize) -> Self {
        Self {
            size,
            activation,
            offset,
        }
    }

    /// Unit indices of this layer in the workspace buffers.
    #[inline]
    pub fn units(&self) -> Range<usize> {
        self.offset..self.offset + self.size
    }

    /// `a = φ(z)`
    #[inline]
    pub(crate) fn activate(&self, pre: &[f64], act: &mut [f64]) {
        let f = self.activation;
        for (a, &z) in act.iter_mut().zip(pre) {
            *a = f.value(z);
        }
    }

    /// `Ra = φ'(z)·Rz`
    #[inline]
    pub(crate) fn tangent(&self, pre: &[f64], r_pre: &[f64], r_act: &mut [f64]) {
        let f = self.activation;
        for k in 0..self.size {
            r_act[k] = f.derivative(pre[k]) * r_pre[k];
        }
    }

    /// `δz = δa·φ'(z)`
    #[inline]
    pub(crate) fn adjoint(&self, pre: &[f64], adj_act: &[f64], adj_pre: &mut [f64]) {
        let f = self.activation;
        for k in 0..self.size {
            adj_pre[k] = adj_act[k] * f.derivative(pre[k]);
        }
    }

    /// `δz = δa·φ'(z)` and `Rδz = Rδa·φ'(z) + δa·φ''(z)·Rz` in one sweep.
    #[inline]
    pub(crate) fn r_adjoint(
        &self,
        pre: &[f64],
        r_pre: &[f64],
        adj_act: &[f64],
        r_adj_act: &[f64],
        adj_pre: &mut [f64],
        r_adj_pre: &mut [f64],
    ) {
        let f = self.activation;
        for k in 0..self.size {
            let (_, d1, d2) = f.evaluate(pre[k]);
            adj_pre[k] = adj_act[k] * d1;
            r_adj_pre[k] = r_adj_act[k] * d1 + adj_act[k] * d2 * r_pre[k];
        }
    }
}

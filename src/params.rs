//! Flat parameter storage.
//!
//! Every trainable weight of a network lives in one contiguous `Vec<f64>`.
//! Links own disjoint `Range`s into it (shared links reuse a range), which
//! is exactly the vector the optimizers move around.

use std::ops::Range;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Contiguous weight vector with range allocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamStore {
    values: Vec<f64>,
}

impl ParamStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Wraps an existing weight vector.
    pub fn from_vec(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Appends `count` zero weights and returns their range.
    pub fn allocate(&mut self, count: usize) -> Range<usize> {
        let start = self.values.len();
        self.values.resize(start + count, 0.0);
        start..start + count
    }

    /// Total number of weights.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when there are no weights.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All weights.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// All weights, mutable.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Weights of one range.
    #[inline]
    pub fn slice(&self, range: Range<usize>) -> &[f64] {
        &self.values[range]
    }

    /// Overwrites every weight. Lengths must match.
    #[inline]
    pub fn copy_from(&mut self, weights: &[f64]) {
        debug_assert_eq!(weights.len(), self.values.len());
        self.values.copy_from_slice(weights);
    }

    /// Draws every weight uniformly from `[-scale, scale]`.
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R, scale: f64) {
        if scale == 0.0 {
            self.values.fill(0.0);
            return;
        }
        for w in &mut self.values {
            *w = rng.gen_range(-scale..=scale);
        }
    }

    /// Consumes the store and returns the weight vector.
    pub fn into_vec(self) -> Vec<f64> {
        self.values
    }
}

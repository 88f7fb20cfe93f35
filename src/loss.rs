//! Per-output loss functions with first and second derivatives.
//!
//! This module provides [`Loss`], the closed set of separable losses the
//! objective adapter can minimise:
//!
//! - [`Loss::Quadratic`] - `½(y − t)²`
//! - [`Loss::LogCosh`] - `ln cosh(y − t)`, quadratic near zero and linear in the tails
//! - [`Loss::Huber`] - quadratic inside `delta`, linear outside
//! - [`Loss::CrossEntropy`] - binary cross-entropy for outputs in (0, 1)
//! - [`Loss::SymmetricCrossEntropy`] - cross-entropy for outputs in (−1, 1)
//!
//! A pattern's loss is the sum over its outputs. The first derivative seeds
//! the backward pass; the second derivative seeds the R-adjoint pass.
//!
//! # Example
//!
//! ```rust
//! use netfit::Loss;
//!
//! let outputs = vec![0.5, 1.0, 1.5];
//! let targets = vec![0.0, 1.0, 2.0];
//! let mut slope = vec![0.0; 3];
//! let mut curvature = vec![0.0; 3];
//!
//! let loss = Loss::Quadratic.accumulate(&outputs, &targets, &mut slope, &mut curvature);
//! assert!((loss - 0.25).abs() < 1e-12);
//! assert_eq!(slope, vec![0.5, 0.0, -0.5]);
//! assert_eq!(curvature, vec![1.0, 1.0, 1.0]);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, EPSILON};

/// Value and derivatives of a loss at one output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossTerms {
    /// `L(y, t)`
    pub value: f64,
    /// `∂L/∂y`
    pub slope: f64,
    /// `∂²L/∂y²`
    pub curvature: f64,
}

/// Separable loss over network outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Loss {
    /// Half squared error.
    #[default]
    Quadratic,
    /// Log of the hyperbolic cosine of the error.
    LogCosh,
    /// Huber loss with threshold `delta`.
    Huber {
        /// Switch point between the quadratic and linear regimes.
        delta: f64,
    },
    /// Binary cross-entropy; outputs are clamped to `[EPSILON, 1 − EPSILON]`
    /// and the loss is flat, with zero derivatives, outside that range.
    CrossEntropy,
    /// Cross-entropy on `(1 + y) / 2`; outputs are clamped inside (−1, 1).
    SymmetricCrossEntropy,
}

impl Loss {
    /// Canonical name, accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            Loss::Quadratic => "quadratic",
            Loss::LogCosh => "logcosh",
            Loss::Huber { .. } => "huber",
            Loss::CrossEntropy => "cross_entropy",
            Loss::SymmetricCrossEntropy => "symmetric_cross_entropy",
        }
    }

    /// Checks loss parameters.
    pub fn validate(self) -> Result<(), ConfigError> {
        match self {
            Loss::Huber { delta } if !(delta > 0.0 && delta.is_finite()) => {
                Err(ConfigError::InvalidValue {
                    field: "huber_delta",
                    reason: "must be finite and > 0",
                })
            }
            _ => Ok(()),
        }
    }

    /// Loss, slope and curvature at output `y` for target `t`.
    #[inline]
    pub fn evaluate(self, y: f64, t: f64) -> LossTerms {
        match self {
            Loss::Quadratic => {
                let d = y - t;
                LossTerms {
                    value: 0.5 * d * d,
                    slope: d,
                    curvature: 1.0,
                }
            }
            Loss::LogCosh => {
                let d = y - t;
                let a = d.abs();
                let th = d.tanh();
                LossTerms {
                    value: a + (-2.0 * a).exp().ln_1p() - std::f64::consts::LN_2,
                    slope: th,
                    curvature: 1.0 - th * th,
                }
            }
            Loss::Huber { delta } => {
                let d = y - t;
                if d.abs() <= delta {
                    LossTerms {
                        value: 0.5 * d * d,
                        slope: d,
                        curvature: 1.0,
                    }
                } else {
                    LossTerms {
                        value: delta * (d.abs() - 0.5 * delta),
                        slope: delta * d.signum(),
                        curvature: 0.0,
                    }
                }
            }
            Loss::CrossEntropy => binary_cross_entropy(y, t),
            Loss::SymmetricCrossEntropy => {
                let terms = binary_cross_entropy(0.5 * (1.0 + y), 0.5 * (1.0 + t));
                LossTerms {
                    value: terms.value,
                    slope: 0.5 * terms.slope,
                    curvature: 0.25 * terms.curvature,
                }
            }
        }
    }

    /// Sum of the loss over one pattern's outputs.
    #[inline]
    pub fn total(self, outputs: &[f64], targets: &[f64]) -> f64 {
        debug_assert_eq!(outputs.len(), targets.len());
        let mut sum = 0.0;
        for (&y, &t) in outputs.iter().zip(targets) {
            sum += self.evaluate(y, t).value;
        }
        sum
    }

    /// Pattern loss, writing per-output slope and curvature.
    ///
    /// Returns the same value as [`total`](Self::total), bit for bit.
    #[inline]
    pub fn accumulate(
        self,
        outputs: &[f64],
        targets: &[f64],
        slope: &mut [f64],
        curvature: &mut [f64],
    ) -> f64 {
        debug_assert_eq!(outputs.len(), targets.len());
        debug_assert_eq!(outputs.len(), slope.len());
        debug_assert_eq!(outputs.len(), curvature.len());
        let mut sum = 0.0;
        for k in 0..outputs.len() {
            let terms = self.evaluate(outputs[k], targets[k]);
            sum += terms.value;
            slope[k] = terms.slope;
            curvature[k] = terms.curvature;
        }
        sum
    }
}

#[inline]
fn binary_cross_entropy(y: f64, t: f64) -> LossTerms {
    let p = y.clamp(EPSILON, 1.0 - EPSILON);
    let mut value = 0.0;
    if t > 0.0 {
        value -= t * p.ln();
    }
    if t < 1.0 {
        value -= (1.0 - t) * (1.0 - p).ln();
    }
    if y < EPSILON || y > 1.0 - EPSILON {
        return LossTerms {
            value,
            slope: 0.0,
            curvature: 0.0,
        };
    }
    LossTerms {
        value,
        slope: (p - t) / (p * (1.0 - p)),
        curvature: t / (p * p) + (1.0 - t) / ((1.0 - p) * (1.0 - p)),
    }
}

impl fmt::Display for Loss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Loss::Huber { delta } => write!(f, "huber({})", delta),
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for Loss {
    type Err = ConfigError;

    /// Parses a loss name. `huber` gets `delta = 1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "quadratic" | "mse" | "sse" => Ok(Loss::Quadratic),
            "logcosh" | "log_cosh" | "robust" => Ok(Loss::LogCosh),
            "huber" => Ok(Loss::Huber { delta: 1.0 }),
            "cross_entropy" | "xent" | "ce" => Ok(Loss::CrossEntropy),
            "symmetric_cross_entropy" | "sxent" => Ok(Loss::SymmetricCrossEntropy),
            _ => Err(ConfigError::UnknownLoss(s.to_string())),
        }
    }
}

//! Unit activation functions.
//!
//! Every activation supplies its value and its first and second derivative
//! at the pre-activation `z`. The second derivative is what lets the
//! R-adjoint pass produce exact Hessian-vector products.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Activation applied elementwise to a layer's pre-activations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// `1 / (1 + e^-z)`
    Logistic,
    /// `tanh z`
    Tanh,
    /// Identity.
    Linear,
    /// `e^z`
    Exponential,
    /// `e^(-z²)`
    Gaussian,
    /// `sin z`
    Sine,
    /// `cos z`
    Cosine,
    /// `ln(1 + e^z)`
    Softplus,
}

#[inline]
fn logistic(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl Activation {
    /// All activations, in declaration order.
    pub const ALL: [Activation; 8] = [
        Activation::Logistic,
        Activation::Tanh,
        Activation::Linear,
        Activation::Exponential,
        Activation::Gaussian,
        Activation::Sine,
        Activation::Cosine,
        Activation::Softplus,
    ];

    /// Canonical name, accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            Activation::Logistic => "logistic",
            Activation::Tanh => "tanh",
            Activation::Linear => "linear",
            Activation::Exponential => "exponential",
            Activation::Gaussian => "gaussian",
            Activation::Sine => "sine",
            Activation::Cosine => "cosine",
            Activation::Softplus => "softplus",
        }
    }

    /// `φ(z)`
    #[inline]
    pub fn value(self, z: f64) -> f64 {
        self.evaluate(z).0
    }

    /// `φ'(z)`
    #[inline]
    pub fn derivative(self, z: f64) -> f64 {
        self.evaluate(z).1
    }

    /// `φ''(z)`
    #[inline]
    pub fn second_derivative(self, z: f64) -> f64 {
        self.evaluate(z).2
    }

    /// Returns `(φ(z), φ'(z), φ''(z))`.
    #[inline]
    pub fn evaluate(self, z: f64) -> (f64, f64, f64) {
        match self {
            Activation::Logistic => {
                let s = logistic(z);
                let d = s * (1.0 - s);
                (s, d, d * (1.0 - 2.0 * s))
            }
            Activation::Tanh => {
                let t = z.tanh();
                let d = 1.0 - t * t;
                (t, d, -2.0 * t * d)
            }
            Activation::Linear => (z, 1.0, 0.0),
            Activation::Exponential => {
                let e = z.exp();
                (e, e, e)
            }
            Activation::Gaussian => {
                let g = (-z * z).exp();
                (g, -2.0 * z * g, (4.0 * z * z - 2.0) * g)
            }
            Activation::Sine => {
                let (s, c) = z.sin_cos();
                (s, c, -s)
            }
            Activation::Cosine => {
                let (s, c) = z.sin_cos();
                (c, -s, -c)
            }
            Activation::Softplus => {
                let v = z.max(0.0) + (-z.abs()).exp().ln_1p();
                let s = logistic(z);
                (v, s, s * (1.0 - s))
            }
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Activation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "logistic" | "sigmoid" => Ok(Activation::Logistic),
            "tanh" => Ok(Activation::Tanh),
            "linear" | "identity" => Ok(Activation::Linear),
            "exponential" | "exp" => Ok(Activation::Exponential),
            "gaussian" | "gauss" => Ok(Activation::Gaussian),
            "sine" | "sin" => Ok(Activation::Sine),
            "cosine" | "cos" => Ok(Activation::Cosine),
            "softplus" => Ok(Activation::Softplus),
            _ => Err(ConfigError::UnknownActivation(s.to_string())),
        }
    }
}

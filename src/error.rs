//! Unified error types for netfit.
//!
//! This module provides [`NetfitError`], the single error type returned by
//! construction, shape-checked evaluation and model persistence. It uses the
//! `thiserror` crate for ergonomic error handling.
//!
//! Numeric trouble inside an optimizer (non-finite trial step, non-descent
//! direction, singular secant update) never shows up here: the optimizers
//! recover locally and report progress through
//! [`Report`](crate::optimizer::Report).
//!
//! # Example
//!
//! ```rust
//! use netfit::NetfitError;
//!
//! fn check_input(expected: usize, got: &[f64]) -> Result<(), NetfitError> {
//!     if got.len() != expected {
//!         return Err(NetfitError::shape_mismatch(&[expected], &[got.len()]));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_input(2, &[0.0, 1.0]).is_ok());
//! assert!(check_input(3, &[0.0]).is_err());
//! ```

use thiserror::Error;

use crate::config::ConfigError;

/// Unified error type for netfit operations.
#[derive(Error, Debug)]
pub enum NetfitError {
    /// Configuration error (unknown names, bad indices, bad numeric settings).
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A link violates the layered topology of a network.
    ///
    /// Raised when assembling a network from a saved model whose links do
    /// not respect the `source < target` ordering or whose weight ranges do
    /// not fit the parameter vector.
    #[error("Invalid topology at link {link}: {reason}")]
    Topology {
        /// Index of the offending link.
        link: usize,
        /// Human readable description.
        reason: String,
    },

    /// Shape mismatch between expected and actual vector lengths.
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected shape.
        expected: Vec<usize>,
        /// Actual shape received.
        got: Vec<usize>,
    },

    /// A dataset with no patterns was handed to an objective.
    #[error("Dataset is empty")]
    EmptyDataset,

    /// Serialized model does not start with the netfit magic bytes.
    #[error("Not a netfit model: bad magic bytes")]
    BadMagic,

    /// Incompatible model format version.
    #[error("Incompatible model version: expected {expected}, got {got}")]
    IncompatibleVersion {
        /// Version this build understands.
        expected: u32,
        /// Version found in the payload.
        got: u32,
    },

    /// Serialized model content is inconsistent.
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// I/O error during model save/load or config loading.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary (bincode) encoding or decoding failed.
    #[error("Binary encoding error: {0}")]
    Encode(#[from] bincode::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for netfit operations.
pub type NetfitResult<T> = Result<T, NetfitError>;

impl NetfitError {
    /// Creates a shape mismatch error.
    pub fn shape_mismatch(expected: &[usize], got: &[usize]) -> Self {
        NetfitError::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }

    /// Creates a topology error for the given link.
    pub fn topology<S: Into<String>>(link: usize, reason: S) -> Self {
        NetfitError::Topology {
            link,
            reason: reason.into(),
        }
    }

    /// Creates an invalid model error.
    pub fn invalid_model<S: Into<String>>(msg: S) -> Self {
        NetfitError::InvalidModel(msg.into())
    }

    /// Creates an incompatible version error.
    pub fn incompatible_version(expected: u32, got: u32) -> Self {
        NetfitError::IncompatibleVersion { expected, got }
    }
}

//! # netfit - Layered Computation Graphs and Second-Order Fitting
//!
//! Feed-forward graphs of typed links over one flat weight vector, with
//! exact gradients and exact Hessian-vector products, fitted by a family
//! of nonlinear optimizers.
//!
//! ## Architecture
//! - One contiguous `Vec<f64>` of weights; links own `Range`s into it
//! - Four propagation passes: forward, backward, R-forward, R-backward
//! - Preallocated [`Workspace`] so the passes never allocate
//! - Optimizers see only an [`Objective`](optimizer::Objective)
//!
//! ## Usage
//! ```rust
//! use netfit::{fit, MemoryDataset, Network, NetworkConfig, TrainConfig};
//!
//! let mut network = Network::new(&NetworkConfig::xor().with_seed(1)).unwrap();
//! let data = MemoryDataset::xor();
//! let config = TrainConfig {
//!     method: "bfgs".into(),
//!     line_search: "cubic".into(),
//!     max_epochs: 20,
//!     ..Default::default()
//! };
//!
//! let report = fit(&mut network, &data, &config, |_| Default::default()).unwrap();
//! println!("{} epochs, error {:.3e}", report.epochs, report.error);
//! ```

pub mod activation;
pub mod config;
pub mod dataset;
pub mod error;
pub mod kernels;
pub mod layer;
pub mod link;
pub mod loss;
pub mod model;
pub mod network;
pub mod objective;
pub mod optimizer;
pub mod params;
pub mod propagate;
pub mod workspace;

// Re-exports
pub use activation::Activation;
pub use config::{
    ConfigError, LayerConfig, LinkConfig, NetworkConfig, TrainConfig, DEFAULT_ERROR_DECAY,
    DEFAULT_INIT_SCALE, DEFAULT_MAX_EPOCHS, EPSILON,
};
pub use dataset::{Dataset, MemoryDataset, Subset};
pub use error::{NetfitError, NetfitResult};
pub use layer::Layer;
pub use link::{Link, LinkFlags, LinkKind};
pub use loss::{Loss, LossTerms};
pub use model::{SavedLayer, SavedNetwork, MODEL_FORMAT_VERSION};
pub use network::Network;
pub use objective::{NetworkObjective, SubSample};
pub use optimizer::{fit, Control, Curvature, MethodKind, Progress, Report, StopCriteria, StopReason, Trainer};
pub use params::ParamStore;
pub use workspace::Workspace;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Magic bytes for serialized models
pub const MAGIC_MODEL: &[u8; 12] = b"NETFIT_MDL_1";

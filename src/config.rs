//! Network and training configuration.
//!
//! This module provides [`NetworkConfig`] for describing a layered graph and
//! [`TrainConfig`] for choosing and tuning an optimizer. Both are plain serde
//! structs: they can be built in code with the builder helpers or loaded from
//! JSON, and both must pass `validate()` before use.
//!
//! # Example
//!
//! ```rust
//! use netfit::{Activation, LinkKind, NetworkConfig};
//!
//! // Preset: 2-1-1 XOR network with an input-to-output shortcut
//! let config = NetworkConfig::xor();
//! assert_eq!(config.layer_sizes(), vec![2, 1, 1]);
//!
//! // Or build by hand
//! let config = NetworkConfig::new()
//!     .with_layer(3, Activation::Linear)
//!     .with_layer(4, Activation::Tanh)
//!     .with_layer(1, Activation::Linear)
//!     .with_link(LinkKind::Linear, &[0], 1)
//!     .with_bias(1)
//!     .with_link(LinkKind::Linear, &[1], 2)
//!     .with_bias(2);
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Link arity
//!
//! | Kind | Sources | Weights |
//! |------|---------|---------|
//! | `bias` | 0 | one per target unit |
//! | `linear`, `quadratic`, `exponential`, `distance` | 1 | target × source |
//! | `product` | 2 | target × source a × source b |

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::activation::Activation;
use crate::error::NetfitResult;
use crate::link::LinkKind;
use crate::loss::Loss;
use crate::objective::SubSample;
use crate::optimizer::line_search::LineSearchKind;
use crate::optimizer::{Curvature, MethodKind, StopCriteria};

/// Clamp used wherever a probability or a denominator must stay away from zero.
pub const EPSILON: f64 = 1e-12;

/// Default half-width of the uniform weight initialisation.
pub const DEFAULT_INIT_SCALE: f64 = 0.5;

/// Default upper bound on training epochs.
pub const DEFAULT_MAX_EPOCHS: usize = 100;

/// Default factor of the exponentially decayed error (`d ← d·k + e·(1−k)`).
pub const DEFAULT_ERROR_DECAY: f64 = 0.9;

fn default_activation() -> String {
    Activation::Linear.name().to_string()
}

fn default_init_scale() -> f64 {
    DEFAULT_INIT_SCALE
}

/// One layer of a [`NetworkConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    /// Number of units.
    pub size: usize,

    /// Activation name (see [`Activation`]). Ignored for the input layer.
    #[serde(default = "default_activation")]
    pub activation: String,
}

/// One link of a [`NetworkConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Link kind name (see [`LinkKind`]).
    pub kind: String,

    /// Source layer indices, all strictly below `target`.
    #[serde(default)]
    pub sources: Vec<usize>,

    /// Target layer index.
    pub target: usize,

    /// Keep the weights fixed during training.
    #[serde(default)]
    pub frozen: bool,

    /// Leave this link out of curvature products.
    #[serde(default)]
    pub skip_curvature: bool,

    /// Reuse the weight range of an earlier link (same kind and weight count).
    #[serde(default)]
    pub shares: Option<usize>,
}

/// Description of a layered computation graph.
///
/// Layer 0 is the input layer, the last layer is the output layer. Links are
/// evaluated in list order within each target layer, so the list order fixes
/// the summation order and with it the exact floating-point results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Ordered layers, input first.
    pub layers: Vec<LayerConfig>,

    /// Ordered links.
    #[serde(default)]
    pub links: Vec<LinkConfig>,

    /// Weights are drawn uniformly from `[-init_scale, init_scale]`.
    #[serde(default = "default_init_scale")]
    pub init_scale: f64,

    /// Optional seed for deterministic initialization (None => random).
    #[serde(default)]
    pub init_seed: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkConfig {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            links: Vec::new(),
            init_scale: DEFAULT_INIT_SCALE,
            init_seed: None,
        }
    }

    /// Creates the classic 2-1-1 XOR network.
    ///
    /// One logistic hidden unit, one logistic output unit, and a shortcut
    /// from the inputs straight to the output. Seven weights in total.
    ///
    /// # Example
    ///
    /// ```rust
    /// use netfit::{Network, NetworkConfig};
    ///
    /// let network = Network::new(&NetworkConfig::xor().with_seed(7)).unwrap();
    /// assert_eq!(network.num_weights(), 7);
    /// ```
    pub fn xor() -> Self {
        Self::new()
            .with_layer(2, Activation::Linear)
            .with_layer(1, Activation::Logistic)
            .with_layer(1, Activation::Logistic)
            .with_link(LinkKind::Linear, &[0], 1)
            .with_bias(1)
            .with_link(LinkKind::Linear, &[0], 2)
            .with_link(LinkKind::Linear, &[1], 2)
            .with_bias(2)
    }

    /// Creates a plain multilayer perceptron.
    ///
    /// Consecutive layers are joined by `linear` links and every non-input
    /// layer gets a `bias` link. Hidden layers use `hidden`, the last layer
    /// uses `output`.
    pub fn feed_forward(sizes: &[usize], hidden: Activation, output: Activation) -> Self {
        let mut config = Self::new();
        let last = sizes.len().saturating_sub(1);
        for (i, &size) in sizes.iter().enumerate() {
            let activation = match i {
                0 => Activation::Linear,
                i if i == last => output,
                _ => hidden,
            };
            config = config.with_layer(size, activation);
        }
        for target in 1..sizes.len() {
            config = config
                .with_link(LinkKind::Linear, &[target - 1], target)
                .with_bias(target);
        }
        config
    }

    /// Appends a layer.
    pub fn with_layer(mut self, size: usize, activation: Activation) -> Self {
        self.layers.push(LayerConfig {
            size,
            activation: activation.name().to_string(),
        });
        self
    }

    /// Appends a link reading `sources` and writing `target`.
    pub fn with_link(mut self, kind: LinkKind, sources: &[usize], target: usize) -> Self {
        self.links.push(LinkConfig {
            kind: kind.name().to_string(),
            sources: sources.to_vec(),
            target,
            frozen: false,
            skip_curvature: false,
            shares: None,
        });
        self
    }

    /// Appends a bias link on `target`.
    pub fn with_bias(self, target: usize) -> Self {
        self.with_link(LinkKind::Bias, &[], target)
    }

    /// Marks the most recently added link as frozen.
    pub fn frozen(mut self) -> Self {
        if let Some(link) = self.links.last_mut() {
            link.frozen = true;
        }
        self
    }

    /// Sets the initialization seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.init_seed = Some(seed);
        self
    }

    /// Sets the initialization scale.
    pub fn with_init_scale(mut self, scale: f64) -> Self {
        self.init_scale = scale;
        self
    }

    /// Returns the layer sizes, input first.
    pub fn layer_sizes(&self) -> Vec<usize> {
        self.layers.iter().map(|l| l.size).collect()
    }

    /// Parses a configuration from a JSON string and validates it.
    pub fn from_json_str(json: &str) -> NetfitResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a configuration from a JSON file and validates it.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> NetfitResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Number of weights each link needs, in link order.
    ///
    /// Counts ignore `shares`; missing layers count as size 0.
    pub(crate) fn link_weight_counts(&self) -> Result<Vec<usize>, ConfigError> {
        self.links
            .iter()
            .map(|link| {
                let kind: LinkKind = link.kind.parse()?;
                let target = self.layers.get(link.target).map_or(0, |l| l.size);
                let sources: Vec<usize> = link
                    .sources
                    .iter()
                    .map(|&s| self.layers.get(s).map_or(0, |l| l.size))
                    .collect();
                Ok(kind.weight_count(target, &sources))
            })
            .collect()
    }

    /// Validates the configuration and returns any errors.
    ///
    /// Should be called before creating a [`Network`](crate::Network);
    /// [`Network::new`](crate::Network::new) calls it itself.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - There are fewer than two layers, or a layer has zero units
    /// - An activation or link kind name is unknown
    /// - A link targets the input layer or a layer that does not exist
    /// - A link reads a layer that is not strictly before its target
    /// - A link has the wrong number of sources for its kind
    /// - A shared link points forward or at an incompatible link
    /// - `init_scale` is negative or not finite
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.layers.len() < 2 {
            return Err(ConfigError::TooFewLayers(self.layers.len()));
        }
        for (index, layer) in self.layers.iter().enumerate() {
            if layer.size == 0 {
                return Err(ConfigError::EmptyLayer(index));
            }
            layer.activation.parse::<Activation>()?;
        }

        let counts = self.link_weight_counts()?;
        for (index, link) in self.links.iter().enumerate() {
            let kind: LinkKind = link.kind.parse()?;
            if link.target >= self.layers.len() {
                return Err(ConfigError::LinkTarget {
                    link: index,
                    target: link.target,
                    layers: self.layers.len(),
                });
            }
            if link.target == 0 {
                return Err(ConfigError::InputTarget(index));
            }
            if link.sources.len() != kind.arity() {
                return Err(ConfigError::LinkArity {
                    link: index,
                    kind: kind.name(),
                    expected: kind.arity(),
                    got: link.sources.len(),
                });
            }
            if let Some(&from) = link.sources.iter().find(|&&s| s >= link.target) {
                return Err(ConfigError::LinkOrder {
                    link: index,
                    from,
                    target: link.target,
                });
            }
            if let Some(shared) = link.shares {
                if shared >= index {
                    return Err(ConfigError::SharedWeights {
                        link: index,
                        shares: shared,
                        reason: "must name an earlier link",
                    });
                }
                if self.links[shared].kind.parse::<LinkKind>()? != kind {
                    return Err(ConfigError::SharedWeights {
                        link: index,
                        shares: shared,
                        reason: "link kinds differ",
                    });
                }
                if counts[shared] != counts[index] {
                    return Err(ConfigError::SharedWeights {
                        link: index,
                        shares: shared,
                        reason: "weight counts differ",
                    });
                }
            }
        }

        if !self.init_scale.is_finite() || self.init_scale < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "init_scale",
                reason: "must be finite and >= 0",
            });
        }
        Ok(())
    }
}

/// Optimizer settings.
///
/// Method, line search, loss and curvature are given by name so the struct
/// reads naturally from JSON; [`validate`](Self::validate) parses every name.
/// Fields that a chosen method does not use are ignored.
///
/// # Example
///
/// ```rust
/// use netfit::TrainConfig;
///
/// let config = TrainConfig {
///     method: "bfgs".into(),
///     line_search: "cubic".into(),
///     max_epochs: 200,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// `gd`, `cgfr`, `cgpr`, `dfp`, `bfgs` or `lm`.
    pub method: String,
    /// `golden`, `cubic`, `hybrid` or `stc`.
    pub line_search: String,
    /// `quadratic`, `logcosh`, `huber`, `cross_entropy` or `symmetric_cross_entropy`.
    pub loss: String,
    /// Threshold of the Huber loss.
    pub huber_delta: f64,

    /// Hard upper bound on epochs.
    pub max_epochs: usize,
    /// Tolerance checks start after this many epochs.
    pub min_epochs: usize,
    /// Stop once the error falls below this value.
    pub error_tolerance: f64,
    /// Stop once the per-epoch error change falls below this value (0 disables).
    pub delta_tolerance: f64,
    /// Decay factor of the smoothed error.
    pub error_decay: f64,

    /// Gradient descent learning rate.
    pub rate: f64,
    /// Gradient descent momentum.
    pub momentum: f64,
    /// Per-epoch multiplicative decay of the rate.
    pub rate_decay: f64,

    /// Search-then-converge initial rate.
    pub eta0: f64,
    /// Search-then-converge time constant (epochs).
    pub tau: f64,

    /// Conjugate gradient restart period (None => parameter count).
    pub restart_every: Option<usize>,

    /// Initial Levenberg–Marquardt damping.
    pub lambda: f64,
    /// Damping multiplier after a rejected step.
    pub lambda_up: f64,
    /// Damping multiplier after an accepted step.
    pub lambda_down: f64,
    /// Inner conjugate gradient iterations (None => parameter count).
    pub cg_iterations: Option<usize>,
    /// `gauss_newton` or `hessian`.
    pub curvature: String,

    /// Optional mini-batch schedule.
    pub subsample: Option<SubSample>,
    /// Seed of the sub-sampling generator.
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            method: MethodKind::ConjugatePolakRibiere.name().to_string(),
            line_search: LineSearchKind::Golden.name().to_string(),
            loss: "quadratic".to_string(),
            huber_delta: 1.0,
            max_epochs: DEFAULT_MAX_EPOCHS,
            min_epochs: 0,
            error_tolerance: 1e-6,
            delta_tolerance: 0.0,
            error_decay: DEFAULT_ERROR_DECAY,
            rate: 0.1,
            momentum: 0.0,
            rate_decay: 1.0,
            eta0: 0.1,
            tau: 100.0,
            restart_every: None,
            lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.1,
            cg_iterations: None,
            curvature: Curvature::GaussNewton.name().to_string(),
            subsample: None,
            seed: 0,
        }
    }
}

impl TrainConfig {
    /// Parses a training configuration from JSON and validates it.
    pub fn from_json_str(json: &str) -> NetfitResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Parsed optimizer method.
    pub fn method_kind(&self) -> Result<MethodKind, ConfigError> {
        self.method.parse()
    }

    /// Parsed line search.
    pub fn line_search_kind(&self) -> Result<LineSearchKind, ConfigError> {
        self.line_search.parse()
    }

    /// Parsed curvature product used by Levenberg–Marquardt.
    pub fn curvature_kind(&self) -> Result<Curvature, ConfigError> {
        self.curvature.parse()
    }

    /// Parsed loss, with `huber_delta` applied.
    pub fn loss_fn(&self) -> Result<Loss, ConfigError> {
        match self.loss.parse::<Loss>()? {
            Loss::Huber { .. } => Ok(Loss::Huber {
                delta: self.huber_delta,
            }),
            loss => Ok(loss),
        }
    }

    /// Stopping criteria for the [`Trainer`](crate::optimizer::Trainer).
    pub fn stop_criteria(&self) -> StopCriteria {
        StopCriteria {
            max_epochs: self.max_epochs,
            min_epochs: self.min_epochs,
            error_tolerance: self.error_tolerance,
            delta_tolerance: self.delta_tolerance,
        }
    }

    /// Validates every name and numeric setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.method_kind()?;
        self.line_search_kind()?;
        self.curvature_kind()?;
        self.loss_fn()?.validate()?;

        if self.max_epochs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_epochs",
                reason: "must be > 0",
            });
        }
        if self.min_epochs > self.max_epochs {
            return Err(ConfigError::InvalidValue {
                field: "min_epochs",
                reason: "must not exceed max_epochs",
            });
        }
        check_range("error_tolerance", self.error_tolerance, 0.0, f64::MAX)?;
        check_range("delta_tolerance", self.delta_tolerance, 0.0, f64::MAX)?;
        check_range("error_decay", self.error_decay, 0.0, 1.0)?;
        check_positive("rate", self.rate)?;
        check_range("momentum", self.momentum, 0.0, 1.0)?;
        check_positive("rate_decay", self.rate_decay)?;
        check_range("rate_decay", self.rate_decay, 0.0, 1.0)?;
        check_positive("eta0", self.eta0)?;
        check_positive("tau", self.tau)?;
        check_range("lambda", self.lambda, 0.0, f64::MAX)?;
        if !(self.lambda_up > 1.0 && self.lambda_up.is_finite()) {
            return Err(ConfigError::InvalidValue {
                field: "lambda_up",
                reason: "must be finite and > 1",
            });
        }
        if !(self.lambda_down > 0.0 && self.lambda_down < 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "lambda_down",
                reason: "must be in (0, 1)",
            });
        }
        if self.restart_every == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "restart_every",
                reason: "must be > 0",
            });
        }
        if self.cg_iterations == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "cg_iterations",
                reason: "must be > 0",
            });
        }
        if let Some(sub) = &self.subsample {
            sub.validate()?;
        }
        Ok(())
    }
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field,
            reason: "must be finite and > 0",
        })
    }
}

fn check_range(field: &'static str, value: f64, lo: f64, hi: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= lo && value <= hi {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field,
            reason: "out of range",
        })
    }
}

/// Errors returned by the `validate` methods and by name parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A network needs at least an input and an output layer.
    #[error("Network needs at least 2 layers, got {0}")]
    TooFewLayers(usize),

    /// A layer has zero units.
    #[error("Layer {0} has no units")]
    EmptyLayer(usize),

    /// Unknown activation name.
    #[error("Unknown activation: {0:?}")]
    UnknownActivation(String),

    /// Unknown link kind name.
    #[error("Unknown link kind: {0:?}")]
    UnknownLinkKind(String),

    /// Unknown loss name.
    #[error("Unknown loss: {0:?}")]
    UnknownLoss(String),

    /// Unknown optimizer method name.
    #[error("Unknown optimizer method: {0:?}")]
    UnknownMethod(String),

    /// Unknown line search name.
    #[error("Unknown line search: {0:?}")]
    UnknownLineSearch(String),

    /// Unknown curvature product name.
    #[error("Unknown curvature product: {0:?}")]
    UnknownCurvature(String),

    /// Link target index is out of range.
    #[error("Link {link} targets layer {target} but the network has {layers} layers")]
    LinkTarget {
        /// Link index.
        link: usize,
        /// Requested target.
        target: usize,
        /// Number of layers.
        layers: usize,
    },

    /// The input layer cannot be the target of a link.
    #[error("Link {0} targets the input layer")]
    InputTarget(usize),

    /// A link reads a layer that is not strictly before its target.
    #[error("Link {link} reads layer {from} which is not before its target {target}")]
    LinkOrder {
        /// Link index.
        link: usize,
        /// Offending source layer.
        from: usize,
        /// Target layer.
        target: usize,
    },

    /// Wrong number of sources for the link kind.
    #[error("Link {link} of kind {kind} needs {expected} sources, got {got}")]
    LinkArity {
        /// Link index.
        link: usize,
        /// Kind name.
        kind: &'static str,
        /// Required source count.
        expected: usize,
        /// Provided source count.
        got: usize,
    },

    /// Invalid weight sharing.
    #[error("Link {link} cannot share weights with link {shares}: {reason}")]
    SharedWeights {
        /// Link index.
        link: usize,
        /// Link whose weights would be reused.
        shares: usize,
        /// Why the pairing is rejected.
        reason: &'static str,
    },

    /// A numeric setting is out of range.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Constraint that failed.
        reason: &'static str,
    },
}

//! The computation graph: layers, links and the flat weight vector.

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::activation::Activation;
use crate::config::NetworkConfig;
use crate::error::{NetfitError, NetfitResult};
use crate::layer::Layer;
use crate::link::{Link, LinkFlags, LinkKind};
use crate::params::ParamStore;
use crate::workspace::Workspace;

/// Feed-forward computation graph.
///
/// Layers are ordered; every link reads layers strictly before its target,
/// so a single sweep in layer order evaluates the whole graph. The weights
/// of all links form one contiguous vector (see [`Network::weights`]).
///
/// # Example
///
/// ```rust
/// use netfit::{Network, NetworkConfig};
///
/// let network = Network::new(&NetworkConfig::xor().with_seed(42)).unwrap();
/// let mut workspace = network.create_workspace();
///
/// let out = network.forward(&[1.0, 0.0], &mut workspace);
/// assert!(out[0] > 0.0 && out[0] < 1.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    layers: Vec<Layer>,
    links: Vec<Link>,
    /// Link indices per target layer, in link order.
    incoming: Vec<Vec<usize>>,
    params: ParamStore,
    units: usize,
}

impl Network {
    /// Builds a network from a validated configuration.
    ///
    /// Weights are drawn uniformly from `[-init_scale, init_scale]`, using
    /// `init_seed` when given and OS entropy otherwise.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`](crate::ConfigError) from
    /// [`NetworkConfig::validate`]; no network value exists on failure.
    pub fn new(config: &NetworkConfig) -> NetfitResult<Self> {
        match config.init_seed {
            Some(seed) => Self::with_rng(config, &mut StdRng::seed_from_u64(seed)),
            None => Self::with_rng(config, &mut StdRng::from_entropy()),
        }
    }

    /// Builds a network, drawing initial weights from `rng`.
    pub fn with_rng<R: Rng + ?Sized>(config: &NetworkConfig, rng: &mut R) -> NetfitResult<Self> {
        config.validate()?;

        let mut layers = Vec::with_capacity(config.layers.len());
        for layer in &config.layers {
            layers.push((layer.size, layer.activation.parse::<Activation>()?));
        }

        let counts = config.link_weight_counts()?;
        let mut params = ParamStore::new();
        let mut links: Vec<Link> = Vec::with_capacity(config.links.len());
        for (index, link) in config.links.iter().enumerate() {
            let weights = match link.shares {
                Some(shared) => links[shared].weights.clone(),
                None => params.allocate(counts[index]),
            };
            links.push(Link {
                kind: link.kind.parse::<LinkKind>()?,
                sources: link.sources.clone(),
                target: link.target,
                weights,
                flags: LinkFlags {
                    frozen: link.frozen,
                    skip_curvature: link.skip_curvature,
                },
            });
        }

        let mut network = Self::assemble(layers, links, params)?;
        network.randomize(rng, config.init_scale);
        Ok(network)
    }

    /// Assembles a network from explicit parts, checking the topology.
    ///
    /// This is the path taken by model loading, where nothing has been
    /// validated yet.
    pub(crate) fn assemble(
        layers: Vec<(usize, Activation)>,
        links: Vec<Link>,
        params: ParamStore,
    ) -> NetfitResult<Self> {
        if layers.len() < 2 {
            return Err(NetfitError::invalid_model(format!(
                "network needs at least 2 layers, got {}",
                layers.len()
            )));
        }

        let mut offset = 0;
        let mut built = Vec::with_capacity(layers.len());
        for (index, (size, activation)) in layers.into_iter().enumerate() {
            if size == 0 {
                return Err(NetfitError::invalid_model(format!("layer {} has no units", index)));
            }
            built.push(Layer::new(size, activation, offset));
            offset += size;
        }

        let mut incoming = vec![Vec::new(); built.len()];
        for (index, link) in links.iter().enumerate() {
            if link.target == 0 || link.target >= built.len() {
                return Err(NetfitError::topology(
                    index,
                    format!("target {} is not a non-input layer", link.target),
                ));
            }
            if link.sources.len() != link.kind.arity() {
                return Err(NetfitError::topology(
                    index,
                    format!(
                        "{} link needs {} sources, got {}",
                        link.kind,
                        link.kind.arity(),
                        link.sources.len()
                    ),
                ));
            }
            if let Some(&source) = link.sources.iter().find(|&&s| s >= link.target) {
                return Err(NetfitError::topology(
                    index,
                    format!("source {} is not before target {}", source, link.target),
                ));
            }
            let sizes: Vec<usize> = link.sources.iter().map(|&s| built[s].size).collect();
            let expected = link.kind.weight_count(built[link.target].size, &sizes);
            if link.weights.len() != expected || link.weights.start > link.weights.end {
                return Err(NetfitError::topology(
                    index,
                    format!("expected {} weights, range holds {}", expected, link.weights.len()),
                ));
            }
            if link.weights.end > params.len() {
                return Err(NetfitError::topology(
                    index,
                    format!(
                        "weight range {:?} exceeds parameter vector of {}",
                        link.weights,
                        params.len()
                    ),
                ));
            }
            for (other, earlier) in links[..index].iter().enumerate() {
                let overlaps = link.weights.start < earlier.weights.end
                    && earlier.weights.start < link.weights.end;
                if overlaps && link.weights != earlier.weights {
                    return Err(NetfitError::topology(
                        index,
                        format!("weight range partially overlaps link {}", other),
                    ));
                }
            }
            incoming[link.target].push(index);
        }

        Ok(Self {
            layers: built,
            links,
            incoming,
            params,
            units: offset,
        })
    }

    /// Redraws every weight uniformly from `[-scale, scale]`.
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R, scale: f64) {
        self.params.randomize(rng, scale);
    }

    /// Creates a workspace sized for this network.
    pub fn create_workspace(&self) -> Workspace {
        Workspace::new(self)
    }

    /// Layers, input first.
    #[inline]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Links, in evaluation order.
    #[inline]
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Number of layers including the input layer.
    #[inline]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Total number of units over all layers.
    #[inline]
    pub fn num_units(&self) -> usize {
        self.units
    }

    /// Length of the weight vector.
    #[inline]
    pub fn num_weights(&self) -> usize {
        self.params.len()
    }

    /// Input layer size.
    #[inline]
    pub fn input_size(&self) -> usize {
        self.layers[0].size
    }

    /// Output layer size.
    #[inline]
    pub fn output_size(&self) -> usize {
        self.output_layer().size
    }

    #[inline]
    pub(crate) fn output_layer(&self) -> &Layer {
        &self.layers[self.layers.len() - 1]
    }

    #[inline]
    pub(crate) fn incoming(&self, layer: usize) -> &[usize] {
        &self.incoming[layer]
    }

    /// Layer sizes, input first.
    pub fn layer_sizes(&self) -> Vec<usize> {
        self.layers.iter().map(|l| l.size).collect()
    }

    /// The flat weight vector.
    #[inline]
    pub fn weights(&self) -> &[f64] {
        self.params.as_slice()
    }

    /// The flat weight vector, mutable.
    #[inline]
    pub fn weights_mut(&mut self) -> &mut [f64] {
        self.params.as_mut_slice()
    }

    /// Weights of one link.
    pub fn link_weights(&self, link: usize) -> &[f64] {
        self.params.slice(self.links[link].weights.clone())
    }

    /// Replaces the weight vector.
    pub fn set_weights(&mut self, weights: &[f64]) -> NetfitResult<()> {
        if weights.len() != self.num_weights() {
            return Err(NetfitError::shape_mismatch(&[self.num_weights()], &[weights.len()]));
        }
        self.params.copy_from(weights);
        Ok(())
    }

    /// Copies `weights` into the store without a shape check.
    #[inline]
    pub(crate) fn load_weights(&mut self, weights: &[f64]) {
        self.params.copy_from(weights);
    }

    /// Mask over the weight vector: `true` where some trainable link owns the weight.
    pub fn trainable_mask(&self) -> Vec<bool> {
        let mut mask = vec![false; self.num_weights()];
        for link in self.links.iter().filter(|l| l.is_trainable()) {
            mask[link.weights.clone()].fill(true);
        }
        mask
    }

    /// Shape-checked forward pass returning a fresh output vector.
    pub fn evaluate(&self, input: &[f64]) -> NetfitResult<Vec<f64>> {
        if input.len() != self.input_size() {
            return Err(NetfitError::shape_mismatch(&[self.input_size()], &[input.len()]));
        }
        let mut workspace = self.create_workspace();
        Ok(self.forward(input, &mut workspace).to_vec())
    }

    pub(crate) fn params(&self) -> &ParamStore {
        &self.params
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Network {:?}", self.layer_sizes())?;
        write!(f, " ({} links, {} weights)", self.links.len(), self.num_weights())
    }
}

//! Model persistence.
//!
//! A [`SavedNetwork`] is the complete description of a trained network:
//! layer sizes and activations, every link with its kind, sources, target,
//! flags and weight range, and the flat weight vector. Loading goes through
//! the same topology checks as construction, so a corrupt file is rejected
//! before any network exists.
//!
//! Two encodings are provided:
//!
//! - binary: [`MAGIC_MODEL`](crate::MAGIC_MODEL) followed by a bincode payload
//! - JSON: serde_json with round-trip float printing
//!
//! Both restore bit-identical weights, hence bit-identical forward outputs.
//!
//! # Example
//!
//! ```rust
//! use netfit::{Network, NetworkConfig};
//!
//! let network = Network::new(&NetworkConfig::xor().with_seed(7)).unwrap();
//! let bytes = network.to_bytes().unwrap();
//! let restored = Network::from_bytes(&bytes).unwrap();
//!
//! let x = [1.0, 0.0];
//! assert_eq!(network.evaluate(&x).unwrap(), restored.evaluate(&x).unwrap());
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::activation::Activation;
use crate::error::{NetfitError, NetfitResult};
use crate::link::Link;
use crate::network::Network;
use crate::params::ParamStore;
use crate::MAGIC_MODEL;

/// Version written into every saved model.
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// One saved layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SavedLayer {
    /// Unit count.
    pub size: usize,
    /// Activation of every unit.
    pub activation: Activation,
}

/// Serializable snapshot of a network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedNetwork {
    /// Format version, [`MODEL_FORMAT_VERSION`] when written by this build.
    pub format_version: u32,
    /// Layers, input first.
    pub layers: Vec<SavedLayer>,
    /// Links in evaluation order.
    pub links: Vec<Link>,
    /// Flat weight vector.
    pub weights: Vec<f64>,
}

impl SavedNetwork {
    /// Rebuilds the network, checking version and topology.
    pub fn into_network(self) -> NetfitResult<Network> {
        if self.format_version != MODEL_FORMAT_VERSION {
            return Err(NetfitError::incompatible_version(
                MODEL_FORMAT_VERSION,
                self.format_version,
            ));
        }
        if let Some(bad) = self.weights.iter().position(|w| !w.is_finite()) {
            return Err(NetfitError::invalid_model(format!(
                "weight {} is not finite",
                bad
            )));
        }
        let layers = self
            .layers
            .iter()
            .map(|l| (l.size, l.activation))
            .collect();
        Network::assemble(layers, self.links, ParamStore::from_vec(self.weights))
    }
}

impl Network {
    /// Snapshot of the topology and weights.
    pub fn to_saved(&self) -> SavedNetwork {
        SavedNetwork {
            format_version: MODEL_FORMAT_VERSION,
            layers: self
                .layers()
                .iter()
                .map(|l| SavedLayer {
                    size: l.size,
                    activation: l.activation,
                })
                .collect(),
            links: self.links().to_vec(),
            weights: self.weights().to_vec(),
        }
    }

    /// Builds a network from a snapshot.
    pub fn from_saved(saved: SavedNetwork) -> NetfitResult<Self> {
        saved.into_network()
    }

    /// Replaces this network with a snapshot.
    ///
    /// The snapshot is fully validated first; on error `self` is unchanged.
    pub fn restore(&mut self, saved: &SavedNetwork) -> NetfitResult<()> {
        *self = saved.clone().into_network()?;
        Ok(())
    }

    /// Binary encoding: magic bytes, then bincode.
    pub fn to_bytes(&self) -> NetfitResult<Vec<u8>> {
        let payload = bincode::serialize(&self.to_saved())?;
        let mut bytes = Vec::with_capacity(MAGIC_MODEL.len() + payload.len());
        bytes.extend_from_slice(MAGIC_MODEL);
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Decodes [`to_bytes`](Self::to_bytes) output.
    pub fn from_bytes(bytes: &[u8]) -> NetfitResult<Self> {
        let payload = bytes
            .strip_prefix(MAGIC_MODEL.as_slice())
            .ok_or(NetfitError::BadMagic)?;
        let saved: SavedNetwork = bincode::deserialize(payload)?;
        saved.into_network()
    }

    /// JSON encoding.
    pub fn to_json(&self) -> NetfitResult<String> {
        Ok(serde_json::to_string_pretty(&self.to_saved())?)
    }

    /// Decodes [`to_json`](Self::to_json) output.
    pub fn from_json(json: &str) -> NetfitResult<Self> {
        let saved: SavedNetwork = serde_json::from_str(json)?;
        saved.into_network()
    }

    /// Writes the binary encoding to `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> NetfitResult<()> {
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    /// Writes the JSON encoding to `path`.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> NetfitResult<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Reads a model written by [`save`](Self::save) or
    /// [`save_json`](Self::save_json); the encoding is detected from the
    /// leading bytes.
    pub fn load<P: AsRef<Path>>(path: P) -> NetfitResult<Self> {
        let bytes = fs::read(path)?;
        if bytes.starts_with(MAGIC_MODEL) {
            return Self::from_bytes(&bytes);
        }
        let text = std::str::from_utf8(&bytes).map_err(|_| NetfitError::BadMagic)?;
        Self::from_json(text)
    }
}

//! The four propagation passes.
//!
//! | Pass | Method | Produces |
//! |------|--------|----------|
//! | forward | [`Network::forward`] | `z`, `a` for every unit |
//! | backward | [`Network::backward`] | `δz`, `δa`, gradient accumulated |
//! | R-forward | [`Network::r_forward`] | `Rz`, `Ra` for a direction `v` |
//! | R-backward | [`Network::r_backward`] | `Rδz`, `Rδa`, `Hv` accumulated |
//!
//! [`Network::gauss_newton_backward`] is the ordinary backward sweep seeded
//! with `L''·Ra` and accumulating into the curvature buffer, which yields
//! the Gauss-Newton product `Jᵀ·L''·J·v`.
//!
//! Passes are order dependent: the backward and R-forward passes read the
//! forward values, and the R-backward pass reads the R-forward values. The
//! gradient and curvature buffers are additive; nothing here clears them.
//!
//! # Example
//!
//! ```rust
//! use netfit::{Network, NetworkConfig};
//!
//! let network = Network::new(&NetworkConfig::xor().with_seed(5)).unwrap();
//! let mut ws = network.create_workspace();
//! let v = vec![1.0; network.num_weights()];
//!
//! // E = ½(y − t)² for one pattern
//! let y = network.forward(&[1.0, 1.0], &mut ws)[0];
//! network.r_forward(&v, &mut ws);
//! let ry = ws.r_activations()[network.num_units() - 1];
//!
//! ws.zero_gradient();
//! ws.zero_curvature();
//! network.r_backward(&[y - 0.0], &[ry], &v, &mut ws);
//! assert_eq!(ws.curvature_product().len(), 7);
//! ```

use crate::link::{Link, LinkView};
use crate::network::Network;
use crate::workspace::Workspace;

/// Destination of an ordinary backward sweep.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Sink {
    Gradient,
    Curvature,
}

#[inline]
fn source<'b>(network: &Network, buf: &'b [f64], link: &Link, which: usize) -> &'b [f64] {
    match link.sources.get(which) {
        Some(&layer) => &buf[network.layers()[layer].units()],
        None => &[],
    }
}

impl Network {
    /// Forward pass. Returns the output activations.
    ///
    /// # Panics
    ///
    /// Debug-asserts that `input` has the input layer's size and that the
    /// workspace was created for this network.
    pub fn forward<'w>(&self, input: &[f64], ws: &'w mut Workspace) -> &'w [f64] {
        debug_assert_eq!(input.len(), self.input_size());
        debug_assert!(ws.fits(self));

        let inputs = self.layers()[0].units();
        ws.pre[inputs.clone()].copy_from_slice(input);
        ws.act[inputs].copy_from_slice(input);

        for (l, layer) in self.layers().iter().enumerate().skip(1) {
            let units = layer.units();
            let z = &mut ws.pre[units.clone()];
            z.fill(0.0);
            for &index in self.incoming(l) {
                let link = &self.links()[index];
                let w = self.params().slice(link.weights.clone());
                let a = source(self, &ws.act, link, 0);
                let b = source(self, &ws.act, link, 1);
                link.forward(w, a, b, z);
            }
            layer.activate(&ws.pre[units.clone()], &mut ws.act[units]);
        }

        &ws.act[self.output_layer().units()]
    }

    /// Backward pass seeded with `∂E/∂output`; adds `∂E/∂w` to the gradient.
    ///
    /// Frozen links still pass adjoints to their sources but leave their
    /// gradient entries untouched.
    pub fn backward(&self, seed: &[f64], ws: &mut Workspace) {
        self.reverse(seed, ws, Sink::Gradient);
    }

    /// Backward sweep seeded with `L''·Ra` after [`r_forward`](Self::r_forward);
    /// adds the Gauss-Newton product `Jᵀ·L''·J·v` to the curvature buffer.
    pub fn gauss_newton_backward(&self, r_seed: &[f64], ws: &mut Workspace) {
        self.reverse(r_seed, ws, Sink::Curvature);
    }

    /// Input sensitivity `∂E/∂input` from the latest backward sweep.
    pub fn input_gradient<'w>(&self, ws: &'w Workspace) -> &'w [f64] {
        &ws.adj_act[self.layers()[0].units()]
    }

    fn reverse(&self, seed: &[f64], ws: &mut Workspace, sink: Sink) {
        debug_assert_eq!(seed.len(), self.output_size());
        debug_assert!(ws.fits(self));

        ws.adj_act.fill(0.0);
        ws.adj_act[self.output_layer().units()].copy_from_slice(seed);

        for (l, layer) in self.layers().iter().enumerate().skip(1).rev() {
            let units = layer.units();
            layer.adjoint(
                &ws.pre[units.clone()],
                &ws.adj_act[units.clone()],
                &mut ws.adj_pre[units.clone()],
            );
            let dz = &ws.adj_pre[units];
            for &index in self.incoming(l) {
                let link = &self.links()[index];
                let w = self.params().slice(link.weights.clone());
                let a = source(self, &ws.act, link, 0);
                let b = source(self, &ws.act, link, 1);
                for (which, &src) in link.sources.iter().enumerate() {
                    let d_src = &mut ws.adj_act[self.layers()[src].units()];
                    link.backward_source(which, w, a, b, dz, d_src);
                }
                if link.is_trainable() {
                    let out = match sink {
                        Sink::Gradient => &mut ws.grad,
                        Sink::Curvature if link.flags.skip_curvature => continue,
                        Sink::Curvature => &mut ws.curvature,
                    };
                    link.backward_weights(w, a, b, dz, &mut out[link.weights.clone()]);
                }
            }
        }
    }

    /// R-forward pass along `direction`; fills `Rz`, `Ra` for every unit.
    ///
    /// Requires a preceding [`forward`](Self::forward) on the same pattern.
    /// R-values of the input layer are zero.
    pub fn r_forward(&self, direction: &[f64], ws: &mut Workspace) {
        debug_assert_eq!(direction.len(), self.num_weights());
        debug_assert!(ws.fits(self));

        let inputs = self.layers()[0].units();
        ws.r_pre[inputs.clone()].fill(0.0);
        ws.r_act[inputs].fill(0.0);

        for (l, layer) in self.layers().iter().enumerate().skip(1) {
            let units = layer.units();
            let rz = &mut ws.r_pre[units.clone()];
            rz.fill(0.0);
            for &index in self.incoming(l) {
                let link = &self.links()[index];
                let view = LinkView {
                    w: self.params().slice(link.weights.clone()),
                    v: link
                        .is_trainable()
                        .then(|| &direction[link.weights.clone()]),
                    a: source(self, &ws.act, link, 0),
                    b: source(self, &ws.act, link, 1),
                    ra: source(self, &ws.r_act, link, 0),
                    rb: source(self, &ws.r_act, link, 1),
                    dz: &[],
                    rdz: &[],
                };
                link.r_forward(&view, rz);
            }
            layer.tangent(
                &ws.pre[units.clone()],
                &ws.r_pre[units.clone()],
                &mut ws.r_act[units],
            );
        }
    }

    /// R-backward pass; adds the exact Hessian-vector product to the
    /// curvature buffer.
    ///
    /// `seed` is `∂E/∂output` and `r_seed` its R-value, `L''·Ra_out` for a
    /// separable loss. Requires [`forward`](Self::forward) and
    /// [`r_forward`](Self::r_forward) with the same `direction`. The
    /// ordinary adjoints are recomputed in the same sweep; the gradient
    /// buffer is left alone.
    pub fn r_backward(&self, seed: &[f64], r_seed: &[f64], direction: &[f64], ws: &mut Workspace) {
        self.r_reverse(seed, r_seed, direction, ws, false);
    }

    /// Like [`r_backward`](Self::r_backward), also adding the gradient.
    pub fn backward_with_curvature(
        &self,
        seed: &[f64],
        r_seed: &[f64],
        direction: &[f64],
        ws: &mut Workspace,
    ) {
        self.r_reverse(seed, r_seed, direction, ws, true);
    }

    fn r_reverse(
        &self,
        seed: &[f64],
        r_seed: &[f64],
        direction: &[f64],
        ws: &mut Workspace,
        with_gradient: bool,
    ) {
        debug_assert_eq!(seed.len(), self.output_size());
        debug_assert_eq!(r_seed.len(), self.output_size());
        debug_assert_eq!(direction.len(), self.num_weights());
        debug_assert!(ws.fits(self));

        let outputs = self.output_layer().units();
        ws.adj_act.fill(0.0);
        ws.r_adj_act.fill(0.0);
        ws.adj_act[outputs.clone()].copy_from_slice(seed);
        ws.r_adj_act[outputs].copy_from_slice(r_seed);

        for (l, layer) in self.layers().iter().enumerate().skip(1).rev() {
            let units = layer.units();
            layer.r_adjoint(
                &ws.pre[units.clone()],
                &ws.r_pre[units.clone()],
                &ws.adj_act[units.clone()],
                &ws.r_adj_act[units.clone()],
                &mut ws.adj_pre[units.clone()],
                &mut ws.r_adj_pre[units.clone()],
            );
            for &index in self.incoming(l) {
                let link = &self.links()[index];
                let view = LinkView {
                    w: self.params().slice(link.weights.clone()),
                    v: link
                        .is_trainable()
                        .then(|| &direction[link.weights.clone()]),
                    a: source(self, &ws.act, link, 0),
                    b: source(self, &ws.act, link, 1),
                    ra: source(self, &ws.r_act, link, 0),
                    rb: source(self, &ws.r_act, link, 1),
                    dz: &ws.adj_pre[units.clone()],
                    rdz: &ws.r_adj_pre[units.clone()],
                };
                for (which, &src) in link.sources.iter().enumerate() {
                    let src_units = self.layers()[src].units();
                    link.backward_source(
                        which,
                        view.w,
                        view.a,
                        view.b,
                        view.dz,
                        &mut ws.adj_act[src_units.clone()],
                    );
                    link.r_backward_source(which, &view, &mut ws.r_adj_act[src_units]);
                }
                if link.is_trainable() {
                    if with_gradient {
                        link.backward_weights(
                            view.w,
                            view.a,
                            view.b,
                            view.dz,
                            &mut ws.grad[link.weights.clone()],
                        );
                    }
                    if !link.flags.skip_curvature {
                        link.r_backward_weights(&view, &mut ws.curvature[link.weights.clone()]);
                    }
                }
            }
        }
    }
}

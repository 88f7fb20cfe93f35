//! Typed connections between layers.
//!
//! A [`Link`] reads the activations of its source layer(s) and adds a
//! contribution to every pre-activation of its target layer. Each kind
//! carries four rules, one per propagation pass:
//!
//! | Pass | Reads | Writes |
//! |------|-------|--------|
//! | forward | `a` | `z += f(a, w)` |
//! | adjoint | `δz` | `δa += (∂f/∂a)ᵀ δz`, `g += (∂f/∂w)ᵀ δz` |
//! | R-forward | `Ra`, `v` | `Rz += ∂f/∂a·Ra + ∂f/∂w·v` |
//! | R-adjoint | `Rδz`, `δz`, `Ra`, `v` | `Rδa`, `Hv` (second-order terms included) |
//!
//! Weights live in the network's flat parameter vector; a link only knows
//! its `Range`. Within a range, matrix-shaped kinds are stored row-major by
//! target unit: weight `(j, i)` sits at `j·A + i` where `A` is the source
//! size, and the bilinear weight `(j, i, k)` of a `product` link sits at
//! `(j·A + i)·B + k`.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::kernels::{axpy, dot};

/// The closed set of link kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// `z_j += Σ_i w_ji·a_i`
    Linear,
    /// `z_j += b_j`
    Bias,
    /// `z_j += Σ_i w_ji·a_i²`
    Quadratic,
    /// `z_j += Σ_ik w_jik·a_i·b_k`
    Product,
    /// `z_j += Σ_i exp(w_ji)·a_i` (positive weights kept in log space)
    Exponential,
    /// `z_j += −Σ_i (a_i − w_ji)²`
    Distance,
}

impl LinkKind {
    /// All link kinds, in declaration order.
    pub const ALL: [LinkKind; 6] = [
        LinkKind::Linear,
        LinkKind::Bias,
        LinkKind::Quadratic,
        LinkKind::Product,
        LinkKind::Exponential,
        LinkKind::Distance,
    ];

    /// Canonical name, accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            LinkKind::Linear => "linear",
            LinkKind::Bias => "bias",
            LinkKind::Quadratic => "quadratic",
            LinkKind::Product => "product",
            LinkKind::Exponential => "exponential",
            LinkKind::Distance => "distance",
        }
    }

    /// Number of source layers the kind reads.
    pub fn arity(self) -> usize {
        match self {
            LinkKind::Bias => 0,
            LinkKind::Product => 2,
            _ => 1,
        }
    }

    /// Number of weights for the given target and source sizes.
    pub fn weight_count(self, target: usize, sources: &[usize]) -> usize {
        match self {
            LinkKind::Bias => target,
            LinkKind::Product => target * sources.iter().product::<usize>(),
            _ => target * sources.first().copied().unwrap_or(0),
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LinkKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linear" | "full" => Ok(LinkKind::Linear),
            "bias" => Ok(LinkKind::Bias),
            "quadratic" | "square" => Ok(LinkKind::Quadratic),
            "product" | "bilinear" => Ok(LinkKind::Product),
            "exponential" | "exp" => Ok(LinkKind::Exponential),
            "distance" | "radial" => Ok(LinkKind::Distance),
            _ => Err(ConfigError::UnknownLinkKind(s.to_string())),
        }
    }
}

/// Per-link training switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkFlags {
    /// Weights never move: gradient and curvature entries stay zero.
    pub frozen: bool,
    /// Leave the link's weights out of curvature products.
    pub skip_curvature: bool,
}

/// A typed connection from source layers to one target layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Link kind.
    pub kind: LinkKind,
    /// Source layer indices (`kind.arity()` of them).
    pub sources: Vec<usize>,
    /// Target layer index.
    pub target: usize,
    /// Range of this link's weights in the parameter vector.
    pub weights: Range<usize>,
    /// Training switches.
    pub flags: LinkFlags,
}

/// Slices one link reads during a pass.
///
/// Fields a pass does not need are left empty. `v` is `None` when the
/// direction has no component on this link (frozen weights).
pub(crate) struct LinkView<'a> {
    pub w: &'a [f64],
    pub v: Option<&'a [f64]>,
    pub a: &'a [f64],
    pub b: &'a [f64],
    pub ra: &'a [f64],
    pub rb: &'a [f64],
    pub dz: &'a [f64],
    pub rdz: &'a [f64],
}

#[inline(always)]
fn at(v: Option<&[f64]>, idx: usize) -> f64 {
    v.map_or(0.0, |v| v[idx])
}

impl Link {
    /// Number of weights owned by this link.
    pub fn num_weights(&self) -> usize {
        self.weights.len()
    }

    /// Whether gradient entries are produced for this link.
    #[inline]
    pub fn is_trainable(&self) -> bool {
        !self.flags.frozen
    }

    /// Forward rule: `z += f(a, b; w)`.
    pub(crate) fn forward(&self, w: &[f64], a: &[f64], b: &[f64], z: &mut [f64]) {
        let na = a.len();
        match self.kind {
            LinkKind::Bias => {
                for (zj, wj) in z.iter_mut().zip(w) {
                    *zj += wj;
                }
            }
            LinkKind::Linear => {
                for (j, zj) in z.iter_mut().enumerate() {
                    *zj += dot(&w[j * na..(j + 1) * na], a);
                }
            }
            LinkKind::Quadratic => {
                for (j, zj) in z.iter_mut().enumerate() {
                    let row = &w[j * na..(j + 1) * na];
                    let mut s = 0.0;
                    for (wi, ai) in row.iter().zip(a) {
                        s += wi * ai * ai;
                    }
                    *zj += s;
                }
            }
            LinkKind::Exponential => {
                for (j, zj) in z.iter_mut().enumerate() {
                    let row = &w[j * na..(j + 1) * na];
                    let mut s = 0.0;
                    for (wi, ai) in row.iter().zip(a) {
                        s += wi.exp() * ai;
                    }
                    *zj += s;
                }
            }
            LinkKind::Distance => {
                for (j, zj) in z.iter_mut().enumerate() {
                    let row = &w[j * na..(j + 1) * na];
                    let mut s = 0.0;
                    for (wi, ai) in row.iter().zip(a) {
                        let d = ai - wi;
                        s += d * d;
                    }
                    *zj -= s;
                }
            }
            LinkKind::Product => {
                let nb = b.len();
                for (j, zj) in z.iter_mut().enumerate() {
                    let mut s = 0.0;
                    for (i, ai) in a.iter().enumerate() {
                        let o = (j * na + i) * nb;
                        s += ai * dot(&w[o..o + nb], b);
                    }
                    *zj += s;
                }
            }
        }
    }

    /// R-forward rule: `Rz += ∂f/∂a·Ra + ∂f/∂b·Rb + ∂f/∂w·v`.
    pub(crate) fn r_forward(&self, view: &LinkView<'_>, rz: &mut [f64]) {
        let LinkView { w, v, a, b, ra, rb, .. } = *view;
        let na = a.len();
        match self.kind {
            LinkKind::Bias => {
                if let Some(v) = v {
                    for (rzj, vj) in rz.iter_mut().zip(v) {
                        *rzj += vj;
                    }
                }
            }
            LinkKind::Linear => {
                for (j, rzj) in rz.iter_mut().enumerate() {
                    let row = j * na..(j + 1) * na;
                    let mut s = dot(&w[row.clone()], ra);
                    if let Some(v) = v {
                        s += dot(&v[row], a);
                    }
                    *rzj += s;
                }
            }
            LinkKind::Quadratic => {
                for (j, rzj) in rz.iter_mut().enumerate() {
                    let mut s = 0.0;
                    for i in 0..na {
                        let idx = j * na + i;
                        s += 2.0 * w[idx] * a[i] * ra[i] + at(v, idx) * a[i] * a[i];
                    }
                    *rzj += s;
                }
            }
            LinkKind::Exponential => {
                for (j, rzj) in rz.iter_mut().enumerate() {
                    let mut s = 0.0;
                    for i in 0..na {
                        let idx = j * na + i;
                        s += w[idx].exp() * (ra[i] + at(v, idx) * a[i]);
                    }
                    *rzj += s;
                }
            }
            LinkKind::Distance => {
                for (j, rzj) in rz.iter_mut().enumerate() {
                    let mut s = 0.0;
                    for i in 0..na {
                        let idx = j * na + i;
                        s -= 2.0 * (a[i] - w[idx]) * (ra[i] - at(v, idx));
                    }
                    *rzj += s;
                }
            }
            LinkKind::Product => {
                let nb = b.len();
                for (j, rzj) in rz.iter_mut().enumerate() {
                    let mut s = 0.0;
                    for i in 0..na {
                        let o = (j * na + i) * nb;
                        let row = &w[o..o + nb];
                        s += ra[i] * dot(row, b) + a[i] * dot(row, rb);
                        if let Some(v) = v {
                            s += a[i] * dot(&v[o..o + nb], b);
                        }
                    }
                    *rzj += s;
                }
            }
        }
    }

    /// Adjoint rule for source `which`: `δsrc += (∂f/∂src)ᵀ δz`.
    pub(crate) fn backward_source(
        &self,
        which: usize,
        w: &[f64],
        a: &[f64],
        b: &[f64],
        dz: &[f64],
        d_src: &mut [f64],
    ) {
        let na = a.len();
        match self.kind {
            LinkKind::Bias => {}
            LinkKind::Linear => {
                for (j, &dzj) in dz.iter().enumerate() {
                    axpy(dzj, &w[j * na..(j + 1) * na], d_src);
                }
            }
            LinkKind::Quadratic => {
                for (j, &dzj) in dz.iter().enumerate() {
                    for i in 0..na {
                        d_src[i] += 2.0 * w[j * na + i] * a[i] * dzj;
                    }
                }
            }
            LinkKind::Exponential => {
                for (j, &dzj) in dz.iter().enumerate() {
                    for i in 0..na {
                        d_src[i] += w[j * na + i].exp() * dzj;
                    }
                }
            }
            LinkKind::Distance => {
                for (j, &dzj) in dz.iter().enumerate() {
                    for i in 0..na {
                        d_src[i] -= 2.0 * (a[i] - w[j * na + i]) * dzj;
                    }
                }
            }
            LinkKind::Product => {
                let nb = b.len();
                for (j, &dzj) in dz.iter().enumerate() {
                    for i in 0..na {
                        let o = (j * na + i) * nb;
                        let row = &w[o..o + nb];
                        if which == 0 {
                            d_src[i] += dzj * dot(row, b);
                        } else {
                            axpy(dzj * a[i], row, d_src);
                        }
                    }
                }
            }
        }
    }

    /// Adjoint rule for the weights: `g += (∂f/∂w)ᵀ δz`.
    pub(crate) fn backward_weights(
        &self,
        w: &[f64],
        a: &[f64],
        b: &[f64],
        dz: &[f64],
        g: &mut [f64],
    ) {
        let na = a.len();
        match self.kind {
            LinkKind::Bias => {
                for (gj, dzj) in g.iter_mut().zip(dz) {
                    *gj += dzj;
                }
            }
            LinkKind::Linear => {
                for (j, &dzj) in dz.iter().enumerate() {
                    axpy(dzj, a, &mut g[j * na..(j + 1) * na]);
                }
            }
            LinkKind::Quadratic => {
                for (j, &dzj) in dz.iter().enumerate() {
                    for i in 0..na {
                        g[j * na + i] += dzj * a[i] * a[i];
                    }
                }
            }
            LinkKind::Exponential => {
                for (j, &dzj) in dz.iter().enumerate() {
                    for i in 0..na {
                        let idx = j * na + i;
                        g[idx] += dzj * w[idx].exp() * a[i];
                    }
                }
            }
            LinkKind::Distance => {
                for (j, &dzj) in dz.iter().enumerate() {
                    for i in 0..na {
                        let idx = j * na + i;
                        g[idx] += 2.0 * (a[i] - w[idx]) * dzj;
                    }
                }
            }
            LinkKind::Product => {
                let nb = b.len();
                for (j, &dzj) in dz.iter().enumerate() {
                    for i in 0..na {
                        let o = (j * na + i) * nb;
                        axpy(dzj * a[i], b, &mut g[o..o + nb]);
                    }
                }
            }
        }
    }

    /// R-adjoint rule for source `which`, second-order terms included.
    pub(crate) fn r_backward_source(&self, which: usize, view: &LinkView<'_>, rd_src: &mut [f64]) {
        let LinkView {
            w,
            v,
            a,
            b,
            ra,
            rb,
            dz,
            rdz,
        } = *view;
        let na = a.len();
        match self.kind {
            LinkKind::Bias => {}
            LinkKind::Linear => {
                for j in 0..dz.len() {
                    let row = j * na..(j + 1) * na;
                    axpy(rdz[j], &w[row.clone()], rd_src);
                    if let Some(v) = v {
                        axpy(dz[j], &v[row], rd_src);
                    }
                }
            }
            LinkKind::Quadratic => {
                for j in 0..dz.len() {
                    for i in 0..na {
                        let idx = j * na + i;
                        rd_src[i] += 2.0 * w[idx] * a[i] * rdz[j]
                            + 2.0 * at(v, idx) * a[i] * dz[j]
                            + 2.0 * w[idx] * ra[i] * dz[j];
                    }
                }
            }
            LinkKind::Exponential => {
                for j in 0..dz.len() {
                    for i in 0..na {
                        let idx = j * na + i;
                        rd_src[i] += w[idx].exp() * (rdz[j] + at(v, idx) * dz[j]);
                    }
                }
            }
            LinkKind::Distance => {
                for j in 0..dz.len() {
                    for i in 0..na {
                        let idx = j * na + i;
                        rd_src[i] -= 2.0 * (a[i] - w[idx]) * rdz[j]
                            + 2.0 * (ra[i] - at(v, idx)) * dz[j];
                    }
                }
            }
            LinkKind::Product => {
                let nb = b.len();
                for j in 0..dz.len() {
                    for i in 0..na {
                        let o = (j * na + i) * nb;
                        let row = &w[o..o + nb];
                        if which == 0 {
                            let mut s = rdz[j] * dot(row, b) + dz[j] * dot(row, rb);
                            if let Some(v) = v {
                                s += dz[j] * dot(&v[o..o + nb], b);
                            }
                            rd_src[i] += s;
                        } else {
                            axpy(a[i] * rdz[j] + ra[i] * dz[j], row, rd_src);
                            if let Some(v) = v {
                                axpy(a[i] * dz[j], &v[o..o + nb], rd_src);
                            }
                        }
                    }
                }
            }
        }
    }

    /// R-adjoint rule for the weights: `Hv += R{(∂f/∂w)ᵀ δz}`.
    pub(crate) fn r_backward_weights(&self, view: &LinkView<'_>, hv: &mut [f64]) {
        let LinkView {
            w,
            v,
            a,
            b,
            ra,
            rb,
            dz,
            rdz,
        } = *view;
        let na = a.len();
        match self.kind {
            LinkKind::Bias => {
                for (hj, rdzj) in hv.iter_mut().zip(rdz) {
                    *hj += rdzj;
                }
            }
            LinkKind::Linear => {
                for j in 0..dz.len() {
                    let row = &mut hv[j * na..(j + 1) * na];
                    axpy(rdz[j], a, row);
                    axpy(dz[j], ra, row);
                }
            }
            LinkKind::Quadratic => {
                for j in 0..dz.len() {
                    for i in 0..na {
                        hv[j * na + i] += rdz[j] * a[i] * a[i] + 2.0 * dz[j] * a[i] * ra[i];
                    }
                }
            }
            LinkKind::Exponential => {
                for j in 0..dz.len() {
                    for i in 0..na {
                        let idx = j * na + i;
                        hv[idx] += w[idx].exp() * (rdz[j] * a[i] + dz[j] * (at(v, idx) * a[i] + ra[i]));
                    }
                }
            }
            LinkKind::Distance => {
                for j in 0..dz.len() {
                    for i in 0..na {
                        let idx = j * na + i;
                        hv[idx] += 2.0 * (a[i] - w[idx]) * rdz[j] + 2.0 * (ra[i] - at(v, idx)) * dz[j];
                    }
                }
            }
            LinkKind::Product => {
                let nb = b.len();
                for j in 0..dz.len() {
                    for i in 0..na {
                        let o = (j * na + i) * nb;
                        let row = &mut hv[o..o + nb];
                        axpy(rdz[j] * a[i] + dz[j] * ra[i], b, row);
                        axpy(dz[j] * a[i], rb, row);
                    }
                }
            }
        }
    }
}

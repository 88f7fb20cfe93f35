//! Dense vector kernels.
//!
//! The link rules spend almost all of their time in weighted sums and
//! scaled accumulations over rows of the weight matrix. These kernels run
//! the bulk of each slice through `wide::f64x4` and finish the remainder
//! with a scalar tail. Lane sums are reduced in a fixed order, so the same
//! inputs always produce the same bits.

use wide::f64x4;

const LANES: usize = 4;

#[inline(always)]
fn load(s: &[f64], i: usize) -> f64x4 {
    f64x4::new([s[i], s[i + 1], s[i + 2], s[i + 3]])
}

/// Dot product `Σ a[i]·b[i]`.
#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let n = a.len().min(b.len());
    let body = n - n % LANES;

    let mut acc = f64x4::splat(0.0);
    let mut i = 0;
    while i < body {
        acc += load(a, i) * load(b, i);
        i += LANES;
    }
    let lanes = acc.to_array();
    let mut sum = (lanes[0] + lanes[1]) + (lanes[2] + lanes[3]);
    for j in body..n {
        sum += a[j] * b[j];
    }
    sum
}

/// Scaled accumulation `y[i] += alpha·x[i]`.
#[inline]
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len());
    let n = x.len().min(y.len());
    let body = n - n % LANES;

    let va = f64x4::splat(alpha);
    let mut i = 0;
    while i < body {
        let r = load(y, i) + va * load(x, i);
        y[i..i + LANES].copy_from_slice(&r.to_array());
        i += LANES;
    }
    for j in body..n {
        y[j] += alpha * x[j];
    }
}

/// Squared Euclidean norm.
#[inline]
pub fn norm_sq(a: &[f64]) -> f64 {
    dot(a, a)
}

/// Euclidean norm.
#[inline]
pub fn norm(a: &[f64]) -> f64 {
    norm_sq(a).sqrt()
}

/// In-place scaling `x[i] *= alpha`.
#[inline]
pub fn scale(alpha: f64, x: &mut [f64]) {
    for v in x.iter_mut() {
        *v *= alpha;
    }
}

/// `out[i] = a[i] + alpha·d[i]`.
#[inline]
pub fn offset(a: &[f64], alpha: f64, d: &[f64], out: &mut [f64]) {
    debug_assert_eq!(a.len(), d.len());
    debug_assert_eq!(a.len(), out.len());
    out.copy_from_slice(a);
    axpy(alpha, d, out);
}

//! One-dimensional searches along a direction.
//!
//! A line search receives a [`Ray`] (the objective restricted to
//! `w + α·d`), the value and slope at `α = 0` and a suggested first step,
//! and returns the step it settled on. A step of `0` means no decrease was
//! found; the caller decides whether to restart or give up.
//!
//! - [`GoldenSection`] - derivative-free bracketing and golden-ratio shrinking
//! - [`CubicSearch`] - cubic interpolation on values and slopes under the Wolfe conditions
//! - [`HybridSearch`] - cubic first, golden section when the cubic step is unusable
//! - [`SearchThenConverge`] - no search; the schedule `η₀ / (1 + t/τ)`

use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, TrainConfig};
use crate::kernels::{dot, offset};
use crate::optimizer::gradient_descent::RateSchedule;
use crate::optimizer::Evaluator;

/// Golden ratio `(1 + √5) / 2`.
pub const GOLD: f64 = 1.618_033_988_749_895;

/// `2 − GOLD`, the golden section fraction.
pub const CGOLD: f64 = 0.381_966_011_250_105_1;

/// The objective restricted to the ray `origin + α·direction`.
pub struct Ray<'r, 'o> {
    eval: &'r mut Evaluator<'o>,
    origin: &'r [f64],
    direction: &'r [f64],
    point: Vec<f64>,
    grad: Vec<f64>,
}

impl<'r, 'o> Ray<'r, 'o> {
    /// Creates a ray; `origin` and `direction` must have the objective's length.
    pub fn new(eval: &'r mut Evaluator<'o>, origin: &'r [f64], direction: &'r [f64]) -> Self {
        debug_assert_eq!(origin.len(), direction.len());
        let n = origin.len();
        Self {
            eval,
            origin,
            direction,
            point: vec![0.0; n],
            grad: vec![0.0; n],
        }
    }

    /// `f(origin + α·direction)`.
    pub fn value(&mut self, alpha: f64) -> f64 {
        offset(self.origin, alpha, self.direction, &mut self.point);
        self.eval.value(&self.point)
    }

    /// Value and directional derivative at `α`.
    pub fn value_and_slope(&mut self, alpha: f64) -> (f64, f64) {
        offset(self.origin, alpha, self.direction, &mut self.point);
        let f = self.eval.gradient(&self.point, &mut self.grad);
        (f, dot(&self.grad, self.direction))
    }
}

/// Outcome of a line search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineStep {
    /// Accepted step; `0` when no decrease was found.
    pub alpha: f64,
    /// Objective value at the step, when the search evaluated it.
    pub value: Option<f64>,
}

impl LineStep {
    /// No movement.
    pub fn none(f0: f64) -> Self {
        Self {
            alpha: 0.0,
            value: Some(f0),
        }
    }

    /// Step with a known value.
    pub fn at(alpha: f64, value: f64) -> Self {
        Self {
            alpha,
            value: Some(value),
        }
    }

    /// True when the step moves.
    pub fn moved(&self) -> bool {
        self.alpha != 0.0
    }
}

/// A one-dimensional minimiser.
pub trait LineSearch: fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Searches along `ray` from value `f0` and slope `slope0`.
    ///
    /// `initial` is the suggested first step; values `<= 0` select the
    /// search's own default.
    fn search(&mut self, ray: &mut Ray<'_, '_>, f0: f64, slope0: f64, initial: f64) -> LineStep;

    /// Clears any internal schedule.
    fn reset(&mut self) {}
}

#[inline]
fn first_step(initial: f64, default: f64) -> f64 {
    if initial > 0.0 && initial.is_finite() {
        initial
    } else {
        default
    }
}

/// Golden section search.
///
/// Brackets a minimum by expanding with the golden ratio (or shrinking
/// toward the origin when the first step already overshoots), then narrows
/// the bracket until its width falls below `tolerance` relative to the step.
/// Expansion never goes past `max_step`; a function still decreasing there
/// returns `max_step`.
#[derive(Debug, Clone, PartialEq)]
pub struct GoldenSection {
    /// Relative bracket width at which the search stops.
    pub tolerance: f64,
    /// Maximum narrowing iterations.
    pub max_iterations: usize,
    /// Maximum expansion or shrink steps while bracketing.
    pub max_bracket: usize,
    /// First trial step when the caller suggests none.
    pub initial_step: f64,
    /// Largest step ever tried.
    pub max_step: f64,
}

impl Default for GoldenSection {
    fn default() -> Self {
        Self {
            tolerance: 1e-4,
            max_iterations: 40,
            max_bracket: 40,
            initial_step: 1.0,
            max_step: 1e3,
        }
    }
}

impl LineSearch for GoldenSection {
    fn name(&self) -> &'static str {
        "golden"
    }

    fn search(&mut self, ray: &mut Ray<'_, '_>, f0: f64, _slope0: f64, initial: f64) -> LineStep {
        let mut a = 0.0;
        let mut b = first_step(initial, self.initial_step).min(self.max_step);
        let mut fb = ray.value(b);
        let mut c;

        if fb < f0 {
            c = (b + GOLD * (b - a)).min(self.max_step);
            if c <= b {
                return LineStep::at(b, fb);
            }
            let mut fc = ray.value(c);
            let mut n = 0;
            while fc < fb {
                if n == self.max_bracket || c >= self.max_step {
                    return LineStep::at(c, fc);
                }
                a = b;
                b = c;
                fb = fc;
                c = (b + GOLD * (b - a)).min(self.max_step);
                fc = ray.value(c);
                n += 1;
            }
        } else {
            c = b;
            let mut found = false;
            for _ in 0..self.max_bracket {
                b = a + CGOLD * (c - a);
                fb = ray.value(b);
                if fb < f0 {
                    found = true;
                    break;
                }
                c = b;
            }
            if !found {
                return LineStep::none(f0);
            }
        }

        // a < b < c with f(b) below both ends
        for _ in 0..self.max_iterations {
            if c - a <= self.tolerance * (b.abs() + 1e-10) {
                break;
            }
            let x = if c - b > b - a {
                b + CGOLD * (c - b)
            } else {
                b - CGOLD * (b - a)
            };
            let fx = ray.value(x);
            if fx < fb {
                if x > b {
                    a = b;
                } else {
                    c = b;
                }
                b = x;
                fb = fx;
            } else if x > b {
                c = x;
            } else {
                a = x;
            }
        }
        LineStep::at(b, fb)
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    alpha: f64,
    value: f64,
    slope: f64,
}

/// Minimiser of the cubic through two samples with values and slopes.
fn cubic_minimizer(p: Sample, q: Sample) -> Option<f64> {
    let d1 = p.slope + q.slope - 3.0 * (p.value - q.value) / (p.alpha - q.alpha);
    let disc = d1 * d1 - p.slope * q.slope;
    if !(disc >= 0.0) {
        return None;
    }
    let d2 = (q.alpha - p.alpha).signum() * disc.sqrt();
    let x = q.alpha - (q.alpha - p.alpha) * (q.slope + d2 - d1) / (q.slope - p.slope + 2.0 * d2);
    x.is_finite().then_some(x)
}

/// Cubic interpolation line search.
///
/// Accepts a step satisfying the strong Wolfe conditions with constants
/// `c1` (sufficient decrease) and `c2` (curvature). While no bracket exists
/// the step is doubled; once a bracket exists the next trial is the
/// minimiser of the cubic through its two ends, kept away from both ends
/// by a tenth of the bracket width.
#[derive(Debug, Clone, PartialEq)]
pub struct CubicSearch {
    /// Sufficient decrease constant.
    pub c1: f64,
    /// Curvature constant.
    pub c2: f64,
    /// Maximum trial steps.
    pub max_iterations: usize,
    /// First trial step when the caller suggests none.
    pub initial_step: f64,
    /// Largest step ever tried.
    pub max_step: f64,
}

impl Default for CubicSearch {
    fn default() -> Self {
        Self {
            c1: 1e-4,
            c2: 0.1,
            max_iterations: 20,
            initial_step: 1.0,
            max_step: 1e6,
        }
    }
}

impl CubicSearch {
    fn interpolate(lo: Sample, hi: Sample) -> f64 {
        let left = lo.alpha.min(hi.alpha);
        let right = lo.alpha.max(hi.alpha);
        let margin = 0.1 * (right - left);
        let candidate = if hi.value.is_finite() && hi.slope.is_finite() {
            cubic_minimizer(lo, hi)
        } else {
            None
        };
        match candidate {
            Some(x) => x.clamp(left + margin, right - margin),
            None => 0.5 * (left + right),
        }
    }
}

impl LineSearch for CubicSearch {
    fn name(&self) -> &'static str {
        "cubic"
    }

    fn search(&mut self, ray: &mut Ray<'_, '_>, f0: f64, slope0: f64, initial: f64) -> LineStep {
        if !(slope0 < 0.0) {
            return LineStep::none(f0);
        }
        let mut alpha = first_step(initial, self.initial_step).min(self.max_step);
        let mut lo = Sample {
            alpha: 0.0,
            value: f0,
            slope: slope0,
        };
        let mut hi: Option<Sample> = None;
        let mut best = lo;

        for _ in 0..self.max_iterations {
            let (f, g) = ray.value_and_slope(alpha);
            let s = Sample {
                alpha,
                value: f,
                slope: g,
            };
            if f < best.value {
                best = s;
            }

            if !f.is_finite() || f > f0 + self.c1 * alpha * slope0 || f >= lo.value {
                hi = Some(s);
            } else {
                if g.abs() <= -self.c2 * slope0 {
                    return LineStep::at(alpha, f);
                }
                match hi {
                    Some(h) if g * (h.alpha - lo.alpha) >= 0.0 => hi = Some(lo),
                    None if g >= 0.0 => hi = Some(lo),
                    _ => {}
                }
                lo = s;
            }

            alpha = match hi {
                None => {
                    if alpha >= self.max_step {
                        break;
                    }
                    (2.0 * alpha).min(self.max_step)
                }
                Some(h) => {
                    if (h.alpha - lo.alpha).abs() <= 1e-14 * (1.0 + lo.alpha.abs()) {
                        break;
                    }
                    Self::interpolate(lo, h)
                }
            };
        }

        if best.value < f0 {
            LineStep::at(best.alpha, best.value)
        } else {
            LineStep::none(f0)
        }
    }
}

/// Cubic search with a golden section fallback.
///
/// The cubic result is rejected when it failed to decrease the objective
/// or when it lands beyond `trust` times the first trial step.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridSearch {
    /// Primary search.
    pub cubic: CubicSearch,
    /// Fallback search.
    pub golden: GoldenSection,
    /// Largest accepted cubic step, as a multiple of the first trial step.
    pub trust: f64,
}

impl Default for HybridSearch {
    fn default() -> Self {
        Self {
            cubic: CubicSearch::default(),
            golden: GoldenSection::default(),
            trust: 1e3,
        }
    }
}

impl LineSearch for HybridSearch {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    fn search(&mut self, ray: &mut Ray<'_, '_>, f0: f64, slope0: f64, initial: f64) -> LineStep {
        let start = first_step(initial, self.cubic.initial_step);
        let step = self.cubic.search(ray, f0, slope0, initial);
        if step.moved() && step.alpha.is_finite() && step.alpha <= self.trust * start {
            return step;
        }
        debug!(
            "cubic line search unusable (alpha = {:e}), falling back to golden section",
            step.alpha
        );
        self.golden.search(ray, f0, slope0, initial)
    }
}

/// Search-then-converge schedule `η₀ / (1 + t/τ)`.
///
/// As a line search it performs no evaluations: the `t`-th call returns the
/// `t`-th rate and the caller moves unconditionally. As a
/// [`RateSchedule`] it gives gradient descent the same rates by epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchThenConverge {
    /// Initial rate.
    pub eta0: f64,
    /// Epochs until the rate has halved.
    pub tau: f64,
    calls: usize,
}

impl SearchThenConverge {
    /// Creates a schedule.
    pub fn new(eta0: f64, tau: f64) -> Self {
        Self { eta0, tau, calls: 0 }
    }

    /// Rate at step `t`.
    #[inline]
    pub fn rate_at(&self, t: usize) -> f64 {
        self.eta0 / (1.0 + t as f64 / self.tau)
    }
}

impl Default for SearchThenConverge {
    fn default() -> Self {
        Self::new(0.1, 100.0)
    }
}

impl RateSchedule for SearchThenConverge {
    fn rate(&self, epoch: usize) -> f64 {
        self.rate_at(epoch)
    }
}

impl LineSearch for SearchThenConverge {
    fn name(&self) -> &'static str {
        "stc"
    }

    fn search(&mut self, _ray: &mut Ray<'_, '_>, _f0: f64, _slope0: f64, _initial: f64) -> LineStep {
        let alpha = self.rate_at(self.calls);
        self.calls += 1;
        LineStep { alpha, value: None }
    }

    fn reset(&mut self) {
        self.calls = 0;
    }
}

/// The closed set of line searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineSearchKind {
    /// [`GoldenSection`]
    #[serde(rename = "golden")]
    Golden,
    /// [`CubicSearch`]
    #[serde(rename = "cubic")]
    Cubic,
    /// [`HybridSearch`]
    #[serde(rename = "hybrid")]
    Hybrid,
    /// [`SearchThenConverge`]
    #[serde(rename = "stc")]
    SearchThenConverge,
}

impl LineSearchKind {
    /// Canonical name.
    pub fn name(self) -> &'static str {
        match self {
            LineSearchKind::Golden => "golden",
            LineSearchKind::Cubic => "cubic",
            LineSearchKind::Hybrid => "hybrid",
            LineSearchKind::SearchThenConverge => "stc",
        }
    }

    /// Builds the search with defaults, taking `eta0`/`tau` from `config`.
    pub fn build(self, config: &TrainConfig) -> Box<dyn LineSearch> {
        match self {
            LineSearchKind::Golden => Box::new(GoldenSection::default()),
            LineSearchKind::Cubic => Box::new(CubicSearch::default()),
            LineSearchKind::Hybrid => Box::new(HybridSearch::default()),
            LineSearchKind::SearchThenConverge => {
                Box::new(SearchThenConverge::new(config.eta0, config.tau))
            }
        }
    }
}

impl FromStr for LineSearchKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "golden" | "golden_section" => Ok(LineSearchKind::Golden),
            "cubic" => Ok(LineSearchKind::Cubic),
            "hybrid" => Ok(LineSearchKind::Hybrid),
            "stc" | "search_then_converge" => Ok(LineSearchKind::SearchThenConverge),
            _ => Err(ConfigError::UnknownLineSearch(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::Objective;

    /// f(w) = (w − 3)² + 1
    struct Parabola;

    impl Objective for Parabola {
        fn dim(&self) -> usize {
            1
        }
        fn value(&mut self, w: &[f64]) -> f64 {
            (w[0] - 3.0).powi(2) + 1.0
        }
        fn gradient(&mut self, w: &[f64], grad: &mut [f64]) -> f64 {
            grad[0] = 2.0 * (w[0] - 3.0);
            self.value(w)
        }
        fn hessian_vector(&mut self, _w: &[f64], v: &[f64], out: &mut [f64]) {
            out[0] = 2.0 * v[0];
        }
    }

    fn run(search: &mut dyn LineSearch, initial: f64) -> LineStep {
        let mut objective = Parabola;
        let mut eval = Evaluator::new(&mut objective);
        let origin = [0.0];
        let direction = [1.0];
        let mut ray = Ray::new(&mut eval, &origin, &direction);
        // f(0) = 10, f'(0) = −6
        search.search(&mut ray, 10.0, -6.0, initial)
    }

    #[test]
    fn test_golden_expands_to_minimum() {
        let step = run(&mut GoldenSection::default(), 0.5);
        assert!((step.alpha - 3.0).abs() < 1e-3, "alpha = {}", step.alpha);
        assert!(step.value.unwrap() < 1.0 + 1e-6);
    }

    #[test]
    fn test_golden_shrinks_from_overshoot() {
        let step = run(&mut GoldenSection::default(), 100.0);
        assert!((step.alpha - 3.0).abs() < 1e-3, "alpha = {}", step.alpha);
    }

    #[test]
    fn test_golden_stops_at_max_step() {
        // f(w) = 10 − w decreases without bound
        struct Slope;
        impl Objective for Slope {
            fn dim(&self) -> usize {
                1
            }
            fn value(&mut self, w: &[f64]) -> f64 {
                10.0 - w[0]
            }
            fn gradient(&mut self, w: &[f64], grad: &mut [f64]) -> f64 {
                grad[0] = -1.0;
                self.value(w)
            }
            fn hessian_vector(&mut self, _w: &[f64], _v: &[f64], out: &mut [f64]) {
                out[0] = 0.0;
            }
        }

        let mut objective = Slope;
        let mut eval = Evaluator::new(&mut objective);
        let origin = [0.0];
        let direction = [1.0];
        let mut ray = Ray::new(&mut eval, &origin, &direction);
        let mut golden = GoldenSection {
            max_step: 50.0,
            ..Default::default()
        };
        let step = golden.search(&mut ray, 10.0, -1.0, 1.0);
        assert_eq!(step, LineStep::at(50.0, -40.0));

        let step = golden.search(&mut ray, 10.0, -1.0, 80.0);
        assert_eq!(step, LineStep::at(50.0, -40.0));
    }

    #[test]
    fn test_golden_reports_no_decrease() {
        let mut objective = Parabola;
        let mut eval = Evaluator::new(&mut objective);
        let origin = [3.0];
        let direction = [1.0];
        let mut ray = Ray::new(&mut eval, &origin, &direction);
        let step = GoldenSection::default().search(&mut ray, 1.0, 0.0, 1.0);
        assert!(!step.moved());
        assert_eq!(step.value, Some(1.0));
    }

    #[test]
    fn test_cubic_exact_on_parabola() {
        let step = run(&mut CubicSearch::default(), 1.0);
        // The interpolating cubic of a parabola is the parabola itself.
        assert!((step.alpha - 3.0).abs() < 1e-9, "alpha = {}", step.alpha);
    }

    #[test]
    fn test_cubic_rejects_ascent_direction() {
        let mut objective = Parabola;
        let mut eval = Evaluator::new(&mut objective);
        let origin = [0.0];
        let direction = [-1.0];
        let mut ray = Ray::new(&mut eval, &origin, &direction);
        let step = CubicSearch::default().search(&mut ray, 10.0, 6.0, 1.0);
        assert!(!step.moved());
    }

    #[test]
    fn test_hybrid_accepts_wolfe_step() {
        let step = run(&mut HybridSearch::default(), 0.1);
        assert!(step.moved());
        // doubling from 0.1 reaches 3.2, where |f'| = 0.4 passes the curvature test
        assert!((step.alpha - 3.2).abs() < 1e-12, "alpha = {}", step.alpha);
        assert!(step.value.unwrap() < 1.1);
    }

    #[test]
    fn test_stc_schedule() {
        let mut stc = SearchThenConverge::new(0.5, 10.0);
        assert_eq!(run(&mut stc, 1.0).alpha, 0.5);
        assert_eq!(run(&mut stc, 1.0).alpha, 0.5 / 1.1);
        assert_eq!(stc.rate(10), 0.25);
        stc.reset();
        let step = run(&mut stc, 1.0);
        assert_eq!(step.alpha, 0.5);
        assert_eq!(step.value, None);
    }

    #[test]
    fn test_cubic_minimizer_formula() {
        let p = Sample {
            alpha: 0.0,
            value: 4.0,
            slope: -4.0,
        };
        let q = Sample {
            alpha: 1.0,
            value: 1.0,
            slope: -2.0,
        };
        assert_eq!(cubic_minimizer(p, q), Some(2.0));
    }

    #[test]
    fn test_kind_names() {
        for kind in [
            LineSearchKind::Golden,
            LineSearchKind::Cubic,
            LineSearchKind::Hybrid,
            LineSearchKind::SearchThenConverge,
        ] {
            assert_eq!(kind.name().parse::<LineSearchKind>().unwrap(), kind);
            assert_eq!(kind.build(&TrainConfig::default()).name(), kind.name());
        }
    }
}

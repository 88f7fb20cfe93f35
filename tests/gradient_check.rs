//! Numerical Gradient Checking for the netfit Backward Pass
//!
//! Verifies that the analytical gradients computed by the backward pass
//! match central differences of the objective value.
//!
//! # Methodology
//!
//! For each weight `w_i`:
//! - Analytical gradient: `NetworkObjective::gradient`
//! - Numerical gradient: `(E(w + ε·e_i) − E(w − ε·e_i)) / (2ε)`
//!
//! Everything is `f64`, so the tolerances are far tighter than a
//! single-precision check would allow.

use netfit::optimizer::Objective;
use netfit::{
    Activation, Dataset, LinkKind, Loss, MemoryDataset, Network, NetworkConfig, NetworkObjective,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Step for central differences.
const H: f64 = 1e-6;

/// Allowed error, relative to `max(1, |analytic| + |numeric|)`.
const TOLERANCE: f64 = 1e-6;

// =============================================================================
// HELPERS
// =============================================================================

/// A network using every link kind: linear, bias, quadratic, product (one
/// layer with itself), exponential and distance.
fn zoo(output: Activation, seed: u64) -> Network {
    let config = NetworkConfig::new()
        .with_layer(3, Activation::Linear)
        .with_layer(4, Activation::Tanh)
        .with_layer(3, Activation::Gaussian)
        .with_layer(2, output)
        .with_link(LinkKind::Linear, &[0], 1)
        .with_bias(1)
        .with_link(LinkKind::Quadratic, &[0], 2)
        .with_link(LinkKind::Product, &[1, 1], 2)
        .with_link(LinkKind::Distance, &[0], 2)
        .with_link(LinkKind::Linear, &[2], 3)
        .with_link(LinkKind::Exponential, &[1], 3)
        .with_link(LinkKind::Linear, &[0], 3)
        .with_bias(3)
        .with_init_scale(0.4)
        .with_seed(seed);
    Network::new(&config).unwrap()
}

fn random_data(rng: &mut SmallRng, n: usize, lo: f64, hi: f64) -> MemoryDataset {
    let mut data = MemoryDataset::new(3, 2);
    for _ in 0..n {
        let x: Vec<f64> = (0..3).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let y: Vec<f64> = (0..2).map(|_| rng.gen_range(lo..hi)).collect();
        data.push(&x, &y).unwrap();
    }
    data
}

fn check_gradient(network: &mut Network, data: &MemoryDataset, loss: Loss) {
    let w = network.weights().to_vec();
    let mut objective = NetworkObjective::new(network, data, loss).unwrap();
    let mut analytic = vec![0.0; w.len()];
    objective.gradient(&w, &mut analytic);

    let mut probe = w.clone();
    for i in 0..w.len() {
        probe[i] = w[i] + H;
        let plus = objective.value(&probe);
        probe[i] = w[i] - H;
        let minus = objective.value(&probe);
        probe[i] = w[i];
        let numeric = (plus - minus) / (2.0 * H);

        let scale = 1.0f64.max(analytic[i].abs() + numeric.abs());
        assert!(
            (analytic[i] - numeric).abs() <= TOLERANCE * scale,
            "{}: weight {}: analytic {:e}, numeric {:e}",
            loss.name(),
            i,
            analytic[i],
            numeric
        );
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[test]
fn test_gradient_check_xor_network() {
    let mut network = Network::new(&NetworkConfig::xor().with_seed(42)).unwrap();
    let data = MemoryDataset::xor();
    check_gradient(&mut network, &data, Loss::Quadratic);
}

#[test]
fn test_gradient_check_every_link_kind() {
    let mut rng = SmallRng::seed_from_u64(7);
    let data = random_data(&mut rng, 6, -1.0, 1.0);
    let mut network = zoo(Activation::Linear, 1);
    check_gradient(&mut network, &data, Loss::Quadratic);
    check_gradient(&mut network, &data, Loss::LogCosh);
    check_gradient(&mut network, &data, Loss::Huber { delta: 0.3 });
}

#[test]
fn test_gradient_check_cross_entropy() {
    let mut rng = SmallRng::seed_from_u64(11);
    let data = random_data(&mut rng, 5, 0.1, 0.9);
    let mut network = zoo(Activation::Logistic, 2);
    check_gradient(&mut network, &data, Loss::CrossEntropy);
}

#[test]
fn test_gradient_check_symmetric_cross_entropy() {
    let mut rng = SmallRng::seed_from_u64(13);
    let data = random_data(&mut rng, 5, -0.8, 0.8);
    let mut network = zoo(Activation::Tanh, 3);
    check_gradient(&mut network, &data, Loss::SymmetricCrossEntropy);
}

#[test]
fn test_gradient_check_every_activation() {
    let mut rng = SmallRng::seed_from_u64(17);
    let data = random_data(&mut rng, 4, -0.5, 0.5);
    for (k, activation) in Activation::ALL.into_iter().enumerate() {
        let config = NetworkConfig::feed_forward(&[3, 3, 2], activation, Activation::Linear)
            .with_seed(100 + k as u64);
        let mut network = Network::new(&config).unwrap();
        check_gradient(&mut network, &data, Loss::Quadratic);
    }
}

#[test]
fn test_frozen_link_has_zero_gradient() {
    let config = NetworkConfig::new()
        .with_layer(2, Activation::Linear)
        .with_layer(3, Activation::Tanh)
        .with_layer(1, Activation::Linear)
        .with_link(LinkKind::Linear, &[0], 1)
        .frozen()
        .with_bias(1)
        .with_link(LinkKind::Linear, &[1], 2)
        .with_seed(5);
    let mut network = Network::new(&config).unwrap();
    let frozen = network.links()[0].weights.clone();
    let data = MemoryDataset::xor();
    let w = network.weights().to_vec();

    let mut objective = NetworkObjective::new(&mut network, &data, Loss::Quadratic).unwrap();
    let mut grad = vec![1.0; w.len()];
    objective.gradient(&w, &mut grad);
    assert!(grad[frozen.clone()].iter().all(|&g| g == 0.0));
    assert!(grad[frozen.end..].iter().any(|&g| g != 0.0));
}

#[test]
fn test_shared_weights_sum_both_contributions() {
    let mut config = NetworkConfig::new()
        .with_layer(2, Activation::Linear)
        .with_layer(2, Activation::Tanh)
        .with_layer(2, Activation::Tanh)
        .with_link(LinkKind::Linear, &[0], 1)
        .with_link(LinkKind::Linear, &[1], 2)
        .with_bias(2)
        .with_seed(9);
    config.links[1].shares = Some(0);
    let mut network = Network::new(&config).unwrap();
    assert_eq!(network.num_weights(), 6);
    assert_eq!(network.links()[0].weights, network.links()[1].weights);

    let mut rng = SmallRng::seed_from_u64(19);
    let mut data = MemoryDataset::new(2, 2);
    for _ in 0..4 {
        let x = [rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)];
        let y = [rng.gen_range(-0.5..0.5), rng.gen_range(-0.5..0.5)];
        data.push(&x, &y).unwrap();
    }
    check_gradient(&mut network, &data, Loss::Quadratic);
}

#[test]
fn test_input_gradient_matches_finite_differences() {
    let network = zoo(Activation::Linear, 4);
    let x = [0.3, -0.2, 0.7];
    let mut ws = network.create_workspace();

    // E = Σ_k y_k, seed 1 on every output
    network.forward(&x, &mut ws);
    network.backward(&[1.0, 1.0], &mut ws);
    let analytic = network.input_gradient(&ws).to_vec();

    for i in 0..3 {
        let mut xp = x;
        let mut xm = x;
        xp[i] += H;
        xm[i] -= H;
        let fp: f64 = network.evaluate(&xp).unwrap().iter().sum();
        let fm: f64 = network.evaluate(&xm).unwrap().iter().sum();
        let numeric = (fp - fm) / (2.0 * H);
        assert!(
            (analytic[i] - numeric).abs() <= TOLERANCE * 1.0f64.max(numeric.abs()),
            "input {}: analytic {:e}, numeric {:e}",
            i,
            analytic[i],
            numeric
        );
    }
}

#[test]
fn test_gradient_independent_of_previous_calls() {
    let mut network = zoo(Activation::Linear, 6);
    let mut rng = SmallRng::seed_from_u64(23);
    let data = random_data(&mut rng, 3, -1.0, 1.0);
    let w = network.weights().to_vec();
    let other: Vec<f64> = w.iter().map(|x| x * 0.5).collect();

    let mut objective = NetworkObjective::new(&mut network, &data, Loss::Quadratic).unwrap();
    let mut first = vec![0.0; w.len()];
    let mut second = vec![0.0; w.len()];
    objective.gradient(&w, &mut first);
    objective.gradient(&other, &mut second);
    objective.gradient(&w, &mut second);
    assert_eq!(first, second);
    assert_eq!(data.len(), 3);
}

//! Backward pass correctness tests.
//!
//! This module tests:
//! - Additive accumulation of per-pattern gradients
//! - The objective gradient as the mean of per-pattern gradients
//! - Edge cases: zero seeds, wide layers, curvature buffers left alone
//!
//! # Test Strategy
//!
//! 1. **Accumulation**: two backward passes without zeroing equal the sum
//!    of two separately zeroed passes
//! 2. **Masking**: a zero seed contributes nothing
//! 3. **Wide layers**: a single linear layer of 1000+ inputs against the
//!    closed-form outer product

use approx::assert_relative_eq;
use netfit::optimizer::Objective;
use netfit::{
    Activation, Dataset, LinkKind, Loss, MemoryDataset, Network, NetworkConfig, NetworkObjective,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn random_vec(rng: &mut SmallRng, n: usize) -> Vec<f64> {
    (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn mlp(seed: u64) -> Network {
    let config = NetworkConfig::feed_forward(&[4, 6, 3], Activation::Tanh, Activation::Logistic)
        .with_seed(seed);
    Network::new(&config).unwrap()
}

/// Gradient of `seed · output` for one input, from a zeroed workspace.
fn pattern_gradient(network: &Network, x: &[f64], seed: &[f64]) -> Vec<f64> {
    let mut ws = network.create_workspace();
    ws.zero_gradient();
    network.forward(x, &mut ws);
    network.backward(seed, &mut ws);
    ws.gradient().to_vec()
}

// =============================================================================
// Accumulation
// =============================================================================

#[test]
fn test_gradients_accumulate_across_patterns() {
    let network = mlp(1);
    let mut rng = SmallRng::seed_from_u64(2);
    let (x1, x2) = (random_vec(&mut rng, 4), random_vec(&mut rng, 4));
    let (s1, s2) = (random_vec(&mut rng, 3), random_vec(&mut rng, 3));

    let mut ws = network.create_workspace();
    ws.zero_gradient();
    network.forward(&x1, &mut ws);
    network.backward(&s1, &mut ws);
    network.forward(&x2, &mut ws);
    network.backward(&s2, &mut ws);
    let together = ws.gradient().to_vec();

    let g1 = pattern_gradient(&network, &x1, &s1);
    let g2 = pattern_gradient(&network, &x2, &s2);
    for i in 0..together.len() {
        assert_relative_eq!(together[i], g1[i] + g2[i], epsilon = 1e-15);
    }
}

#[test]
fn test_zero_gradient_clears_accumulator() {
    let network = mlp(3);
    let x = [0.1, 0.2, 0.3, 0.4];
    let seed = [1.0, -1.0, 0.5];

    let mut ws = network.create_workspace();
    for _ in 0..3 {
        network.forward(&x, &mut ws);
        network.backward(&seed, &mut ws);
    }
    ws.zero_gradient();
    assert!(ws.gradient().iter().all(|&g| g == 0.0));

    network.forward(&x, &mut ws);
    network.backward(&seed, &mut ws);
    assert_eq!(ws.gradient(), pattern_gradient(&network, &x, &seed).as_slice());
}

#[test]
fn test_objective_gradient_is_mean_of_patterns() {
    let mut network = mlp(4);
    let mut rng = SmallRng::seed_from_u64(5);
    let mut data = MemoryDataset::new(4, 3);
    for _ in 0..5 {
        let x = random_vec(&mut rng, 4);
        let y: Vec<f64> = (0..3).map(|_| rng.gen_range(0.0..1.0)).collect();
        data.push(&x, &y).unwrap();
    }

    // ∂E/∂y for the quadratic loss is y − t
    let mut expected = vec![0.0; network.num_weights()];
    for p in 0..data.len() {
        let y = network.evaluate(data.x(p)).unwrap();
        let seed: Vec<f64> = y.iter().zip(data.y(p)).map(|(y, t)| y - t).collect();
        for (e, g) in expected.iter_mut().zip(pattern_gradient(&network, data.x(p), &seed)) {
            *e += g / data.len() as f64;
        }
    }

    let w = network.weights().to_vec();
    let mut objective = NetworkObjective::new(&mut network, &data, Loss::Quadratic).unwrap();
    let mut grad = vec![0.0; w.len()];
    objective.gradient(&w, &mut grad);
    for i in 0..w.len() {
        assert_relative_eq!(grad[i], expected[i], epsilon = 1e-14, max_relative = 1e-12);
    }
}

// =============================================================================
// Masking
// =============================================================================

#[test]
fn test_zero_seed_contributes_nothing() {
    let network = mlp(6);
    let g = pattern_gradient(&network, &[1.0, -1.0, 0.5, 0.0], &[0.0; 3]);
    assert!(g.iter().all(|&x| x == 0.0));

    let mut ws = network.create_workspace();
    network.forward(&[1.0, -1.0, 0.5, 0.0], &mut ws);
    network.backward(&[0.0; 3], &mut ws);
    assert!(network.input_gradient(&ws).iter().all(|&x| x == 0.0));
}

#[test]
fn test_sparse_seed_touches_one_output_row() {
    let config = NetworkConfig::new()
        .with_layer(3, Activation::Linear)
        .with_layer(2, Activation::Linear)
        .with_link(LinkKind::Linear, &[0], 1)
        .with_bias(1)
        .with_seed(7);
    let network = Network::new(&config).unwrap();
    let g = pattern_gradient(&network, &[1.0, 2.0, 3.0], &[0.0, 1.0]);
    // rows of the linear link, then the bias
    assert_eq!(g, vec![0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 0.0, 1.0]);
}

#[test]
fn test_backward_leaves_curvature_buffer_alone() {
    let network = mlp(8);
    let mut ws = network.create_workspace();
    ws.zero_curvature();
    network.forward(&[0.3; 4], &mut ws);
    network.backward(&[1.0; 3], &mut ws);
    assert!(ws.curvature_product().iter().all(|&x| x == 0.0));
}

// =============================================================================
// Wide layers
// =============================================================================

#[test]
fn test_wide_input_outer_product() {
    let n = 1030;
    let config = NetworkConfig::new()
        .with_layer(n, Activation::Linear)
        .with_layer(2, Activation::Linear)
        .with_link(LinkKind::Linear, &[0], 1)
        .with_seed(9);
    let network = Network::new(&config).unwrap();
    let mut rng = SmallRng::seed_from_u64(10);
    let x = random_vec(&mut rng, n);
    let seed = [0.75, -2.0];

    let g = pattern_gradient(&network, &x, &seed);
    for j in 0..2 {
        for i in 0..n {
            assert_eq!(g[j * n + i], seed[j] * x[i], "weight ({}, {})", j, i);
        }
    }

    // input adjoint is Wᵀ·seed
    let mut ws = network.create_workspace();
    network.forward(&x, &mut ws);
    network.backward(&seed, &mut ws);
    let w = network.weights();
    for (i, &a) in network.input_gradient(&ws).iter().enumerate() {
        let expected = seed[0] * w[i] + seed[1] * w[n + i];
        assert_relative_eq!(a, expected, epsilon = 1e-14);
    }
}

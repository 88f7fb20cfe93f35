//! XOR Training Example
//!
//! Trains the classic 2-1-1 XOR network (one hidden unit plus an
//! input-to-output shortcut) with Polak–Ribière conjugate gradient and a
//! golden section line search, then saves the model and reloads it.
//!
//! # Key Concepts
//!
//! 1. **NetworkConfig**: layers and typed links
//! 2. **TrainConfig**: optimizer, line search, loss and stopping rules
//! 3. **fit**: the epoch loop, with a progress hook
//!
//! # Run
//!
//! ```bash
//! RUST_LOG=info cargo run --example xor
//! ```

use netfit::{fit, Control, MemoryDataset, NetfitResult, Network, NetworkConfig, TrainConfig};

fn main() -> NetfitResult<()> {
    env_logger::init();
    println!("=== netfit XOR Example ===\n");

    let data = MemoryDataset::xor();
    let config = TrainConfig {
        method: "cgpr".into(),
        line_search: "golden".into(),
        max_epochs: 200,
        min_epochs: 10,
        error_tolerance: 1e-4,
        ..Default::default()
    };

    // A few seeds: the 2-1-1 network has local minima.
    let mut best: Option<Network> = None;
    let mut best_error = f64::INFINITY;
    for seed in 0..5 {
        let mut network = Network::new(&NetworkConfig::xor().with_seed(seed))?;
        let report = fit(&mut network, &data, &config, |p| {
            if p.epoch % 20 == 0 {
                println!(
                    "  seed {} epoch {:>3}: error {:.3e}, |g| {:.3e}",
                    seed, p.epoch, p.error, p.gradient_norm
                );
            }
            Control::Continue
        })?;
        println!(
            "seed {}: {} after {} epochs, error {:.3e} ({} value, {} gradient calls)\n",
            seed,
            report.stop_reason,
            report.epochs,
            report.error,
            report.counters.function_calls,
            report.counters.gradient_calls
        );
        if report.error < best_error {
            best_error = report.error;
            best = Some(network);
        }
        if report.converged() {
            break;
        }
    }

    let Some(network) = best else {
        return Ok(());
    };

    println!("--- Truth table ---");
    for x in [[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]] {
        let y = network.evaluate(&x)?;
        println!("  {} xor {} = {:.4}", x[0], x[1], y[0]);
    }

    let path = std::env::temp_dir().join("netfit_xor.bin");
    network.save(&path)?;
    let restored = Network::load(&path)?;
    println!("\nSaved to {} ({} weights)", path.display(), restored.num_weights());
    println!("Reloaded model identical: {}", restored == network);
    Ok(())
}

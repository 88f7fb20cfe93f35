//! Configuration loading and rejection through the public API.

use netfit::{
    fit, Activation, ConfigError, Control, LinkKind, MemoryDataset, NetfitError, Network,
    NetworkConfig, SubSample, TrainConfig,
};
use tempfile::tempdir;

fn config_error(result: Result<Network, NetfitError>) -> ConfigError {
    match result {
        Err(NetfitError::Config(e)) => e,
        Err(other) => panic!("expected a config error, got {:?}", other),
        Ok(_) => panic!("expected a config error, got a network"),
    }
}

// =============================================================================
// Network configs
// =============================================================================

#[test]
fn test_network_config_from_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("net.json");
    std::fs::write(
        &path,
        r#"{
            "layers": [
                {"size": 2},
                {"size": 4, "activation": "tanh"},
                {"size": 1, "activation": "logistic"}
            ],
            "links": [
                {"kind": "linear", "sources": [0], "target": 1},
                {"kind": "bias", "target": 1},
                {"kind": "product", "sources": [0, 1], "target": 2, "skip_curvature": true},
                {"kind": "linear", "sources": [1], "target": 2, "frozen": true},
                {"kind": "bias", "target": 2}
            ],
            "init_scale": 0.1,
            "init_seed": 8
        }"#,
    )
    .unwrap();

    let config = NetworkConfig::from_json_file(&path).unwrap();
    let network = Network::new(&config).unwrap();
    assert_eq!(network.layer_sizes(), vec![2, 4, 1]);
    assert_eq!(network.num_weights(), 8 + 4 + 8 + 4 + 1);
    assert!(network.links()[2].flags.skip_curvature);
    assert!(network.links()[3].flags.frozen);
    assert!(network.weights().iter().all(|w| w.abs() <= 0.1));

    let mask = network.trainable_mask();
    let frozen = network.links()[3].weights.clone();
    assert!(mask[frozen].iter().all(|&m| !m));
}

#[test]
fn test_network_config_file_errors() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        NetworkConfig::from_json_file(dir.path().join("missing.json")),
        Err(NetfitError::Io(_))
    ));

    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{\"layers\": [").unwrap();
    assert!(matches!(
        NetworkConfig::from_json_file(&path),
        Err(NetfitError::Json(_))
    ));

    std::fs::write(&path, r#"{"layers": [{"size": 2}]}"#).unwrap();
    assert!(matches!(
        NetworkConfig::from_json_file(&path),
        Err(NetfitError::Config(ConfigError::TooFewLayers(1)))
    ));
}

#[test]
fn test_network_new_rejects_bad_topology() {
    let base = NetworkConfig::new()
        .with_layer(2, Activation::Linear)
        .with_layer(3, Activation::Tanh)
        .with_layer(1, Activation::Linear);

    let empty = NetworkConfig::new()
        .with_layer(2, Activation::Linear)
        .with_layer(0, Activation::Tanh);
    assert_eq!(config_error(Network::new(&empty)), ConfigError::EmptyLayer(1));

    let into_input = base.clone().with_link(LinkKind::Linear, &[1], 0);
    assert_eq!(config_error(Network::new(&into_input)), ConfigError::InputTarget(0));

    let past_end = base.clone().with_link(LinkKind::Linear, &[0], 3);
    assert!(matches!(
        config_error(Network::new(&past_end)),
        ConfigError::LinkTarget { target: 3, layers: 3, .. }
    ));

    let bias_with_source = base.clone().with_link(LinkKind::Bias, &[0], 1);
    assert!(matches!(
        config_error(Network::new(&bias_with_source)),
        ConfigError::LinkArity { expected: 0, got: 1, .. }
    ));

    let negative_scale = base.with_init_scale(-1.0);
    assert!(matches!(
        config_error(Network::new(&negative_scale)),
        ConfigError::InvalidValue { field: "init_scale", .. }
    ));
}

#[test]
fn test_shared_weights_must_match() {
    let mut config = NetworkConfig::new()
        .with_layer(2, Activation::Linear)
        .with_layer(3, Activation::Tanh)
        .with_layer(3, Activation::Tanh)
        .with_link(LinkKind::Linear, &[0], 1)
        .with_link(LinkKind::Linear, &[1], 2);
    config.links[1].shares = Some(0);
    assert!(matches!(
        config_error(Network::new(&config)),
        ConfigError::SharedWeights { reason: "weight counts differ", .. }
    ));

    let mut config = NetworkConfig::new()
        .with_layer(2, Activation::Linear)
        .with_layer(2, Activation::Tanh)
        .with_link(LinkKind::Linear, &[0], 1)
        .with_link(LinkKind::Quadratic, &[0], 1);
    config.links[1].shares = Some(0);
    assert!(matches!(
        config_error(Network::new(&config)),
        ConfigError::SharedWeights { reason: "link kinds differ", .. }
    ));
}

// =============================================================================
// Training configs
// =============================================================================

#[test]
fn test_train_config_json_defaults() {
    let config = TrainConfig::from_json_str(
        r#"{"method": "lm", "curvature": "hessian", "subsample": {"fraction": 0.25, "decay": 0.5}}"#,
    )
    .unwrap();
    assert_eq!(config.method, "lm");
    assert_eq!(config.line_search, TrainConfig::default().line_search);
    assert_eq!(config.max_epochs, netfit::DEFAULT_MAX_EPOCHS);
    assert_eq!(config.subsample, Some(SubSample { fraction: 0.25, decay: 0.5 }));
}

#[test]
fn test_train_config_rejections() {
    let cases = [
        r#"{"line_search": "armijo"}"#,
        r#"{"loss": "hinge"}"#,
        r#"{"curvature": "fisher"}"#,
        r#"{"loss": "huber", "huber_delta": 0.0}"#,
        r#"{"max_epochs": 0}"#,
        r#"{"error_decay": 1.5}"#,
        r#"{"momentum": -0.1}"#,
        r#"{"lambda_down": 1.0}"#,
        r#"{"restart_every": 0}"#,
        r#"{"cg_iterations": 0}"#,
        r#"{"subsample": {"fraction": 0.0, "decay": 0.5}}"#,
        r#"{"subsample": {"fraction": 0.5, "decay": 2.0}}"#,
    ];
    for json in cases {
        assert!(
            matches!(TrainConfig::from_json_str(json), Err(NetfitError::Config(_))),
            "accepted {}",
            json
        );
    }
}

#[test]
fn test_fit_rejects_mismatched_data() {
    let mut network = Network::new(&NetworkConfig::xor().with_seed(1)).unwrap();
    let config = TrainConfig::default();

    let wide = MemoryDataset::new(3, 1);
    assert!(matches!(
        fit(&mut network, &wide, &config, |_| Control::Continue),
        Err(NetfitError::EmptyDataset)
    ));

    let mut wide = MemoryDataset::new(3, 1);
    wide.push(&[0.0, 1.0, 2.0], &[1.0]).unwrap();
    assert!(matches!(
        fit(&mut network, &wide, &config, |_| Control::Continue),
        Err(NetfitError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_dataset_rejects_ragged_rows() {
    let mut data = MemoryDataset::new(2, 1);
    assert!(data.push(&[1.0], &[0.0]).is_err());
    assert!(MemoryDataset::from_rows(&[vec![0.0, 1.0], vec![1.0]], &[vec![1.0], vec![0.0]]).is_err());
}

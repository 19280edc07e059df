mod common;

use burn::tensor::Tensor;
use common::TestBackend;
use dfa_ode::activation::Saturation;
use dfa_ode::cells::{CellVariant, HybridCell};
use dfa_ode::config::HybridConfig;
use dfa_ode::transition::PredictorKind;
use dfa_ode::{ErrorKind, HybridError};

const THERMOSTAT: &str = r#"{
    "ode_nums": 3,
    "k_in": 2,
    "k_out": 1,
    "k_state": 4,
    "layers": 1,
    "y_mean": [20.0],
    "y_std": [5.0],
    "modes": [
        {"name": "idle", "y_type": "temperature"},
        {"name": "heating", "cell": "no_gate"},
        {"name": "cooling", "cell": "pure"}
    ],
    "decoder_activation": "lecun_tanh",
    "transition_predictors": [{"kind": "classify", "mode": 2}],
    "transition_rules": [
        {"from": 0, "to": 1, "rules": [[0, "<=", 18.0]]},
        {"from": 0, "to": 2, "rules": [[0, "geq", 24.0]]},
        {"from": 1, "to": 0, "rules": [[0, ">=", 21.0]]}
    ]
}"#;

#[test]
fn test_load_config_from_json() {
    let config = HybridConfig::from_json(THERMOSTAT).unwrap();

    assert_eq!(config.ode_nums, 3);
    assert_eq!(config.layers, 1);
    assert_eq!(config.cell_type, "merge");
    assert!(!config.linear_decoder);
    assert_eq!(config.decoder_activation, Saturation::LecunTanh);
    assert_eq!(config.modes[0].y_type, "temperature");
    assert_eq!(config.modes[1].cell, CellVariant::NoGate);
    assert_eq!(config.modes[2].cell, CellVariant::Pure);
    assert_eq!(config.transition_rules.len(), 3);
}

#[test]
fn test_cell_from_json_config() {
    let device = Default::default();
    let config = HybridConfig::from_json(THERMOSTAT).unwrap();
    let cell = HybridCell::<TestBackend>::new(&config, &device).unwrap();

    assert_eq!(cell.registry().constraints(0).len(), 2);
    assert_eq!(cell.registry().constraints(1).len(), 1);
    assert_eq!(
        cell.evaluator().predictor(2).map(|p| p.kind()),
        Some(PredictorKind::Classify)
    );
    assert!(cell.evaluator().predictor(0).is_none());

    let step = cell
        .step(
            None,
            Tensor::ones([3, 2], &device),
            Tensor::ones([3, 1], &device),
            None,
        )
        .unwrap();
    assert_eq!(step.state.dims(), [3, 7]);
    assert_eq!(step.distribution.unwrap().dims(), [3, 3]);
}

#[test]
fn test_unknown_cell_type() {
    let device = Default::default();
    let json = THERMOSTAT.replace(r#""layers": 1,"#, r#""layers": 1, "cell_type": "cde","#);
    let config = HybridConfig::from_json(&json).unwrap();

    let err = HybridCell::<TestBackend>::new(&config, &device).unwrap_err();
    assert_eq!(err, HybridError::UnimplementedCell("cde".into()));
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_unknown_predictor_kind() {
    let device = Default::default();
    let json = THERMOSTAT.replace(r#""kind": "classify""#, r#""kind": "regress""#);
    let config = HybridConfig::from_json(&json).unwrap();

    let err = HybridCell::<TestBackend>::new(&config, &device).unwrap_err();
    assert_eq!(err, HybridError::UnimplementedPredictor("regress".into()));
}

#[test]
fn test_rule_referencing_missing_feature() {
    let device = Default::default();
    let json = THERMOSTAT.replace(r#"[0, "geq", 24.0]"#, r#"[3, "geq", 24.0]"#);
    let config = HybridConfig::from_json(&json).unwrap();

    assert_eq!(
        HybridCell::<TestBackend>::new(&config, &device).unwrap_err(),
        HybridError::FeatureOutOfRange { index: 3, k_out: 1 }
    );
}

#[test]
fn test_malformed_json() {
    let missing_modes = THERMOSTAT.replace(r#"{"name": "idle", "y_type": "temperature"},"#, "");
    assert!(matches!(
        HybridConfig::from_json(&missing_modes),
        Err(HybridError::InvalidConfig(_))
    ));

    let bad_comparator = THERMOSTAT.replace(r#""<=""#, r#""<""#);
    assert!(matches!(
        HybridConfig::from_json(&bad_comparator),
        Err(HybridError::InvalidConfig(_))
    ));
}

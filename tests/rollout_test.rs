mod common;

use burn::tensor::{Tensor, TensorData};
use common::{host, packed, Affine, SetLatent, TestBackend};
use dfa_ode::cells::{HybridCell, ModeDynamics};
use dfa_ode::config::HybridConfig;
use dfa_ode::rnn::HybridRnn;
use dfa_ode::transition::Rule;

fn counter_rnn() -> HybridRnn<TestBackend> {
    let device = Default::default();
    // y grows by dt each step in mode 0 and shrinks by dt in mode 1
    let dynamics: Vec<Box<dyn ModeDynamics<TestBackend>>> = vec![
        Box::new(Affine { scale: 1.0, rate: 1.0, gain: 0.0 }),
        Box::new(Affine { scale: 1.0, rate: -1.0, gain: 0.0 }),
    ];
    let config = HybridConfig::new(2, 1, 1, 1)
        .with_transform(0, 1, vec![Rule::geq(0, 2.5)])
        .with_transform(1, 0, vec![Rule::leq(0, 0.5)]);
    HybridRnn::new(HybridCell::with_dynamics(&config, dynamics, &device).unwrap())
}

#[test]
fn test_rule_driven_oscillation() {
    let device = Default::default();
    let rnn = counter_rnn();

    let input = Tensor::<TestBackend, 3>::zeros([1, 6, 1], &device);
    let rollout = rnn.forward(input, None, None, None).unwrap();

    // y: 1, 2, 3 (-> mode 1), 2, 1, 0 (-> mode 0)
    assert_eq!(host(rollout.outputs.clone()), vec![1.0, 2.0, 3.0, 2.0, 1.0, 0.0]);
    let trace: Vec<usize> = rollout.modes.iter().map(|step| step[0]).collect();
    assert_eq!(trace, vec![0, 0, 1, 1, 1, 0]);
    // switched on the last step, so the dwell time restarts
    assert_eq!(host(rollout.state), vec![0.0, 0.0, 0.0, 0.0]);
}

#[test]
fn test_forced_mode_trace() {
    let device = Default::default();
    let rnn = counter_rnn();

    let input = Tensor::<TestBackend, 3>::zeros([2, 4, 1], &device);
    let forced = vec![vec![0, 1], vec![1, 1], vec![1, 0], vec![0, 0]];
    let rollout = rnn.forward(input, None, None, Some(&forced)).unwrap();

    assert_eq!(rollout.modes, forced);
    // each step advances with the mode imposed by the previous one
    // sample 0 modes before each step: 0, 0, 1, 1 -> y = 1, 2, 1, 0
    // sample 1 modes before each step: 0, 1, 1, 0 -> y = 1, 0, -1, 0
    assert_eq!(
        host(rollout.outputs),
        vec![1.0, 2.0, 1.0, 0.0, 1.0, 0.0, -1.0, 0.0]
    );
    assert!(rollout.diagnostics.iter().all(|d| d.stop_times.is_none()));
}

#[test]
fn test_rollout_continues_from_state() {
    let device = Default::default();
    let rnn = counter_rnn();

    let input = Tensor::<TestBackend, 3>::zeros([1, 4, 1], &device);
    let full = rnn.forward(input, None, None, None).unwrap();

    let first = rnn
        .forward(Tensor::zeros([1, 2, 1], &device), None, None, None)
        .unwrap();
    let second = rnn
        .forward(Tensor::zeros([1, 2, 1], &device), Some(first.state), None, None)
        .unwrap();

    assert_eq!(host(second.state), host(full.state));
    assert_eq!(second.modes, full.modes[2..].to_vec());
}

#[test]
fn test_rollout_timespans() {
    let device = Default::default();
    let dynamics: Vec<Box<dyn ModeDynamics<TestBackend>>> =
        vec![Box::new(SetLatent(1.0)), Box::new(SetLatent(1.0))];
    let cell = HybridCell::with_dynamics(&HybridConfig::new(2, 1, 1, 1), dynamics, &device).unwrap();
    let rnn = HybridRnn::new(cell);

    let timespans = Tensor::<TestBackend, 2>::from_data(
        TensorData::new(vec![0.5f32, 0.25, 1.0, 2.0], [2, 2]),
        &device,
    );
    let rollout = rnn
        .forward(
            Tensor::zeros([2, 2, 1], &device),
            Some(packed(&[vec![0.0, 0.0, 1.0, 0.0], vec![0.0, 0.0, 0.0, 0.0]])),
            Some(timespans),
            None,
        )
        .unwrap();

    let dwell = host(rnn.cell().layout().dwell(rollout.state));
    assert_eq!(dwell, vec![1.75, 3.0]);
}

#[test]
fn test_rollout_rejects_bad_timespans() {
    let device = Default::default();
    let rnn = counter_rnn();

    let err = rnn
        .forward(
            Tensor::zeros([2, 3, 1], &device),
            None,
            Some(Tensor::ones([2, 2], &device)),
            None,
        )
        .unwrap_err();
    assert!(matches!(err, dfa_ode::HybridError::ShapeMismatch { what: "timespans", .. }));
}

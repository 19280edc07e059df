//! Deterministic dynamics and predictors shared by the integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use burn::backend::NdArray;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use dfa_ode::cells::ModeDynamics;
use dfa_ode::transition::{ModeClassifier, StopTimePredictor};

pub type TestBackend = NdArray<f32>;

/// Writes a fixed value into every latent column.
pub struct SetLatent(pub f32);

impl<B: Backend> ModeDynamics<B> for SetLatent {
    fn advance(&self, latent: Tensor<B, 2>, _input: Tensor<B, 2>, _dt: Tensor<B, 2>) -> Tensor<B, 2> {
        latent.zeros_like().add_scalar(self.0)
    }
}

/// `latent * scale + dt * rate + sum(input) * gain`, elementwise.
pub struct Affine {
    pub scale: f32,
    pub rate: f32,
    pub gain: f32,
}

impl<B: Backend> ModeDynamics<B> for Affine {
    fn advance(&self, latent: Tensor<B, 2>, input: Tensor<B, 2>, dt: Tensor<B, 2>) -> Tensor<B, 2> {
        let [n, width] = latent.dims();
        let drive = input.sum_dim(1).mul_scalar(self.gain).expand([n, width]);
        latent.mul_scalar(self.scale) + dt.expand([n, width]).mul_scalar(self.rate) + drive
    }
}

/// Predicts the same stop time for every row.
pub struct FixedStopTime(pub f32);

impl<B: Backend> StopTimePredictor<B> for FixedStopTime {
    fn predict(&self, latent: Tensor<B, 2>, _input: Tensor<B, 2>) -> Tensor<B, 2> {
        let [n, _] = latent.dims();
        Tensor::full([n, 1], self.0, &latent.device())
    }
}

/// Returns the same probability row for every sample.
pub struct FixedClassifier(pub Vec<f32>);

impl<B: Backend> ModeClassifier<B> for FixedClassifier {
    fn predict(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let [n, _] = features.dims();
        let classes = self.0.len();
        let data: Vec<f32> = (0..n).flat_map(|_| self.0.iter().copied()).collect();
        Tensor::from_data(TensorData::new(data, [n, classes]), &features.device())
    }
}

/// Packed state rows `[latent..., dwell, mode]` from host values.
pub fn packed(rows: &[Vec<f32>]) -> Tensor<TestBackend, 2> {
    let device = Default::default();
    let width = rows.first().map(Vec::len).unwrap_or(0);
    let data: Vec<f32> = rows.iter().flatten().copied().collect();
    Tensor::from_data(TensorData::new(data, [rows.len(), width]), &device)
}

pub fn host<const D: usize>(tensor: Tensor<TestBackend, D>) -> Vec<f32> {
    tensor.into_data().iter::<f32>().collect()
}

/// Stop-time predictor that records the hidden rows it was given.
pub struct RecordingStopTime {
    pub seen: Rc<RefCell<Vec<Vec<f32>>>>,
    pub stop: f32,
}

impl<B: Backend> StopTimePredictor<B> for RecordingStopTime {
    fn predict(&self, hidden: Tensor<B, 2>, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let [n, width] = hidden.dims();
        let values: Vec<f32> = hidden.clone().into_data().iter::<f32>().collect();
        self.seen
            .borrow_mut()
            .extend(values.chunks(width.max(1)).map(<[f32]>::to_vec));
        assert_eq!(input.dims()[0], n);
        Tensor::full([n, 1], self.stop, &hidden.device())
    }
}

/// Classifier that records its feature rows and always picks mode 0.
pub struct RecordingClassifier {
    pub seen: Rc<RefCell<Vec<Vec<f32>>>>,
    pub classes: usize,
}

impl<B: Backend> ModeClassifier<B> for RecordingClassifier {
    fn predict(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let [n, width] = features.dims();
        let values: Vec<f32> = features.clone().into_data().iter::<f32>().collect();
        self.seen
            .borrow_mut()
            .extend(values.chunks(width.max(1)).map(<[f32]>::to_vec));
        let mut probs = vec![0.0f32; n * self.classes];
        for row in probs.chunks_mut(self.classes) {
            row[0] = 1.0;
        }
        Tensor::from_data(TensorData::new(probs, [n, self.classes]), &features.device())
    }
}

//! Learned transition predictors
//!
//! A mode may hand its switching decision to a learned model instead of the
//! interval rules:
//!
//! | Kind | Input | Output | Decision |
//! |------|-------|--------|----------|
//! | `predict` | `(hidden, input)` | `[n, 1]` stop time | switch to the successor once dwell time reaches it |
//! | `classify` | `concat(hidden, dwell)` | `[n, ode_nums]` probabilities | switch to the argmax mode |
//!
//! [`StopTimeNet`] and [`ModeClassifierNet`] are the built-in networks; any type
//! implementing the traits can be registered instead.

use std::fmt;
use std::str::FromStr;

use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::activation::softplus;
use crate::error::HybridError;

/// Regression predictor of the cumulative time at which a mode ends.
pub trait StopTimePredictor<B: Backend> {
    /// `[n, k_state]`, `[n, k_in]` -> `[n, 1]`
    fn predict(&self, hidden: Tensor<B, 2>, input: Tensor<B, 2>) -> Tensor<B, 2>;
}

/// Classifier over the next mode.
pub trait ModeClassifier<B: Backend> {
    /// `[n, k_state + 1]` -> `[n, ode_nums]` probability rows
    fn predict(&self, features: Tensor<B, 2>) -> Tensor<B, 2>;
}

/// Predictor kinds accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictorKind {
    Predict,
    Classify,
}

impl FromStr for PredictorKind {
    type Err = HybridError;

    fn from_str(kind: &str) -> Result<Self, Self::Err> {
        match kind {
            "predict" => Ok(PredictorKind::Predict),
            "classify" => Ok(PredictorKind::Classify),
            other => Err(HybridError::UnimplementedPredictor(other.to_string())),
        }
    }
}

/// The learned predictor owning one mode's transitions.
pub enum TransitionPredictor<B: Backend> {
    Regression(Box<dyn StopTimePredictor<B>>),
    Classification(Box<dyn ModeClassifier<B>>),
}

impl<B: Backend> TransitionPredictor<B> {
    pub fn kind(&self) -> PredictorKind {
        match self {
            TransitionPredictor::Regression(_) => PredictorKind::Predict,
            TransitionPredictor::Classification(_) => PredictorKind::Classify,
        }
    }
}

impl<B: Backend> fmt::Debug for TransitionPredictor<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TransitionPredictor").field(&self.kind()).finish()
    }
}

/// `concat(h, input) -> hidden -> tanh -> 1 -> softplus`
#[derive(Module, Debug)]
pub struct StopTimeNet<B: Backend> {
    hidden: Linear<B>,
    output: Linear<B>,
}

impl<B: Backend> StopTimeNet<B> {
    pub fn new(input_size: usize, hidden_size: usize, device: &B::Device) -> Self {
        Self {
            hidden: LinearConfig::new(input_size, hidden_size)
                .with_bias(true)
                .init(device),
            output: LinearConfig::new(hidden_size, 1)
                .with_bias(true)
                .init(device),
        }
    }
}

impl<B: Backend> StopTimePredictor<B> for StopTimeNet<B> {
    fn predict(&self, hidden: Tensor<B, 2>, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = Tensor::cat(vec![hidden, input], 1);
        let h = self.hidden.forward(x).tanh();
        softplus(self.output.forward(h))
    }
}

/// `features -> hidden -> tanh -> classes -> softmax`
#[derive(Module, Debug)]
pub struct ModeClassifierNet<B: Backend> {
    hidden: Linear<B>,
    output: Linear<B>,
}

impl<B: Backend> ModeClassifierNet<B> {
    pub fn new(input_size: usize, hidden_size: usize, classes: usize, device: &B::Device) -> Self {
        Self {
            hidden: LinearConfig::new(input_size, hidden_size)
                .with_bias(true)
                .init(device),
            output: LinearConfig::new(hidden_size, classes)
                .with_bias(true)
                .init(device),
        }
    }
}

impl<B: Backend> ModeClassifier<B> for ModeClassifierNet<B> {
    fn predict(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let h = self.hidden.forward(features).tanh();
        activation::softmax(self.output.forward(h), 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_predictor_kind_parsing() {
        assert_eq!("predict".parse::<PredictorKind>(), Ok(PredictorKind::Predict));
        assert_eq!("classify".parse::<PredictorKind>(), Ok(PredictorKind::Classify));
        assert_eq!(
            "regress".parse::<PredictorKind>(),
            Err(HybridError::UnimplementedPredictor("regress".into()))
        );
    }

    #[test]
    fn test_stop_time_net_non_negative() {
        let device = Default::default();
        let net = StopTimeNet::<TestBackend>::new(6 + 2, 4, &device);

        let hidden = Tensor::<TestBackend, 2>::random(
            [5, 6],
            burn::tensor::Distribution::Uniform(-3.0, 3.0),
            &device,
        );
        let input = Tensor::<TestBackend, 2>::ones([5, 2], &device);
        let stop = net.predict(hidden, input);

        assert_eq!(stop.dims(), [5, 1]);
        assert!(stop.min().into_scalar() >= 0.0);
    }

    #[test]
    fn test_classifier_rows_sum_to_one() {
        let device = Default::default();
        let net = ModeClassifierNet::<TestBackend>::new(7, 4, 3, &device);

        let features = Tensor::<TestBackend, 2>::random(
            [4, 7],
            burn::tensor::Distribution::Uniform(-1.0, 1.0),
            &device,
        );
        let probs = net.predict(features);
        assert_eq!(probs.dims(), [4, 3]);

        let sums: Vec<f32> = probs.sum_dim(1).into_data().iter::<f32>().collect();
        for sum in sums {
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_predictor_debug_names_kind() {
        let device = Default::default();
        let predictor = TransitionPredictor::<TestBackend>::Classification(Box::new(
            ModeClassifierNet::new(3, 2, 2, &device),
        ));
        assert_eq!(predictor.kind(), PredictorKind::Classify);
        assert!(format!("{:?}", predictor).contains("Classify"));
    }
}

//! Output decoders and the normalization statistics used to read them
//!
//! A decoder maps the hidden ODE state of a mode cell to the observable
//! output vector. Outputs live in normalized space; [`Normalization`] maps
//! them back to physical units, which is what transition rules compare against.

use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

use crate::activation::Saturation;
use crate::error::{HybridError, Result};

/// State-to-output decoder.
///
/// Either a single linear projection `k_state -> k_out`, or a two-layer
/// projection `k_state -> 2 * k_state -> k_out` with a saturating activation
/// in between.
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    #[module(skip)]
    state_size: usize,
    #[module(skip)]
    output_size: usize,
    /// Saturation code: 0=Tanh, 1=LecunTanh
    #[module(skip)]
    activation: u8,
    input: Linear<B>,
    output: Option<Linear<B>>,
}

impl<B: Backend> Decoder<B> {
    /// Direct linear projection.
    pub fn linear(state_size: usize, output_size: usize, device: &B::Device) -> Self {
        Self {
            state_size,
            output_size,
            activation: Saturation::default().code(),
            input: LinearConfig::new(state_size, output_size)
                .with_bias(true)
                .init(device),
            output: None,
        }
    }

    /// Two-layer projection through a hidden layer of width `2 * state_size`.
    pub fn two_layer(
        state_size: usize,
        output_size: usize,
        activation: Saturation,
        device: &B::Device,
    ) -> Self {
        let hidden = 2 * state_size;
        Self {
            state_size,
            output_size,
            activation: activation.code(),
            input: LinearConfig::new(state_size, hidden)
                .with_bias(true)
                .init(device),
            output: Some(
                LinearConfig::new(hidden, output_size)
                    .with_bias(true)
                    .init(device),
            ),
        }
    }

    pub fn activation(&self) -> Saturation {
        Saturation::from_code(self.activation)
    }

    pub fn is_linear(&self) -> bool {
        self.output.is_none()
    }

    pub fn state_size(&self) -> usize {
        self.state_size
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    /// Decode `[batch, state_size]` hidden states into `[batch, output_size]` outputs.
    pub fn forward(&self, hidden: Tensor<B, 2>) -> Tensor<B, 2> {
        let projected = self.input.forward(hidden);
        match self.output {
            Some(ref output) => output.forward(self.activation().forward(projected)),
            None => projected,
        }
    }
}

/// Fixed output statistics. Read-only once constructed.
#[derive(Debug, Clone)]
pub struct Normalization<B: Backend> {
    mean: Tensor<B, 1>,
    std: Tensor<B, 1>,
}

impl<B: Backend> Normalization<B> {
    pub fn new(mean: &[f32], std: &[f32], device: &B::Device) -> Result<Self> {
        if mean.len() != std.len() {
            return Err(HybridError::InvalidConfig(format!(
                "y_mean has {} entries but y_std has {}",
                mean.len(),
                std.len()
            )));
        }
        Ok(Self {
            mean: Tensor::from_data(TensorData::new(mean.to_vec(), [mean.len()]), device),
            std: Tensor::from_data(TensorData::new(std.to_vec(), [std.len()]), device),
        })
    }

    /// Zero mean, unit std.
    pub fn identity(size: usize, device: &B::Device) -> Self {
        Self {
            mean: Tensor::zeros([size], device),
            std: Tensor::ones([size], device),
        }
    }

    pub fn size(&self) -> usize {
        self.mean.dims()[0]
    }

    /// Map normalized outputs back to physical units: `y * std + mean`.
    pub fn denormalize(&self, y: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch, size] = y.dims();
        let std = self.std.clone().unsqueeze::<2>().expand([batch, size]);
        let mean = self.mean.clone().unsqueeze::<2>().expand([batch, size]);
        y.mul(std).add(mean)
    }
}

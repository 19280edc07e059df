//! Merge ODE cell
//!
//! The `merge` cell family advances the hidden state of one mode with a
//! closed-form continuous-time update, then merges the decoded output back in
//! front of the new hidden state so the latent block reads `[y, h]`.
//!
//! Three update variants are supported:
//! - **Gated**: interpolation between two feedforward heads, `h = tanh(ff1) * (1 - σ) + tanh(ff2) * σ`
//! - **Pure**: direct ODE solution, `h = a - a * exp(-dt * (|w_τ| + |ff1|)) * ff1`
//! - **NoGate**: `h = tanh(ff1) + tanh(ff2) * σ`
//!
//! where `σ = sigmoid(time_a * dt + time_b)` and `dt` is the per-sample time delta.

use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use super::decoder::Decoder;
use super::ModeDynamics;
use crate::activation::lecun_tanh;

/// Update rule used by a merge cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellVariant {
    /// Gated interpolation between two heads
    #[default]
    Gated,
    /// Pure ODE solution without gating
    Pure,
    /// Additive gate instead of interpolation
    NoGate,
}

impl CellVariant {
    pub(crate) fn code(self) -> u8 {
        match self {
            CellVariant::Gated => 0,
            CellVariant::Pure => 1,
            CellVariant::NoGate => 2,
        }
    }

    pub(crate) fn from_code(code: u8) -> Self {
        match code {
            1 => CellVariant::Pure,
            2 => CellVariant::NoGate,
            _ => CellVariant::Gated,
        }
    }
}

/// Heads of the gated and no-gate variants
#[derive(Module, Debug)]
pub struct GatedHeads<B: Backend> {
    ff2: Linear<B>,
    time_a: Linear<B>,
    time_b: Linear<B>,
}

/// Heads of the pure variant
#[derive(Module, Debug)]
pub struct PureHeads<B: Backend> {
    w_tau: Linear<B>,
    a: Linear<B>,
}

/// Builder for [`MergeCell`].
#[derive(Debug, Clone, PartialEq)]
pub struct MergeCellConfig {
    input_size: usize,
    state_size: usize,
    backbone_units: usize,
    backbone_layers: usize,
    variant: CellVariant,
}

impl MergeCellConfig {
    pub fn new(input_size: usize, state_size: usize) -> Self {
        Self {
            input_size,
            state_size,
            backbone_units: state_size,
            backbone_layers: 0,
            variant: CellVariant::default(),
        }
    }

    /// Insert `layers` dense layers of width `units` (LeCun tanh) before the heads.
    pub fn with_backbone(mut self, units: usize, layers: usize) -> Self {
        self.backbone_units = units;
        self.backbone_layers = layers;
        self
    }

    pub fn with_variant(mut self, variant: CellVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Build the cell around `decoder`, which fixes the output width.
    pub fn init<B: Backend>(&self, decoder: Decoder<B>, device: &B::Device) -> MergeCell<B> {
        let cat_size = self.input_size + self.state_size;
        let dense = |d_in: usize, d_out: usize| -> Linear<B> {
            LinearConfig::new(d_in, d_out).with_bias(true).init(device)
        };

        let backbone: Vec<Linear<B>> = (0..self.backbone_layers)
            .map(|layer| {
                let d_in = if layer == 0 { cat_size } else { self.backbone_units };
                dense(d_in, self.backbone_units)
            })
            .collect();
        let head_input = if self.backbone_layers > 0 {
            self.backbone_units
        } else {
            cat_size
        };

        let (gated, pure) = match self.variant {
            CellVariant::Pure => (
                None,
                Some(PureHeads {
                    w_tau: LinearConfig::new(1, self.state_size)
                        .with_bias(false)
                        .init(device),
                    a: LinearConfig::new(1, self.state_size)
                        .with_bias(false)
                        .init(device),
                }),
            ),
            CellVariant::Gated | CellVariant::NoGate => (
                Some(GatedHeads {
                    ff2: dense(head_input, self.state_size),
                    time_a: dense(head_input, self.state_size),
                    time_b: dense(head_input, self.state_size),
                }),
                None,
            ),
        };

        MergeCell {
            input_size: self.input_size,
            state_size: self.state_size,
            output_size: decoder.output_size(),
            variant: self.variant.code(),
            backbone,
            ff1: dense(head_input, self.state_size),
            gated,
            pure,
            decoder,
        }
    }
}

/// One mode's ODE-advance unit.
///
/// Consumes latent rows `[batch, k_out + k_state]` and returns rows of the same
/// width with the decoded output refreshed.
#[derive(Module, Debug)]
pub struct MergeCell<B: Backend> {
    #[module(skip)]
    input_size: usize,
    #[module(skip)]
    state_size: usize,
    #[module(skip)]
    output_size: usize,
    /// Variant code: 0=Gated, 1=Pure, 2=NoGate
    #[module(skip)]
    variant: u8,
    backbone: Vec<Linear<B>>,
    ff1: Linear<B>,
    gated: Option<GatedHeads<B>>,
    pure: Option<PureHeads<B>>,
    decoder: Decoder<B>,
}

impl<B: Backend> MergeCell<B> {
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn state_size(&self) -> usize {
        self.state_size
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn variant(&self) -> CellVariant {
        CellVariant::from_code(self.variant)
    }

    pub fn backbone_layers(&self) -> usize {
        self.backbone.len()
    }

    pub fn decoder(&self) -> &Decoder<B> {
        &self.decoder
    }

    /// Closed-form hidden-state update for `[batch, state_size]` hidden rows.
    pub fn forward(&self, input: Tensor<B, 2>, hidden: Tensor<B, 2>, dt: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch, _] = hidden.dims();
        let device = hidden.device();

        let mut x = Tensor::cat(vec![input, hidden], 1);
        for layer in &self.backbone {
            x = lecun_tanh(layer.forward(x));
        }

        let ff1 = self.ff1.forward(x.clone());
        let dt = dt.expand([batch, self.state_size]);

        match (&self.pure, &self.gated) {
            (Some(pure), _) => {
                let ones = Tensor::<B, 2>::ones([batch, 1], &device);
                let w_tau = pure.w_tau.forward(ones.clone());
                let a = pure.a.forward(ones);

                let decay = (dt * (w_tau.abs() + ff1.clone().abs())).neg().exp();
                a.clone() - a * decay * ff1
            }
            (None, Some(gated)) => {
                let ff1 = ff1.tanh();
                let ff2 = gated.ff2.forward(x.clone()).tanh();
                let time_a = gated.time_a.forward(x.clone());
                let time_b = gated.time_b.forward(x);
                let t_interp = activation::sigmoid(time_a * dt + time_b);

                if self.variant() == CellVariant::NoGate {
                    ff1 + t_interp * ff2
                } else {
                    ff1 * t_interp.clone().neg().add_scalar(1.0) + t_interp * ff2
                }
            }
            (None, None) => ff1.tanh(),
        }
    }
}

impl<B: Backend> ModeDynamics<B> for MergeCell<B> {
    fn advance(&self, latent: Tensor<B, 2>, input: Tensor<B, 2>, dt: Tensor<B, 2>) -> Tensor<B, 2> {
        let hidden = latent.narrow(1, self.output_size, self.state_size);
        let hidden = self.forward(input, hidden, dt);
        let output = self.decoder.forward(hidden.clone());
        Tensor::cat(vec![output, hidden], 1)
    }
}

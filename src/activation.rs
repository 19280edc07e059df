//! Activation functions used by the mode cells, decoders and predictors
//!
//! The LeCun-scaled tanh lives here; softplus comes from burn and is wrapped
//! with the unit sharpness the stop-time head uses.

use burn::tensor::{activation, backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

/// LeCun's tanh: `f(x) = 1.7159 * tanh(0.666 * x)`.
///
/// Approximately the identity near the origin, saturating at ±1.7159.
///
/// # Example
///
/// ```rust
/// use burn::backend::NdArray;
/// use burn::tensor::Tensor;
/// use dfa_ode::activation::lecun_tanh;
///
/// type Backend = NdArray<f32>;
/// let device = Default::default();
///
/// let x = Tensor::<Backend, 1>::from_floats([0.0, 1.0, -1.0], &device);
/// let y = lecun_tanh(x);
/// ```
pub fn lecun_tanh<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    (x * 0.666f32).tanh() * 1.7159f32
}

/// Softplus `ln(1 + e^x)`, used to keep predicted stop times non-negative.
pub fn softplus<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    activation::softplus(x, 1.0)
}

/// Bounded nonlinearity placed between the two layers of a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Saturation {
    #[default]
    Tanh,
    LecunTanh,
}

impl Saturation {
    pub fn forward<B: Backend, const D: usize>(self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Saturation::Tanh => x.tanh(),
            Saturation::LecunTanh => lecun_tanh(x),
        }
    }

    /// Compact tag stored on modules: 0=Tanh, 1=LecunTanh
    pub(crate) fn code(self) -> u8 {
        match self {
            Saturation::Tanh => 0,
            Saturation::LecunTanh => 1,
        }
    }

    pub(crate) fn from_code(code: u8) -> Self {
        match code {
            1 => Saturation::LecunTanh,
            _ => Saturation::Tanh,
        }
    }

    /// Upper bound of the activation's magnitude.
    pub fn bound(self) -> f32 {
        match self {
            Saturation::Tanh => 1.0,
            Saturation::LecunTanh => 1.7159,
        }
    }
}

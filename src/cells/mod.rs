//! # Hybrid Cells
//!
//! Single-timestep building blocks. The [`HybridCell`] is the step engine: it
//! owns one ODE-advance unit per mode and a [`TransitionEvaluator`] that
//! decides mode switches. Sequences are handled by [`crate::rnn::HybridRnn`].
//!
//! | Type | Description |
//! |------|-------------|
//! | [`HybridCell`] | Step engine: per-mode advance, dwell time, transitions |
//! | [`MergeCell`] | Closed-form ODE cell, the `merge` family |
//! | [`Decoder`] | Hidden state to observable output |
//! | [`PackedLayout`] | Column layout of the packed state |
//!
//! ## Packed State
//!
//! Every step consumes and returns a `[batch, k_out + k_state + 2]` tensor:
//!
//! ```text
//! | y (k_out) | h (k_state) | dwell_time | mode |
//! |<------- latent -------->|
//! ```
//!
//! ## Custom Dynamics
//!
//! Any type implementing [`ModeDynamics`] can drive a mode:
//!
//! ```ignore
//! struct Drift;
//!
//! impl<B: Backend> ModeDynamics<B> for Drift {
//!     fn advance(&self, latent: Tensor<B, 2>, _input: Tensor<B, 2>, dt: Tensor<B, 2>) -> Tensor<B, 2> {
//!         let [n, width] = latent.dims();
//!         latent + dt.expand([n, width])
//!     }
//! }
//!
//! let cell = HybridCell::with_dynamics(&config, vec![Box::new(Drift), Box::new(Drift)], &device)?;
//! ```
//!
//! [`TransitionEvaluator`]: crate::transition::TransitionEvaluator

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

pub mod decoder;
pub mod hybrid_cell;
pub mod merge_cell;
pub mod packed_state;

pub use decoder::{Decoder, Normalization};
pub use hybrid_cell::{HybridCell, StepOutput};
pub use merge_cell::{CellVariant, MergeCell, MergeCellConfig};
pub use packed_state::{partition_by_mode, PackedLayout};

/// Per-mode ODE-advance unit.
///
/// Receives only the rows currently in the unit's mode and must return the
/// same number of rows, each `latent` wide. Implementations must be pure
/// functions of their inputs.
pub trait ModeDynamics<B: Backend> {
    /// `latent [n, k_out + k_state]`, `input [n, k_in]`, `dt [n, 1]` -> `[n, k_out + k_state]`
    fn advance(&self, latent: Tensor<B, 2>, input: Tensor<B, 2>, dt: Tensor<B, 2>) -> Tensor<B, 2>;
}

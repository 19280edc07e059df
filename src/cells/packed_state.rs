//! Packed state layout and host-side batch helpers
//!
//! A packed state row is `[latent (k_out + k_state), dwell_time, mode_index]`.
//! The latent block itself starts with the `k_out` decoded outputs written by
//! the mode cell, followed by the `k_state` hidden ODE state.

use burn::tensor::backend::Backend;
use burn::tensor::{Bool, Int, Tensor, TensorData};

use crate::error::{HybridError, Result};

/// Column layout of a packed hybrid state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedLayout {
    k_out: usize,
    k_state: usize,
}

impl PackedLayout {
    pub fn new(k_out: usize, k_state: usize) -> Self {
        Self { k_out, k_state }
    }

    pub fn k_out(&self) -> usize {
        self.k_out
    }

    pub fn k_state(&self) -> usize {
        self.k_state
    }

    /// Width of the continuous latent block
    pub fn latent_size(&self) -> usize {
        self.k_out + self.k_state
    }

    /// Full packed width: latent + dwell + mode
    pub fn width(&self) -> usize {
        self.latent_size() + 2
    }

    /// Step-zero state: zero latent, zero dwell time, mode 0.
    pub fn zeros<B: Backend>(&self, batch: usize, device: &B::Device) -> Tensor<B, 2> {
        Tensor::zeros([batch, self.width()], device)
    }

    pub fn latent<B: Backend>(&self, state: Tensor<B, 2>) -> Tensor<B, 2> {
        state.narrow(1, 0, self.latent_size())
    }

    /// Decoded outputs stored at the front of a latent block.
    pub fn output<B: Backend>(&self, latent: Tensor<B, 2>) -> Tensor<B, 2> {
        latent.narrow(1, 0, self.k_out)
    }

    /// Hidden ODE state stored behind the outputs of a latent block.
    pub fn hidden<B: Backend>(&self, latent: Tensor<B, 2>) -> Tensor<B, 2> {
        latent.narrow(1, self.k_out, self.k_state)
    }

    pub fn dwell<B: Backend>(&self, state: Tensor<B, 2>) -> Tensor<B, 2> {
        state.narrow(1, self.latent_size(), 1)
    }

    pub fn mode_column<B: Backend>(&self, state: Tensor<B, 2>) -> Tensor<B, 2> {
        state.narrow(1, self.latent_size() + 1, 1)
    }

    pub fn pack<B: Backend>(
        &self,
        latent: Tensor<B, 2>,
        dwell: Tensor<B, 2>,
        modes: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        Tensor::cat(vec![latent, dwell, modes], 1)
    }

    /// Verify that `state` is a packed state for `batch` samples.
    pub fn check<B: Backend>(&self, state: &Tensor<B, 2>, batch: usize) -> Result<()> {
        let dims = state.dims();
        if dims != [batch, self.width()] {
            return Err(HybridError::shape(
                "packed state",
                &[batch, self.width()],
                &dims,
            ));
        }
        Ok(())
    }

    /// Read the mode column back to the host, rejecting values that are not
    /// integers in `[0, ode_nums)`.
    pub fn modes<B: Backend>(&self, state: &Tensor<B, 2>, ode_nums: usize) -> Result<Vec<usize>> {
        let column = to_host(self.mode_column(state.clone()));
        column
            .into_iter()
            .enumerate()
            .map(|(row, value)| {
                let valid = value.is_finite()
                    && value >= 0.0
                    && value.fract() == 0.0
                    && (value as usize) < ode_nums;
                if valid {
                    Ok(value as usize)
                } else {
                    Err(HybridError::InvalidModeValue { row, value })
                }
            })
            .collect()
    }
}

/// Group row indices by mode. Entry `m` lists, in batch order, the rows in mode `m`.
pub fn partition_by_mode(modes: &[usize], ode_nums: usize) -> Vec<Vec<usize>> {
    let mut partitions = vec![Vec::new(); ode_nums];
    for (row, &mode) in modes.iter().enumerate() {
        if let Some(rows) = partitions.get_mut(mode) {
            rows.push(row);
        }
    }
    partitions
}

pub(crate) fn index_tensor<B: Backend>(rows: &[usize], device: &B::Device) -> Tensor<B, 1, Int> {
    let data: Vec<i64> = rows.iter().map(|&row| row as i64).collect();
    Tensor::from_data(TensorData::new(data, [rows.len()]), device)
}

/// Modes as a `[batch, 1]` float column ready for packing.
pub(crate) fn mode_tensor<B: Backend>(modes: &[usize], device: &B::Device) -> Tensor<B, 2> {
    let data: Vec<f32> = modes.iter().map(|&mode| mode as f32).collect();
    Tensor::from_data(TensorData::new(data, [modes.len(), 1]), device)
}

/// `[batch, 1]` boolean column, true where `flags` is set.
pub(crate) fn mask_tensor<B: Backend>(flags: &[bool], device: &B::Device) -> Tensor<B, 2, Bool> {
    let data: Vec<i64> = flags.iter().map(|&flag| i64::from(flag)).collect();
    Tensor::<B, 2, Int>::from_data(TensorData::new(data, [flags.len(), 1]), device).equal_elem(1)
}

pub(crate) fn to_host<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor.into_data().iter::<f32>().collect()
}

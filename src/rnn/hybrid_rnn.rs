//! Hybrid RNN Layer
//!
//! Threads a [`HybridCell`] over whole sequences, collecting the decoded
//! outputs, the discrete mode trace and the per-step transition diagnostics.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::cells::HybridCell;
use crate::error::{HybridError, Result};
use crate::transition::TransitionDiagnostics;

/// Result of rolling a hybrid cell over a sequence.
#[derive(Debug, Clone)]
pub struct Rollout<B: Backend> {
    /// `[batch, seq, k_out]`, or `[batch, 1, k_out]` when only the last step is returned
    pub outputs: Tensor<B, 3>,
    /// Packed state after the last step
    pub state: Tensor<B, 2>,
    /// `modes[t][i]`: mode of sample `i` after step `t`
    pub modes: Vec<Vec<usize>>,
    /// Transition diagnostics of every step
    pub diagnostics: Vec<TransitionDiagnostics>,
}

/// Sequence layer over a [`HybridCell`].
#[derive(Debug)]
pub struct HybridRnn<B: Backend> {
    cell: HybridCell<B>,
    batch_first: bool,
    return_sequences: bool,
}

impl<B: Backend> HybridRnn<B> {
    pub fn new(cell: HybridCell<B>) -> Self {
        Self {
            cell,
            batch_first: true,
            return_sequences: true,
        }
    }

    /// Set whether input is batch-first (default: true)
    pub fn with_batch_first(mut self, batch_first: bool) -> Self {
        self.batch_first = batch_first;
        self
    }

    /// Set whether to return full sequences (default: true)
    pub fn with_return_sequences(mut self, return_sequences: bool) -> Self {
        self.return_sequences = return_sequences;
        self
    }

    pub fn cell(&self) -> &HybridCell<B> {
        &self.cell
    }

    pub fn into_cell(self) -> HybridCell<B> {
        self.cell
    }

    /// Roll the cell over a sequence.
    ///
    /// # Arguments
    /// * `input` - `[batch, seq, k_in]` (or `[seq, batch, k_in]` when not batch-first)
    /// * `state` - Optional initial packed state
    /// * `timespans` - Optional `[batch, seq]` time deltas, ones when omitted
    /// * `forced_modes` - Optional mode sequence, `forced_modes[t][i]` is imposed on
    ///   sample `i` at step `t`
    pub fn forward(
        &self,
        input: Tensor<B, 3>,
        state: Option<Tensor<B, 2>>,
        timespans: Option<Tensor<B, 2>>,
        forced_modes: Option<&[Vec<usize>]>,
    ) -> Result<Rollout<B>> {
        let device = input.device();
        let input = if self.batch_first {
            input
        } else {
            input.swap_dims(0, 1)
        };
        let [batch_size, seq_len, _] = input.dims();

        let timespans =
            timespans.unwrap_or_else(|| Tensor::<B, 2>::ones([batch_size, seq_len], &device));
        if timespans.dims() != [batch_size, seq_len] {
            return Err(HybridError::shape(
                "timespans",
                &[batch_size, seq_len],
                &timespans.dims(),
            ));
        }
        if let Some(forced) = forced_modes {
            if forced.len() != seq_len {
                return Err(HybridError::shape("forced mode sequence", &[seq_len], &[forced.len()]));
            }
        }

        let mut current_state = state;
        let mut outputs: Vec<Tensor<B, 2>> = Vec::with_capacity(seq_len);
        let mut modes = Vec::with_capacity(seq_len);
        let mut diagnostics = Vec::with_capacity(seq_len);

        for t in 0..seq_len {
            let step_input: Tensor<B, 2> = input.clone().narrow(1, t, 1).squeeze(1);
            let step_time = timespans.clone().narrow(1, t, 1);
            let forced = forced_modes.map(|forced| forced[t].as_slice());

            let step = self.cell.step(current_state, step_input, step_time, forced)?;
            current_state = Some(step.state);

            if self.return_sequences || t + 1 == seq_len {
                outputs.push(step.output);
            }
            modes.push(step.modes);
            diagnostics.push(step.diagnostics);
        }

        let state = match current_state {
            Some(state) => state,
            None => self.cell.layout().zeros(batch_size, &device),
        };
        let outputs = if outputs.is_empty() {
            Tensor::zeros([batch_size, 0, self.cell.layout().k_out()], &device)
        } else {
            Tensor::stack(outputs, 1)
        };

        tracing::debug!(
            batch = batch_size,
            steps = seq_len,
            "hybrid rollout finished"
        );

        Ok(Rollout {
            outputs,
            state,
            modes,
            diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HybridConfig;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn build() -> HybridRnn<TestBackend> {
        let device = Default::default();
        let config = HybridConfig::new(2, 3, 1, 4);
        HybridRnn::new(HybridCell::new(&config, &device).unwrap())
    }

    #[test]
    fn test_rollout_shapes() {
        let device = Default::default();
        let rnn = build();

        let input = Tensor::<TestBackend, 3>::zeros([4, 6, 3], &device);
        let rollout = rnn.forward(input, None, None, None).unwrap();

        assert_eq!(rollout.outputs.dims(), [4, 6, 1]);
        assert_eq!(rollout.state.dims(), [4, 7]);
        assert_eq!(rollout.modes.len(), 6);
        assert_eq!(rollout.diagnostics.len(), 6);
    }

    #[test]
    fn test_rollout_seq_first_and_last_only() {
        let device = Default::default();
        let rnn = build().with_batch_first(false).with_return_sequences(false);

        let input = Tensor::<TestBackend, 3>::zeros([6, 4, 3], &device);
        let rollout = rnn.forward(input, None, None, None).unwrap();

        assert_eq!(rollout.outputs.dims(), [4, 1, 1]);
        assert_eq!(rollout.state.dims(), [4, 7]);
    }

    #[test]
    fn test_rollout_rejects_short_mode_sequence() {
        let device = Default::default();
        let rnn = build();

        let input = Tensor::<TestBackend, 3>::zeros([2, 3, 3], &device);
        let forced = vec![vec![0, 1]; 2];
        assert!(rnn.forward(input, None, None, Some(&forced)).is_err());
    }
}

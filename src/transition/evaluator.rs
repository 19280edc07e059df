//! Mode transition evaluation
//!
//! Decides, for every sample of a batch, which mode it occupies after the
//! current step. Each mode is handled by exactly one of three paths:
//!
//! 1. **Regression**: a [`StopTimePredictor`] estimates when the mode ends; a
//!    sample whose elapsed dwell time has reached the estimate moves on to
//!    the successor mode. Rollover never re-enters mode 0, it lands on mode 1.
//! 2. **Classification**: a [`ModeClassifier`] produces a distribution over
//!    modes; the sample moves to the argmax and the whole distribution is
//!    reported.
//! 3. **Rules**: the advanced state is decoded and denormalized, then checked
//!    against the mode's interval constraints. Two constraints sending one
//!    sample to different targets is a [`HybridError::Conflict`].
//!
//! Samples that no path moves stay where they are with an all-zero
//! distribution row.
//!
//! [`StopTimePredictor`]: super::predictors::StopTimePredictor
//! [`ModeClassifier`]: super::predictors::ModeClassifier

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use ndarray::Array2;

use super::predictors::TransitionPredictor;
use super::rules::TransitionRegistry;
use crate::cells::decoder::Normalization;
use crate::cells::packed_state::{index_tensor, partition_by_mode, to_host, PackedLayout};
use crate::error::{HybridError, Result};

/// Predicted versus real stop times of the regression path.
///
/// Rows outside every regression-driven mode keep a NaN prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct StopTimeTrace {
    pub predicted: Vec<f32>,
    pub elapsed: Vec<f32>,
}

/// Side information produced while evaluating transitions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionDiagnostics {
    pub stop_times: Option<StopTimeTrace>,
}

/// Result of evaluating one batch.
#[derive(Debug, Clone)]
pub struct TransitionOutcome<B: Backend> {
    /// New mode per sample
    pub modes: Vec<usize>,
    /// `[batch, ode_nums]` transition evidence
    pub distribution: Tensor<B, 2>,
    pub diagnostics: TransitionDiagnostics,
}

/// Successor used by the regression path: `(mode + 1) mod ode_nums`, skipping 0.
pub fn rollover_successor(mode: usize, ode_nums: usize) -> usize {
    match (mode + 1) % ode_nums {
        0 => 1,
        next => next,
    }
}

/// Per-mode transition logic over a fixed mode count.
#[derive(Debug)]
pub struct TransitionEvaluator<B: Backend> {
    layout: PackedLayout,
    ode_nums: usize,
    predictors: Vec<Option<TransitionPredictor<B>>>,
    registry: TransitionRegistry,
    normalization: Normalization<B>,
}

impl<B: Backend> TransitionEvaluator<B> {
    pub fn new(layout: PackedLayout, ode_nums: usize, normalization: Normalization<B>) -> Self {
        Self {
            layout,
            ode_nums,
            predictors: (0..ode_nums).map(|_| None).collect(),
            registry: TransitionRegistry::new(ode_nums, layout.k_out()),
            normalization,
        }
    }

    pub fn ode_nums(&self) -> usize {
        self.ode_nums
    }

    pub fn registry(&self) -> &TransitionRegistry {
        &self.registry
    }

    pub fn normalization(&self) -> &Normalization<B> {
        &self.normalization
    }

    pub fn predictor(&self, mode: usize) -> Option<&TransitionPredictor<B>> {
        self.predictors.get(mode).and_then(Option::as_ref)
    }

    /// Hand `mode`'s transitions to a learned predictor.
    pub fn set_predictor(&mut self, mode: usize, predictor: TransitionPredictor<B>) -> Result<()> {
        if mode >= self.ode_nums {
            return Err(HybridError::ModeOutOfRange {
                index: mode,
                ode_nums: self.ode_nums,
            });
        }
        if matches!(predictor, TransitionPredictor::Regression(_)) && self.ode_nums < 2 {
            return Err(HybridError::InvalidConfig(
                "a stop-time predictor needs at least two modes to roll over into".to_string(),
            ));
        }
        if self.registry.has_rules(mode) {
            tracing::warn!(mode, "learned predictor shadows registered transition rules");
        }
        self.predictors[mode] = Some(predictor);
        Ok(())
    }

    /// See [`TransitionRegistry::add_transform`].
    pub fn add_transform(&mut self, source: usize, target: usize, rules: &[super::Rule]) -> Result<()> {
        self.registry.add_transform(source, target, rules)?;
        if self.predictor(source).is_some() {
            tracing::warn!(
                source,
                target,
                "rules registered on a predictor-driven mode are inactive"
            );
        }
        Ok(())
    }

    /// Evaluate transitions for a packed state `[latent, dwell, mode]`.
    pub fn evaluate(&self, state: Tensor<B, 2>, input: Tensor<B, 2>) -> Result<TransitionOutcome<B>> {
        let [batch, _] = input.dims();
        self.layout.check(&state, batch)?;
        let modes = self.layout.modes(&state, self.ode_nums)?;
        self.evaluate_parts(
            self.layout.latent(state.clone()),
            self.layout.dwell(state),
            &modes,
            input,
        )
    }

    pub(crate) fn evaluate_parts(
        &self,
        latent: Tensor<B, 2>,
        dwell: Tensor<B, 2>,
        modes: &[usize],
        input: Tensor<B, 2>,
    ) -> Result<TransitionOutcome<B>> {
        let batch = modes.len();
        let n = self.ode_nums;
        let device = latent.device();

        // learned predictors only see the hidden ODE state
        let hidden = self.layout.hidden(latent.clone());
        let mut new_modes = modes.to_vec();
        let mut distribution = vec![0.0f32; batch * n];
        let mut diagnostics = TransitionDiagnostics::default();

        let partitions = partition_by_mode(modes, n);
        let needs_rules = partitions
            .iter()
            .enumerate()
            .any(|(mode, rows)| !rows.is_empty() && self.predictor(mode).is_none());
        let decoded = if needs_rules {
            Some(self.decode_host(latent)?)
        } else {
            None
        };

        for (mode, rows) in partitions.iter().enumerate() {
            if rows.is_empty() {
                continue;
            }
            let index = index_tensor::<B>(rows, &device);

            match self.predictor(mode) {
                Some(TransitionPredictor::Regression(predictor)) => {
                    let trace = diagnostics.stop_times.get_or_insert_with(|| StopTimeTrace {
                        predicted: vec![f32::NAN; batch],
                        elapsed: to_host(dwell.clone()),
                    });
                    let predicted = predictor.predict(
                        hidden.clone().select(0, index.clone()),
                        input.clone().select(0, index),
                    );
                    check_rows("stop-time prediction", &predicted, rows.len(), 1)?;

                    let successor = rollover_successor(mode, n);
                    for (&row, stop) in rows.iter().zip(to_host(predicted)) {
                        trace.predicted[row] = stop;
                        if stop <= trace.elapsed[row] {
                            new_modes[row] = successor;
                            distribution[row * n + successor] = 1.0;
                        }
                    }
                }
                Some(TransitionPredictor::Classification(classifier)) => {
                    let features = Tensor::cat(
                        vec![
                            hidden.clone().select(0, index.clone()),
                            dwell.clone().select(0, index),
                        ],
                        1,
                    );
                    let probs = classifier.predict(features);
                    check_rows("mode probabilities", &probs, rows.len(), n)?;

                    let probs = to_host(probs);
                    for (&row, p) in rows.iter().zip(probs.chunks(n)) {
                        new_modes[row] = argmax(p);
                        distribution[row * n..(row + 1) * n].copy_from_slice(p);
                    }
                }
                None => {
                    if let Some(outputs) = decoded.as_ref() {
                        self.apply_rules(mode, rows, outputs, &mut new_modes, &mut distribution)?;
                    }
                }
            }
        }

        Ok(TransitionOutcome {
            modes: new_modes,
            distribution: Tensor::from_data(TensorData::new(distribution, [batch, n]), &device),
            diagnostics,
        })
    }

    /// Denormalized decoded outputs of the whole batch. Read-only.
    fn decode_host(&self, latent: Tensor<B, 2>) -> Result<Array2<f32>> {
        let y = self.normalization.denormalize(self.layout.output(latent));
        let [batch, k_out] = y.dims();
        Array2::from_shape_vec((batch, k_out), to_host(y))
            .map_err(|_| HybridError::shape("decoded outputs", &[batch, k_out], &[]))
    }

    fn apply_rules(
        &self,
        mode: usize,
        rows: &[usize],
        outputs: &Array2<f32>,
        new_modes: &mut [usize],
        distribution: &mut [f32],
    ) -> Result<()> {
        let n = self.ode_nums;
        let mut assigned: Vec<Option<usize>> = vec![None; rows.len()];

        for constraint in self.registry.constraints(mode) {
            let target = constraint.target();
            for (slot, &row) in assigned.iter_mut().zip(rows) {
                let y = outputs.row(row);
                if !constraint.contains(y) {
                    continue;
                }
                if let Some(previous) = *slot {
                    if previous != target {
                        return Err(HybridError::Conflict {
                            mode,
                            previous,
                            candidate: target,
                            outputs: y.to_vec(),
                        });
                    }
                }
                *slot = Some(target);
                new_modes[row] = target;
                distribution[row * n + target] = 1.0;
            }
        }

        let switched = assigned.iter().filter(|slot| slot.is_some()).count();
        if switched > 0 {
            tracing::trace!(mode, switched, "rule transitions matched");
        }
        Ok(())
    }
}

fn check_rows<B: Backend>(what: &'static str, tensor: &Tensor<B, 2>, rows: usize, cols: usize) -> Result<()> {
    let dims = tensor.dims();
    if dims != [rows, cols] {
        return Err(HybridError::shape(what, &[rows, cols], &dims));
    }
    Ok(())
}

/// Index of the first maximum.
fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, best_value), (i, &v)| {
            if v > best_value {
                (i, v)
            } else {
                (best, best_value)
            }
        })
        .0
}

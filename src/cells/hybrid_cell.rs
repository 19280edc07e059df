//! Hybrid step engine
//!
//! One call to [`HybridCell::step`] advances a batch of trajectories by one
//! time step:
//!
//! 1. unpack `[latent, dwell, mode]` (zeros when no state is given),
//! 2. advance each mode's rows through that mode's [`ModeDynamics`],
//! 3. add the time delta to the dwell time,
//! 4. evaluate transitions on `[new latent, old dwell, old mode]` unless the
//!    caller forces the next modes,
//! 5. reset the dwell time of every sample whose mode changed,
//! 6. return the decoded output and the repacked state.
//!
//! The input state is never modified; every step allocates fresh tensors.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::decoder::{Decoder, Normalization};
use super::merge_cell::MergeCellConfig;
use super::packed_state::{index_tensor, mask_tensor, mode_tensor, partition_by_mode, PackedLayout};
use super::ModeDynamics;
use crate::config::{CellKind, HybridConfig, ModeSpec};
use crate::error::{HybridError, Result};
use crate::transition::{
    ModeClassifierNet, PredictorKind, Rule, StopTimeNet, TransitionDiagnostics,
    TransitionEvaluator, TransitionPredictor, TransitionRegistry,
};

/// Everything produced by one step.
#[derive(Debug, Clone)]
pub struct StepOutput<B: Backend> {
    /// Decoded output `[batch, k_out]` of the advanced state
    pub output: Tensor<B, 2>,
    /// Packed state `[batch, k_out + k_state + 2]` for the next step
    pub state: Tensor<B, 2>,
    /// Mode of every sample after the step
    pub modes: Vec<usize>,
    /// `[batch, ode_nums]` transition evidence; `None` when modes were forced
    pub distribution: Option<Tensor<B, 2>>,
    pub diagnostics: TransitionDiagnostics,
}

impl<B: Backend> StepOutput<B> {
    /// `(decoded_output, new_packed_state)`
    pub fn into_parts(self) -> (Tensor<B, 2>, Tensor<B, 2>) {
        (self.output, self.state)
    }
}

/// Combined continuous-state / discrete-mode recurrent cell.
pub struct HybridCell<B: Backend> {
    layout: PackedLayout,
    ode_nums: usize,
    k_in: usize,
    modes: Vec<ModeSpec>,
    dynamics: Vec<Box<dyn ModeDynamics<B>>>,
    evaluator: TransitionEvaluator<B>,
}

impl<B: Backend> std::fmt::Debug for HybridCell<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridCell")
            .field("layout", &self.layout)
            .field("ode_nums", &self.ode_nums)
            .field("k_in", &self.k_in)
            .field("modes", &self.modes)
            .field("evaluator", &self.evaluator)
            .finish_non_exhaustive()
    }
}

impl<B: Backend> HybridCell<B> {
    /// Build merge cells, decoders, predictors and rules from `config`.
    pub fn new(config: &HybridConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;
        let CellKind::Merge = config.cell_kind()?;

        let make_decoder = || {
            if config.linear_decoder {
                Decoder::linear(config.k_state, config.k_out, device)
            } else {
                Decoder::two_layer(config.k_state, config.k_out, config.decoder_activation, device)
            }
        };
        let shared = config.decoder_sharing.then(make_decoder);

        let dynamics = config
            .modes
            .iter()
            .map(|spec| {
                let decoder = shared.clone().unwrap_or_else(make_decoder);
                let cell = MergeCellConfig::new(config.k_in, config.k_state)
                    .with_backbone(config.k_state, config.layers)
                    .with_variant(spec.cell)
                    .init(decoder, device);
                Box::new(cell) as Box<dyn ModeDynamics<B>>
            })
            .collect();

        Self::with_dynamics(config, dynamics, device)
    }

    /// Build around caller-supplied per-mode dynamics. `config.cell_type` is ignored.
    pub fn with_dynamics(
        config: &HybridConfig,
        dynamics: Vec<Box<dyn ModeDynamics<B>>>,
        device: &B::Device,
    ) -> Result<Self> {
        config.validate()?;
        if dynamics.len() != config.ode_nums {
            return Err(HybridError::InvalidConfig(format!(
                "{} dynamics given for {} modes",
                dynamics.len(),
                config.ode_nums
            )));
        }

        let layout = PackedLayout::new(config.k_out, config.k_state);
        let normalization = Normalization::new(&config.y_mean, &config.y_std, device)?;
        let mut evaluator = TransitionEvaluator::new(layout, config.ode_nums, normalization);

        for spec in &config.transition_predictors {
            let predictor = match spec.kind.parse::<PredictorKind>()? {
                PredictorKind::Predict => TransitionPredictor::Regression(Box::new(
                    StopTimeNet::new(config.k_state + config.k_in, config.k_state, device),
                )),
                PredictorKind::Classify => TransitionPredictor::Classification(Box::new(
                    ModeClassifierNet::new(config.k_state + 1, config.k_state, config.ode_nums, device),
                )),
            };
            evaluator.set_predictor(spec.mode, predictor)?;
        }
        for transform in &config.transition_rules {
            evaluator.add_transform(transform.from, transform.to, &transform.rules)?;
        }

        tracing::debug!(
            ode_nums = config.ode_nums,
            k_in = config.k_in,
            k_out = config.k_out,
            k_state = config.k_state,
            predictors = config.transition_predictors.len(),
            transforms = config.transition_rules.len(),
            "built hybrid cell"
        );

        Ok(Self {
            layout,
            ode_nums: config.ode_nums,
            k_in: config.k_in,
            modes: config.modes.clone(),
            dynamics,
            evaluator,
        })
    }

    /// Register a rule-based transition. Configuration time only.
    pub fn add_transform(&mut self, source: usize, target: usize, rules: &[Rule]) -> Result<()> {
        self.evaluator.add_transform(source, target, rules)
    }

    /// Replace the learned predictor of `mode`. Configuration time only.
    pub fn set_predictor(&mut self, mode: usize, predictor: TransitionPredictor<B>) -> Result<()> {
        self.evaluator.set_predictor(mode, predictor)
    }

    pub fn ode_nums(&self) -> usize {
        self.ode_nums
    }

    pub fn input_size(&self) -> usize {
        self.k_in
    }

    pub fn layout(&self) -> PackedLayout {
        self.layout
    }

    pub fn mode_specs(&self) -> &[ModeSpec] {
        &self.modes
    }

    pub fn registry(&self) -> &TransitionRegistry {
        self.evaluator.registry()
    }

    pub fn evaluator(&self) -> &TransitionEvaluator<B> {
        &self.evaluator
    }

    pub fn dynamics(&self, mode: usize) -> Option<&dyn ModeDynamics<B>> {
        self.dynamics.get(mode).map(|d| d.as_ref())
    }

    /// Decoded (normalized) output of a latent block.
    pub fn decode(&self, latent: Tensor<B, 2>) -> Tensor<B, 2> {
        self.layout.output(latent)
    }

    /// Decoded output mapped back to physical units.
    pub fn decode_denormalized(&self, latent: Tensor<B, 2>) -> Tensor<B, 2> {
        self.evaluator.normalization().denormalize(self.decode(latent))
    }

    /// Advance every row through its own mode's dynamics.
    ///
    /// Rows are gathered per mode and scattered back by original index into a
    /// fresh buffer, so partitions never see each other's rows.
    pub fn advance(
        &self,
        latent: Tensor<B, 2>,
        modes: &[usize],
        input: Tensor<B, 2>,
        dt: Tensor<B, 2>,
    ) -> Result<Tensor<B, 2>> {
        let dims = latent.dims();
        let device = latent.device();
        let mut next = Tensor::<B, 2>::zeros(dims, &device);

        for (mode, rows) in partition_by_mode(modes, self.ode_nums).iter().enumerate() {
            if rows.is_empty() {
                continue;
            }
            let index = index_tensor::<B>(rows, &device);
            let advanced = self.dynamics[mode].advance(
                latent.clone().select(0, index.clone()),
                input.clone().select(0, index.clone()),
                dt.clone().select(0, index.clone()),
            );
            let actual = advanced.dims();
            if actual != [rows.len(), dims[1]] {
                return Err(HybridError::shape("advanced latent", &[rows.len(), dims[1]], &actual));
            }
            next = next.select_assign(0, index, advanced);
        }
        Ok(next)
    }

    /// One hybrid step.
    ///
    /// # Arguments
    /// * `state` - Previous packed state `[batch, k_out + k_state + 2]`, or `None` at step zero
    /// * `input` - Exogenous input `[batch, k_in]`
    /// * `dt` - Time delta `[batch, 1]`
    /// * `forced_modes` - Next mode per sample, bypassing transition evaluation
    pub fn step(
        &self,
        state: Option<Tensor<B, 2>>,
        input: Tensor<B, 2>,
        dt: Tensor<B, 2>,
        forced_modes: Option<&[usize]>,
    ) -> Result<StepOutput<B>> {
        let [batch, k_in] = input.dims();
        if k_in != self.k_in {
            return Err(HybridError::shape("exogenous input", &[batch, self.k_in], &[batch, k_in]));
        }
        if dt.dims() != [batch, 1] {
            return Err(HybridError::shape("time delta", &[batch, 1], &dt.dims()));
        }
        let device = input.device();

        let state = match state {
            Some(state) => {
                self.layout.check(&state, batch)?;
                state
            }
            None => self.layout.zeros(batch, &device),
        };
        let latent = self.layout.latent(state.clone());
        let dwell = self.layout.dwell(state.clone());
        let modes = self.layout.modes(&state, self.ode_nums)?;

        let new_latent = self.advance(latent, &modes, input.clone(), dt.clone())?;
        let new_dwell = dwell.clone() + dt;

        let (new_modes, distribution, diagnostics) = match forced_modes {
            Some(forced) => {
                self.check_forced(forced, batch)?;
                (forced.to_vec(), None, TransitionDiagnostics::default())
            }
            None => {
                let outcome =
                    self.evaluator
                        .evaluate_parts(new_latent.clone(), dwell, &modes, input)?;
                (outcome.modes, Some(outcome.distribution), outcome.diagnostics)
            }
        };

        let changed: Vec<bool> = modes
            .iter()
            .zip(&new_modes)
            .map(|(old, new)| old != new)
            .collect();
        let switched = changed.iter().filter(|&&c| c).count();
        let new_dwell = if switched > 0 {
            new_dwell.mask_fill(mask_tensor::<B>(&changed, &device), 0.0)
        } else {
            new_dwell
        };
        tracing::trace!(batch, switched, forced = forced_modes.is_some(), "hybrid step");

        Ok(StepOutput {
            output: self.decode(new_latent.clone()),
            state: self
                .layout
                .pack(new_latent, new_dwell, mode_tensor::<B>(&new_modes, &device)),
            modes: new_modes,
            distribution,
            diagnostics,
        })
    }

    fn check_forced(&self, forced: &[usize], batch: usize) -> Result<()> {
        if forced.len() != batch {
            return Err(HybridError::shape("forced modes", &[batch], &[forced.len()]));
        }
        match forced.iter().find(|&&mode| mode >= self.ode_nums) {
            Some(&mode) => Err(HybridError::ModeOutOfRange {
                index: mode,
                ode_nums: self.ode_nums,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::backend::Backend as BurnBackend;

    type TestBackend = NdArray<f32>;
    type TestDevice = <TestBackend as BurnBackend>::Device;

    fn get_test_device() -> TestDevice {
        Default::default()
    }

    #[test]
    fn test_hybrid_cell_creation() {
        let device = get_test_device();
        let config = HybridConfig::new(3, 2, 1, 4);
        let cell = HybridCell::<TestBackend>::new(&config, &device).unwrap();

        assert_eq!(cell.ode_nums(), 3);
        assert_eq!(cell.input_size(), 2);
        assert_eq!(cell.layout().width(), 7);
        assert_eq!(cell.mode_specs()[1].name, "mode_1");
        assert!(cell.registry().is_empty());
    }

    #[test]
    fn test_step_from_zero_state() {
        let device = get_test_device();
        let config = HybridConfig::new(2, 3, 2, 5);
        let cell = HybridCell::<TestBackend>::new(&config, &device).unwrap();

        let input = Tensor::<TestBackend, 2>::ones([4, 3], &device);
        let dt = Tensor::<TestBackend, 2>::full([4, 1], 0.1, &device);
        let step = cell.step(None, input, dt, None).unwrap();

        assert_eq!(step.output.dims(), [4, 2]);
        assert_eq!(step.state.dims(), [4, 9]);
        assert_eq!(step.modes, vec![0; 4]);
        assert_eq!(step.distribution.unwrap().dims(), [4, 2]);
    }

    #[test]
    fn test_unimplemented_cell_type() {
        let device = get_test_device();
        let config = HybridConfig::new(2, 1, 1, 2).with_cell_type("cde");
        assert_eq!(
            HybridCell::<TestBackend>::new(&config, &device).unwrap_err(),
            HybridError::UnimplementedCell("cde".into())
        );
    }

    #[test]
    fn test_wrong_input_width() {
        let device = get_test_device();
        let cell = HybridCell::<TestBackend>::new(&HybridConfig::new(2, 3, 1, 2), &device).unwrap();

        let err = cell
            .step(
                None,
                Tensor::ones([2, 4], &device),
                Tensor::ones([2, 1], &device),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, HybridError::ShapeMismatch { what: "exogenous input", .. }));
    }
}

//! Construction-time configuration of a hybrid cell
//!
//! [`HybridConfig`] mirrors the JSON files used to describe a system: one
//! entry per mode, the normalization statistics of the outputs, and the
//! optional learned predictors and transition rules.
//!
//! ```json
//! {
//!   "ode_nums": 2, "k_in": 1, "k_out": 1, "k_state": 4,
//!   "y_mean": [0.0], "y_std": [1.0],
//!   "modes": [{"name": "heating"}, {"name": "cooling", "cell": "pure"}],
//!   "cell_type": "merge",
//!   "transition_rules": [{"from": 0, "to": 1, "rules": [[0, "geq", 10.0]]}]
//! }
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::activation::Saturation;
use crate::cells::merge_cell::CellVariant;
use crate::error::{HybridError, Result};
use crate::transition::Rule;

/// ODE cell families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    /// Closed-form merge cell, see [`MergeCell`](crate::cells::MergeCell)
    Merge,
}

impl FromStr for CellKind {
    type Err = HybridError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "merge" => Ok(CellKind::Merge),
            other => Err(HybridError::UnimplementedCell(other.to_string())),
        }
    }
}

/// Metadata and cell parameters of one mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeSpec {
    pub name: String,
    /// Free-form tag describing what the mode's output represents
    #[serde(default)]
    pub y_type: String,
    #[serde(default)]
    pub cell: CellVariant,
}

impl ModeSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            y_type: String::new(),
            cell: CellVariant::default(),
        }
    }

    pub fn with_y_type(mut self, y_type: impl Into<String>) -> Self {
        self.y_type = y_type.into();
        self
    }

    pub fn with_cell(mut self, cell: CellVariant) -> Self {
        self.cell = cell;
        self
    }
}

/// Registration of a learned predictor: `kind` is `predict` or `classify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictorSpec {
    pub kind: String,
    pub mode: usize,
}

/// Seed entry for the transition registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformSpec {
    pub from: usize,
    pub to: usize,
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridConfig {
    /// Number of modes
    pub ode_nums: usize,
    pub k_in: usize,
    pub k_out: usize,
    pub k_state: usize,
    /// Backbone depth of every mode cell
    #[serde(default)]
    pub layers: usize,
    pub y_mean: Vec<f32>,
    pub y_std: Vec<f32>,
    pub modes: Vec<ModeSpec>,
    #[serde(default = "default_cell_type")]
    pub cell_type: String,
    #[serde(default)]
    pub linear_decoder: bool,
    #[serde(default)]
    pub decoder_activation: Saturation,
    /// One decoder shared by every mode instead of one per mode
    #[serde(default)]
    pub decoder_sharing: bool,
    #[serde(default)]
    pub transition_predictors: Vec<PredictorSpec>,
    #[serde(default)]
    pub transition_rules: Vec<TransformSpec>,
}

fn default_cell_type() -> String {
    "merge".to_string()
}

impl HybridConfig {
    /// Identity normalization, modes named `mode_0..`, merge cells, no transitions.
    pub fn new(ode_nums: usize, k_in: usize, k_out: usize, k_state: usize) -> Self {
        Self {
            ode_nums,
            k_in,
            k_out,
            k_state,
            layers: 0,
            y_mean: vec![0.0; k_out],
            y_std: vec![1.0; k_out],
            modes: (0..ode_nums).map(|i| ModeSpec::new(format!("mode_{}", i))).collect(),
            cell_type: default_cell_type(),
            linear_decoder: false,
            decoder_activation: Saturation::default(),
            decoder_sharing: false,
            transition_predictors: Vec::new(),
            transition_rules: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| HybridError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| HybridError::InvalidConfig(e.to_string()))
    }

    pub fn with_layers(mut self, layers: usize) -> Self {
        self.layers = layers;
        self
    }

    pub fn with_normalization(mut self, y_mean: Vec<f32>, y_std: Vec<f32>) -> Self {
        self.y_mean = y_mean;
        self.y_std = y_std;
        self
    }

    pub fn with_modes(mut self, modes: Vec<ModeSpec>) -> Self {
        self.modes = modes;
        self
    }

    pub fn with_cell_type(mut self, cell_type: impl Into<String>) -> Self {
        self.cell_type = cell_type.into();
        self
    }

    pub fn with_linear_decoder(mut self, linear_decoder: bool) -> Self {
        self.linear_decoder = linear_decoder;
        self
    }

    pub fn with_decoder_activation(mut self, activation: Saturation) -> Self {
        self.decoder_activation = activation;
        self
    }

    pub fn with_decoder_sharing(mut self, decoder_sharing: bool) -> Self {
        self.decoder_sharing = decoder_sharing;
        self
    }

    pub fn with_predictor(mut self, kind: impl Into<String>, mode: usize) -> Self {
        self.transition_predictors.push(PredictorSpec {
            kind: kind.into(),
            mode,
        });
        self
    }

    pub fn with_transform(mut self, from: usize, to: usize, rules: Vec<Rule>) -> Self {
        self.transition_rules.push(TransformSpec { from, to, rules });
        self
    }

    pub fn cell_kind(&self) -> Result<CellKind> {
        self.cell_type.parse()
    }

    /// Width of a packed state row.
    pub fn packed_width(&self) -> usize {
        self.k_out + self.k_state + 2
    }

    /// Dimension and bookkeeping checks. Rule indices are checked when the
    /// rules are registered, predictor kinds when predictors are built.
    pub fn validate(&self) -> Result<()> {
        if self.ode_nums == 0 {
            return Err(HybridError::InvalidConfig("ode_nums must be positive".into()));
        }
        for (name, value) in [("k_in", self.k_in), ("k_out", self.k_out), ("k_state", self.k_state)] {
            if value == 0 {
                return Err(HybridError::InvalidConfig(format!("{} must be positive", name)));
            }
        }
        if self.y_mean.len() != self.k_out || self.y_std.len() != self.k_out {
            return Err(HybridError::InvalidConfig(format!(
                "normalization statistics must have k_out = {} entries (y_mean: {}, y_std: {})",
                self.k_out,
                self.y_mean.len(),
                self.y_std.len()
            )));
        }
        if self.modes.len() != self.ode_nums {
            return Err(HybridError::InvalidConfig(format!(
                "{} mode specs given for {} modes",
                self.modes.len(),
                self.ode_nums
            )));
        }
        for (i, spec) in self.transition_predictors.iter().enumerate() {
            if self.transition_predictors[..i].iter().any(|other| other.mode == spec.mode) {
                return Err(HybridError::InvalidConfig(format!(
                    "mode {} has more than one transition predictor",
                    spec.mode
                )));
            }
        }
        Ok(())
    }
}

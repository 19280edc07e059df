//! Error types for the hybrid step engine.
//!
//! Every failure is reported through [`HybridError`]. Errors fall into three
//! groups (see [`ErrorKind`]): configuration mistakes caught at setup,
//! transition conflicts caught while stepping, and malformed inputs handed
//! to a step.

use thiserror::Error;

/// Result type alias for hybrid engine operations.
pub type Result<T> = std::result::Result<T, HybridError>;

/// Coarse classification of a [`HybridError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Setup-time mistake; fatal, never recovered.
    Configuration,
    /// Two transition rules disagree for one sample.
    Conflict,
    /// A tensor or mode value handed to a step is malformed.
    Input,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HybridError {
    #[error("cell type `{0}` is not implemented")]
    UnimplementedCell(String),

    #[error("transition predictor kind `{0}` is not implemented (expected `predict` or `classify`)")]
    UnimplementedPredictor(String),

    #[error("mode index {index} out of range for {ode_nums} modes")]
    ModeOutOfRange { index: usize, ode_nums: usize },

    #[error("feature index {index} out of range for {k_out} output features")]
    FeatureOutOfRange { index: usize, k_out: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(
        "conflicts in transformation from {mode} to {previous} and {candidate}, with current outputs {outputs:?}"
    )]
    Conflict {
        mode: usize,
        previous: usize,
        candidate: usize,
        outputs: Vec<f32>,
    },

    #[error("shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("packed state row {row} holds invalid mode value {value}")]
    InvalidModeValue { row: usize, value: f32 },
}

impl HybridError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HybridError::UnimplementedCell(_)
            | HybridError::UnimplementedPredictor(_)
            | HybridError::ModeOutOfRange { .. }
            | HybridError::FeatureOutOfRange { .. }
            | HybridError::InvalidConfig(_) => ErrorKind::Configuration,
            HybridError::Conflict { .. } => ErrorKind::Conflict,
            HybridError::ShapeMismatch { .. } | HybridError::InvalidModeValue { .. } => {
                ErrorKind::Input
            }
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    pub(crate) fn shape(what: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        HybridError::ShapeMismatch {
            what,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}

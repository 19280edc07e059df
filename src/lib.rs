//! # DFA-ODE - Hybrid dynamical systems on Burn
//!
//! Continuous dynamics from several ODE regimes, switched by DFA-style
//! transition logic, batched over many independent trajectories.
//!
//! ## Features
//!
//! - **Per-mode ODE cells**: each discrete mode advances the latent state with its own cell
//! - **Packed state**: latent state, dwell time and mode travel together as one tensor
//! - **Interval rules**: switch modes when the decoded output enters a box, with conflict detection
//! - **Learned transitions**: stop-time regression or mode classification per mode
//! - **Sequence rollout**: full-sequence processing with optional forced mode sequences
//!
//! ## Quick Start
//!
//! ```rust
//! use burn::backend::NdArray;
//! use burn::tensor::Tensor;
//! use dfa_ode::prelude::*;
//!
//! type Backend = NdArray<f32>;
//! let device = Default::default();
//!
//! // Two modes; leave mode 0 for mode 1 once output 0 exceeds 10.
//! let config = HybridConfig::new(2, 3, 1, 8)
//!     .with_transform(0, 1, vec![Rule::geq(0, 10.0)]);
//! let cell = HybridCell::<Backend>::new(&config, &device).unwrap();
//!
//! let input = Tensor::<Backend, 2>::ones([4, 3], &device);
//! let dt = Tensor::<Backend, 2>::full([4, 1], 0.1, &device);
//! let step = cell.step(None, input, dt, None).unwrap();
//!
//! assert_eq!(step.output.dims(), [4, 1]);
//! assert_eq!(step.state.dims(), [4, 1 + 8 + 2]);
//! ```

pub mod activation;
pub mod cells;
pub mod config;
pub mod error;
pub mod rnn;
pub mod transition;

pub use error::{ErrorKind, HybridError, Result};

pub mod prelude {
    pub use crate::activation::Saturation;
    pub use crate::cells::{
        CellVariant, Decoder, HybridCell, MergeCell, MergeCellConfig, ModeDynamics, PackedLayout,
        StepOutput,
    };
    pub use crate::config::{HybridConfig, ModeSpec};
    pub use crate::error::{HybridError, Result};
    pub use crate::rnn::{HybridRnn, Rollout};
    pub use crate::transition::{
        Comparator, ModeClassifier, Rule, StopTimePredictor, TransitionPredictor,
    };
}

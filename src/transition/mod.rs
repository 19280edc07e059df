//! # Mode Transitions
//!
//! Everything that decides when a sample leaves its current mode.
//!
//! | Piece | Role |
//! |-------|------|
//! | [`Rule`] / [`TransitionRegistry`] | Interval constraints on the decoded output, per source mode |
//! | [`StopTimePredictor`] / [`ModeClassifier`] | Learned alternatives to rules, at most one per mode |
//! | [`TransitionEvaluator`] | Runs the right path for every mode of a batch |
//!
//! ## Rule Example
//!
//! ```rust
//! use dfa_ode::transition::{Rule, TransitionRegistry};
//!
//! // Leave mode 0 for mode 1 once output 0 exceeds 10 while output 1 stays below 2.
//! let mut registry = TransitionRegistry::new(2, 2);
//! registry
//!     .add_transform(0, 1, &[Rule::geq(0, 10.0), Rule::leq(1, 2.0)])
//!     .unwrap();
//!
//! assert_eq!(registry.constraints(0).len(), 1);
//! ```
//!
//! Registering the same `(source, target)` pair again only tightens the
//! existing interval.

pub mod evaluator;
pub mod predictors;
pub mod rules;

pub use evaluator::{
    rollover_successor, StopTimeTrace, TransitionDiagnostics, TransitionEvaluator,
    TransitionOutcome,
};
pub use predictors::{
    ModeClassifier, ModeClassifierNet, PredictorKind, StopTimeNet, StopTimePredictor,
    TransitionPredictor,
};
pub use rules::{Comparator, IntervalConstraint, Rule, TransitionRegistry};

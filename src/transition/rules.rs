//! Interval transition rules and the per-mode registry
//!
//! A rule is a single inequality on one decoded output feature. All rules
//! registered for a `(source, target)` pair fold into one
//! [`IntervalConstraint`]: an open box `(min, max)` over the output vector.
//! A sample in `source` moves to `target` when its denormalized output lies
//! strictly inside the box.

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{HybridError, Result};

/// Comparison direction of a [`Rule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    /// `feature <= threshold`: tightens the upper bound
    #[serde(alias = "<=")]
    Leq,
    /// `feature >= threshold`: tightens the lower bound
    #[serde(alias = ">=")]
    Geq,
}

/// One inequality on a decoded output feature.
///
/// Serialized as a `[feature, comparator, threshold]` triple, e.g. `[0, "geq", 10.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(usize, Comparator, f32)", into = "(usize, Comparator, f32)")]
pub struct Rule {
    pub feature: usize,
    pub comparator: Comparator,
    pub threshold: f32,
}

impl Rule {
    pub fn leq(feature: usize, threshold: f32) -> Self {
        Self {
            feature,
            comparator: Comparator::Leq,
            threshold,
        }
    }

    pub fn geq(feature: usize, threshold: f32) -> Self {
        Self {
            feature,
            comparator: Comparator::Geq,
            threshold,
        }
    }
}

impl From<(usize, Comparator, f32)> for Rule {
    fn from((feature, comparator, threshold): (usize, Comparator, f32)) -> Self {
        Self {
            feature,
            comparator,
            threshold,
        }
    }
}

impl From<Rule> for (usize, Comparator, f32) {
    fn from(rule: Rule) -> Self {
        (rule.feature, rule.comparator, rule.threshold)
    }
}

/// Open box over the decoded output, paired with the mode it leads to.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalConstraint {
    min_values: Array1<f32>,
    max_values: Array1<f32>,
    target: usize,
}

impl IntervalConstraint {
    /// `(-inf, +inf)` on every feature.
    pub fn unbounded(k_out: usize, target: usize) -> Self {
        Self {
            min_values: Array1::from_elem(k_out, f32::NEG_INFINITY),
            max_values: Array1::from_elem(k_out, f32::INFINITY),
            target,
        }
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn min_values(&self) -> ArrayView1<'_, f32> {
        self.min_values.view()
    }

    pub fn max_values(&self) -> ArrayView1<'_, f32> {
        self.max_values.view()
    }

    /// Narrow the box with `rule`. Never widens it.
    ///
    /// The feature index must already be validated against the box width.
    fn tighten(&mut self, rule: &Rule) {
        match rule.comparator {
            Comparator::Leq => {
                let bound = &mut self.max_values[rule.feature];
                *bound = bound.min(rule.threshold);
            }
            Comparator::Geq => {
                let bound = &mut self.min_values[rule.feature];
                *bound = bound.max(rule.threshold);
            }
        }
    }

    /// True when every feature of `output` lies strictly between the bounds.
    pub fn contains(&self, output: ArrayView1<'_, f32>) -> bool {
        output.len() == self.min_values.len()
            && output
                .iter()
                .zip(self.min_values.iter().zip(self.max_values.iter()))
                .all(|(&y, (&lo, &hi))| y > lo && y < hi)
    }
}

/// Source mode -> ordered interval constraints.
///
/// Every mode owns an (initially empty) list from construction on.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRegistry {
    ode_nums: usize,
    k_out: usize,
    transforms: Vec<Vec<IntervalConstraint>>,
}

impl TransitionRegistry {
    pub fn new(ode_nums: usize, k_out: usize) -> Self {
        Self {
            ode_nums,
            k_out,
            transforms: vec![Vec::new(); ode_nums],
        }
    }

    pub fn ode_nums(&self) -> usize {
        self.ode_nums
    }

    pub fn k_out(&self) -> usize {
        self.k_out
    }

    /// Register a transition `source -> target` guarded by `rules`.
    ///
    /// Rules for a pair that is already registered tighten its existing
    /// constraint in place; a new pair is appended after the existing ones.
    /// Nothing is modified when any index is out of range.
    pub fn add_transform(&mut self, source: usize, target: usize, rules: &[Rule]) -> Result<()> {
        for mode in [source, target] {
            if mode >= self.ode_nums {
                return Err(HybridError::ModeOutOfRange {
                    index: mode,
                    ode_nums: self.ode_nums,
                });
            }
        }
        if let Some(rule) = rules.iter().find(|rule| rule.feature >= self.k_out) {
            return Err(HybridError::FeatureOutOfRange {
                index: rule.feature,
                k_out: self.k_out,
            });
        }

        let k_out = self.k_out;
        let constraints = &mut self.transforms[source];
        let position = match constraints.iter().position(|c| c.target == target) {
            Some(position) => position,
            None => {
                constraints.push(IntervalConstraint::unbounded(k_out, target));
                constraints.len() - 1
            }
        };
        let constraint = &mut constraints[position];
        for rule in rules {
            constraint.tighten(rule);
        }

        tracing::debug!(
            source,
            target,
            rules = rules.len(),
            min = ?constraint.min_values.as_slice(),
            max = ?constraint.max_values.as_slice(),
            "registered mode transition"
        );
        Ok(())
    }

    /// Constraints registered for `source`, in registration order.
    pub fn constraints(&self, source: usize) -> &[IntervalConstraint] {
        self.transforms
            .get(source)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_rules(&self, source: usize) -> bool {
        !self.constraints(source).is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.iter().all(Vec::is_empty)
    }
}

//! MPE inference boundary.
//!
//! A [`Reasoner`] takes the current ground rules and weights (a [`TermStore`])
//! and moves every random-variable atom to its most-probable-explanation
//! value, in place. [`AdmmReasoner`] is a consensus ADMM solver over the
//! kernels' hinge and linear-constraint potentials.

pub mod admm;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::atom::AtomStore;
use crate::error::ReasonerResult;
use crate::ground::GroundRuleStore;
use crate::rule::{RuleKind, RuleTable};

pub use admm::{AdmmReasoner, AdmmReasonerConfig};

/// Borrowed view of everything that defines the MPE objective.
#[derive(Debug, Clone, Copy)]
pub struct TermStore<'a> {
    pub rules: &'a RuleTable,
    pub ground_rules: &'a GroundRuleStore,
}

impl<'a> TermStore<'a> {
    pub fn new(rules: &'a RuleTable, ground_rules: &'a GroundRuleStore) -> Self {
        Self {
            rules,
            ground_rules,
        }
    }

    /// Total weighted incompatibility of the logical rules at the current
    /// atom values.
    pub fn objective(&self, atoms: &AtomStore) -> f64 {
        self.ground_rules
            .iter()
            .filter(|(rule, _)| {
                matches!(self.rules.get(*rule).map(|r| r.kind), Some(RuleKind::Logical { .. }))
            })
            .map(|(rule, kernels)| {
                self.rules.weight(rule) * kernels.iter().map(|k| k.incompatibility(atoms)).sum::<f64>()
            })
            .sum()
    }

    /// Largest hard-constraint violation at the current atom values.
    pub fn infeasibility(&self, atoms: &AtomStore) -> f64 {
        self.ground_rules
            .iter()
            .filter(|(rule, _)| {
                matches!(self.rules.get(*rule).map(|r| r.kind), Some(RuleKind::Constraint))
            })
            .flat_map(|(_, kernels)| kernels.iter().map(|k| k.incompatibility(atoms)))
            .fold(0.0, f64::max)
    }
}

/// Diagnostics of one MPE solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReasonerStats {
    pub iterations: usize,
    /// Objective value at the returned state.
    pub objective: f64,
    /// Largest hard-constraint violation at the returned state.
    pub infeasibility: f64,
}

/// An MPE solver.
pub trait Reasoner: Send + Sync + std::fmt::Debug {
    /// Converge the random-variable atoms to an MPE assignment in place.
    ///
    /// Blocks until done. Fails with `NonConvergent` rather than returning a
    /// partial result, and with `Cancelled` as soon as `cancel` fires.
    fn optimize(
        &self,
        terms: TermStore<'_>,
        atoms: &mut AtomStore,
        cancel: &CancellationToken,
    ) -> ReasonerResult<ReasonerStats>;
}

/// Cooperative cancellation flag, shared between a caller and a running solve.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

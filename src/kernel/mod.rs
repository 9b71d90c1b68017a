//! Ground kernels: rule templates bound to concrete atoms.
//!
//! A ground kernel is produced from exactly one [`Rule`](crate::rule::Rule) and
//! binds to a fixed set of atoms (its scope). It reports how strongly the
//! current atom values violate it (its incompatibility), how each atom in
//! scope moves that violation, and the [`Potential`] a solver optimizes. Only
//! atom values and the parent rule's weight change after creation.

pub mod constraint;
pub mod logical;

use serde::{Deserialize, Serialize};

use crate::atom::{AtomId, AtomStore};
use crate::error::KernelResult;
use crate::rule::{RuleId, RuleTable};

pub use constraint::{Comparison, GroundLinearConstraint};
pub use logical::{GroundLogicalRule, Literal};

/// How an atom's value affects a ground kernel's incompatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BindingMode {
    /// Raising the value never lowers the incompatibility.
    Increasing,
    /// Raising the value never raises the incompatibility.
    Decreasing,
    /// The effect depends on the other atoms' values.
    NonMonotone,
}

impl std::fmt::Display for BindingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindingMode::Increasing => write!(f, "increasing"),
            BindingMode::Decreasing => write!(f, "decreasing"),
            BindingMode::NonMonotone => write!(f, "non-monotone"),
        }
    }
}

/// Affine expression `sum(c_i * x_i) + offset` over random variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Affine {
    pub terms: Vec<(AtomId, f64)>,
    pub offset: f64,
}

impl Affine {
    /// Build an expression, merging repeated atoms and dropping zero
    /// coefficients.
    pub fn new(terms: impl IntoIterator<Item = (AtomId, f64)>, offset: f64) -> Self {
        let mut merged: Vec<(AtomId, f64)> = Vec::new();
        for (atom, coeff) in terms {
            match merged.iter_mut().find(|(id, _)| *id == atom) {
                Some((_, c)) => *c += coeff,
                None => merged.push((atom, coeff)),
            }
        }
        merged.retain(|(_, c)| *c != 0.0);
        Self {
            terms: merged,
            offset,
        }
    }

    pub fn eval(&self, atoms: &AtomStore) -> f64 {
        self.terms
            .iter()
            .map(|&(atom, c)| c * atoms.value(atom))
            .sum::<f64>()
            + self.offset
    }
}

/// Optimization form of a ground kernel.
#[derive(Debug, Clone, PartialEq)]
pub enum Potential {
    /// `max(0, expr)`, or its square; scaled by the rule weight.
    Hinge { expr: Affine, squared: bool },
    /// Hard constraint `expr {<=, =, >=} 0`.
    Constraint {
        expr: Affine,
        comparison: Comparison,
    },
}

impl Potential {
    /// Incompatibility of this potential at the current values: the hinge
    /// value, or the constraint's violation magnitude.
    pub fn value(&self, atoms: &AtomStore) -> f64 {
        match self {
            Potential::Hinge { expr, squared } => {
                let d = expr.eval(atoms).max(0.0);
                if *squared { d * d } else { d }
            }
            Potential::Constraint { expr, comparison } => {
                comparison.violation(expr.eval(atoms))
            }
        }
    }
}

/// A grounded instantiation of a rule.
pub trait GroundKernel: Send + Sync + std::fmt::Debug {
    /// The rule this kernel was grounded from.
    fn kernel(&self) -> RuleId;

    /// Full scope, fixed at creation. Each atom appears once.
    fn atoms(&self) -> &[AtomId];

    /// Atoms in scope that are random variables *right now*.
    ///
    /// Recomputed from the store on every call so a partition swap is always
    /// reflected.
    fn random_variables(&self, atoms: &AtomStore) -> Vec<AtomId> {
        self.atoms()
            .iter()
            .copied()
            .filter(|&id| atoms.is_random_variable(id))
            .collect()
    }

    /// Degree to which the current atom values violate this kernel. Always `>= 0`.
    fn incompatibility(&self, atoms: &AtomStore) -> f64;

    /// How `atom` affects the incompatibility.
    ///
    /// Fails with `InvalidBinding` if `atom` is not in [`atoms`](Self::atoms).
    fn binding(&self, atom: AtomId) -> KernelResult<BindingMode>;

    /// Called after the parent rule's parameters changed.
    ///
    /// Returns whether this instantiation's contribution to the objective
    /// changed since the previous call. Kernels without weight-dependent
    /// behavior fail with `UnsupportedParameterUpdate`.
    fn update_parameters(&mut self, rules: &RuleTable) -> KernelResult<bool>;

    /// The incompatibility as a function of the random variables in scope,
    /// with observed atoms folded into the offset.
    ///
    /// Must agree with [`incompatibility`](Self::incompatibility) at the
    /// current values.
    fn potential(&self, atoms: &AtomStore) -> Potential;

    /// This kernel as a weighted ground rule, if it is one.
    fn as_weighted(&self) -> Option<&dyn WeightedGroundRule> {
        None
    }
}

/// A ground kernel whose contribution to the objective is scaled by its
/// rule's weight.
pub trait WeightedGroundRule: GroundKernel {
    /// Current weight of the parent rule.
    fn weight(&self, rules: &RuleTable) -> f64 {
        rules.weight(self.kernel())
    }

    fn weighted_incompatibility(&self, atoms: &AtomStore, rules: &RuleTable) -> f64 {
        self.weight(rules) * self.incompatibility(atoms)
    }
}

/// Sort and deduplicate a scope.
pub(crate) fn dedup_scope(mut atoms: Vec<AtomId>) -> Vec<AtomId> {
    atoms.sort_unstable();
    atoms.dedup();
    atoms
}

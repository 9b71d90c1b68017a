//! Grounded linear hard constraints.

use serde::{Deserialize, Serialize};

use crate::atom::{AtomId, AtomStore};
use crate::error::{KernelError, KernelResult};
use crate::rule::{RuleId, RuleTable};

use super::{Affine, BindingMode, GroundKernel, Potential, dedup_scope};

/// Comparison operator of a linear constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Comparison {
    LessEq,
    Equal,
    GreaterEq,
}

impl Comparison {
    /// Violation magnitude of `lhs - rhs = excess`.
    pub fn violation(self, excess: f64) -> f64 {
        match self {
            Comparison::LessEq => excess.max(0.0),
            Comparison::GreaterEq => (-excess).max(0.0),
            Comparison::Equal => excess.abs(),
        }
    }
}

impl std::fmt::Display for Comparison {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Comparison::LessEq => write!(f, "<="),
            Comparison::Equal => write!(f, "="),
            Comparison::GreaterEq => write!(f, ">="),
        }
    }
}

/// `sum(c_i * v_i) {<=, =, >=} constant`, unweighted.
///
/// The incompatibility is the magnitude of the violation.
#[derive(Debug, Clone)]
pub struct GroundLinearConstraint {
    rule: RuleId,
    terms: Vec<(AtomId, f64)>,
    scope: Vec<AtomId>,
    comparison: Comparison,
    constant: f64,
}

impl GroundLinearConstraint {
    /// Ground a constraint. Repeated atoms are merged and zero coefficients
    /// dropped; non-finite coefficients or constants are rejected.
    pub fn new(
        rule: RuleId,
        terms: impl IntoIterator<Item = (AtomId, f64)>,
        comparison: Comparison,
        constant: f64,
    ) -> KernelResult<Self> {
        let expr = Affine::new(terms, 0.0);
        let non_finite = expr
            .terms
            .iter()
            .map(|(_, c)| *c)
            .chain(std::iter::once(constant))
            .find(|v| !v.is_finite());
        if let Some(value) = non_finite {
            return Err(KernelError::NonFiniteCoefficient {
                rule: rule.index(),
                value,
            });
        }
        let scope = dedup_scope(expr.terms.iter().map(|(a, _)| *a).collect());
        Ok(Self {
            rule,
            terms: expr.terms,
            scope,
            comparison,
            constant,
        })
    }

    pub fn terms(&self) -> &[(AtomId, f64)] {
        &self.terms
    }

    pub fn comparison(&self) -> Comparison {
        self.comparison
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    /// Signed amount by which the left-hand side exceeds the constant.
    fn excess(&self, atoms: &AtomStore) -> f64 {
        self.terms
            .iter()
            .map(|&(atom, c)| c * atoms.value(atom))
            .sum::<f64>()
            - self.constant
    }
}

impl GroundKernel for GroundLinearConstraint {
    fn kernel(&self) -> RuleId {
        self.rule
    }

    fn atoms(&self) -> &[AtomId] {
        &self.scope
    }

    fn incompatibility(&self, atoms: &AtomStore) -> f64 {
        self.comparison.violation(self.excess(atoms))
    }

    fn binding(&self, atom: AtomId) -> KernelResult<BindingMode> {
        let coeff = self
            .terms
            .iter()
            .find(|(id, _)| *id == atom)
            .map(|(_, c)| *c)
            .ok_or(KernelError::InvalidBinding {
                atom: atom.get(),
                rule: self.rule.index(),
            })?;
        Ok(match self.comparison {
            Comparison::Equal => BindingMode::NonMonotone,
            Comparison::LessEq if coeff > 0.0 => BindingMode::Increasing,
            Comparison::LessEq => BindingMode::Decreasing,
            Comparison::GreaterEq if coeff > 0.0 => BindingMode::Decreasing,
            Comparison::GreaterEq => BindingMode::Increasing,
        })
    }

    fn update_parameters(&mut self, _rules: &RuleTable) -> KernelResult<bool> {
        Err(KernelError::UnsupportedParameterUpdate {
            rule: self.rule.index(),
        })
    }

    fn potential(&self, atoms: &AtomStore) -> Potential {
        let mut offset = -self.constant;
        let mut terms = Vec::with_capacity(self.terms.len());
        for &(atom, c) in &self.terms {
            if atoms.is_random_variable(atom) {
                terms.push((atom, c));
            } else {
                offset += c * atoms.value(atom);
            }
        }
        Potential::Constraint {
            expr: Affine::new(terms, offset),
            comparison: self.comparison,
        }
    }
}

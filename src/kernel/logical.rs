//! Grounded logical rules under Lukasiewicz semantics.
//!
//! A logical rule grounds to a disjunctive clause of literals. The clause's
//! soft truth is `min(1, sum(v) over positive literals + sum(1 - v) over
//! negated literals)`, and its incompatibility is the distance to
//! satisfaction `d = 1 - truth`, or `d^2` for squared potentials. An
//! implication `A & B -> C` grounds to `!A | !B | C`.

use crate::atom::{AtomId, AtomStore};
use crate::error::{KernelError, KernelResult};
use crate::rule::{RuleId, RuleKind, RuleTable};

use super::{Affine, BindingMode, GroundKernel, Potential, WeightedGroundRule, dedup_scope};

/// One literal of a ground clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Literal {
    pub atom: AtomId,
    pub negated: bool,
}

impl Literal {
    pub fn positive(atom: AtomId) -> Self {
        Self {
            atom,
            negated: false,
        }
    }

    pub fn negative(atom: AtomId) -> Self {
        Self {
            atom,
            negated: true,
        }
    }
}

/// A weighted ground clause.
#[derive(Debug, Clone)]
pub struct GroundLogicalRule {
    rule: RuleId,
    literals: Vec<Literal>,
    scope: Vec<AtomId>,
    squared: bool,
    /// Rule weight version observed by the last `update_parameters` call.
    seen_version: u64,
}

impl GroundLogicalRule {
    /// Ground a clause of `rule` over the given literals.
    ///
    /// The potential shape (linear or squared) is taken from the rule.
    pub fn new(rule: RuleId, literals: Vec<Literal>, rules: &RuleTable) -> Self {
        let squared = matches!(
            rules.get(rule).map(|r| r.kind),
            Some(RuleKind::Logical { squared: true })
        );
        let scope = dedup_scope(literals.iter().map(|l| l.atom).collect());
        Self {
            rule,
            literals,
            scope,
            squared,
            seen_version: rules.version(rule),
        }
    }

    /// Ground the implication `body[0] & body[1] & ... -> head[0] | head[1] | ...`.
    pub fn implication(rule: RuleId, body: &[AtomId], head: &[AtomId], rules: &RuleTable) -> Self {
        let literals = body
            .iter()
            .map(|&a| Literal::negative(a))
            .chain(head.iter().map(|&a| Literal::positive(a)))
            .collect();
        Self::new(rule, literals, rules)
    }

    pub fn literals(&self) -> &[Literal] {
        &self.literals
    }

    pub fn is_squared(&self) -> bool {
        self.squared
    }

    /// Distance to satisfaction of the clause at the current values.
    pub fn distance(&self, atoms: &AtomStore) -> f64 {
        let truth: f64 = self
            .literals
            .iter()
            .map(|l| {
                let v = atoms.value(l.atom);
                if l.negated { 1.0 - v } else { v }
            })
            .sum();
        (1.0 - truth).max(0.0)
    }
}

impl GroundKernel for GroundLogicalRule {
    fn kernel(&self) -> RuleId {
        self.rule
    }

    fn atoms(&self) -> &[AtomId] {
        &self.scope
    }

    fn incompatibility(&self, atoms: &AtomStore) -> f64 {
        let d = self.distance(atoms);
        if self.squared { d * d } else { d }
    }

    fn binding(&self, atom: AtomId) -> KernelResult<BindingMode> {
        let mut as_negated = false;
        let mut as_positive = false;
        for l in self.literals.iter().filter(|l| l.atom == atom) {
            if l.negated {
                as_negated = true;
            } else {
                as_positive = true;
            }
        }
        match (as_negated, as_positive) {
            (true, true) => Ok(BindingMode::NonMonotone),
            (true, false) => Ok(BindingMode::Increasing),
            (false, true) => Ok(BindingMode::Decreasing),
            (false, false) => Err(KernelError::InvalidBinding {
                atom: atom.get(),
                rule: self.rule.index(),
            }),
        }
    }

    fn update_parameters(&mut self, rules: &RuleTable) -> KernelResult<bool> {
        let version = rules.version(self.rule);
        let changed = version != self.seen_version;
        self.seen_version = version;
        Ok(changed)
    }

    fn potential(&self, atoms: &AtomStore) -> Potential {
        // d = 1 - sum(v) over positive literals - sum(1 - v) over negated ones
        let mut offset = 1.0;
        let mut terms = Vec::with_capacity(self.literals.len());
        for l in &self.literals {
            let sign = if l.negated { 1.0 } else { -1.0 };
            if l.negated {
                offset -= 1.0;
            }
            if atoms.is_random_variable(l.atom) {
                terms.push((l.atom, sign));
            } else {
                offset += sign * atoms.value(l.atom);
            }
        }
        Potential::Hinge {
            expr: Affine::new(terms, offset),
            squared: self.squared,
        }
    }

    fn as_weighted(&self) -> Option<&dyn WeightedGroundRule> {
        Some(self)
    }
}

impl WeightedGroundRule for GroundLogicalRule {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Partition;

    struct Fixture {
        atoms: AtomStore,
        rules: RuleTable,
        rule: RuleId,
        friends: AtomId,
        smokes_a: AtomId,
        smokes_b: AtomId,
    }

    fn fixture(squared: bool) -> Fixture {
        let mut atoms = AtomStore::new();
        let mut rules = RuleTable::new();
        let rule = rules.add_logical("friends-smoke", 2.0, squared, true).unwrap();
        let friends = atoms
            .insert(
                "Friends",
                vec!["a".into(), "b".into()],
                1.0,
                Partition::Observed,
            )
            .unwrap();
        let smokes_a = atoms
            .insert("Smokes", vec!["a".into()], 0.9, Partition::RandomVariable)
            .unwrap();
        let smokes_b = atoms
            .insert("Smokes", vec!["b".into()], 0.2, Partition::RandomVariable)
            .unwrap();
        Fixture {
            atoms,
            rules,
            rule,
            friends,
            smokes_a,
            smokes_b,
        }
    }

    fn kernel(f: &Fixture) -> GroundLogicalRule {
        GroundLogicalRule::implication(f.rule, &[f.friends, f.smokes_a], &[f.smokes_b], &f.rules)
    }

    #[test]
    fn implication_distance() {
        let f = fixture(false);
        let k = kernel(&f);
        // 1 - (0 + 0.1 + 0.2) = 0.7
        assert!((k.incompatibility(&f.atoms) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn squared_potential() {
        let f = fixture(true);
        let k = kernel(&f);
        assert!(k.is_squared());
        assert!((k.incompatibility(&f.atoms) - 0.49).abs() < 1e-12);
    }

    #[test]
    fn satisfied_clause_has_zero_incompatibility() {
        let mut f = fixture(false);
        f.atoms.set_value(f.smokes_b, 1.0).unwrap();
        let k = kernel(&f);
        assert_eq!(k.incompatibility(&f.atoms), 0.0);
        assert_eq!(k.potential(&f.atoms).value(&f.atoms), 0.0);
    }

    #[test]
    fn incompatibility_is_never_negative() {
        let mut f = fixture(false);
        let k = kernel(&f);
        for step in 0..=10 {
            let v = step as f64 / 10.0;
            f.atoms.set_value(f.smokes_a, v).unwrap();
            f.atoms.set_value(f.smokes_b, 1.0 - v).unwrap();
            assert!(k.incompatibility(&f.atoms) >= 0.0);
        }
    }

    #[test]
    fn binding_modes() {
        let f = fixture(false);
        let k = kernel(&f);
        assert_eq!(k.binding(f.smokes_a).unwrap(), BindingMode::Increasing);
        assert_eq!(k.binding(f.smokes_b).unwrap(), BindingMode::Decreasing);

        let both = GroundLogicalRule::new(
            f.rule,
            vec![Literal::negative(f.smokes_a), Literal::positive(f.smokes_a)],
            &f.rules,
        );
        assert_eq!(both.binding(f.smokes_a).unwrap(), BindingMode::NonMonotone);
        assert_eq!(both.atoms().len(), 1);
    }

    #[test]
    fn binding_outside_scope_fails() {
        let f = fixture(false);
        let k = GroundLogicalRule::implication(f.rule, &[f.friends], &[f.smokes_b], &f.rules);
        assert!(matches!(
            k.binding(f.smokes_a),
            Err(KernelError::InvalidBinding { .. })
        ));
    }

    #[test]
    fn update_parameters_is_idempotent() {
        let mut f = fixture(false);
        let mut k = kernel(&f);
        assert!(!k.update_parameters(&f.rules).unwrap());

        f.rules.set_weight(f.rule, 3.0).unwrap();
        assert!(k.update_parameters(&f.rules).unwrap());
        assert!(!k.update_parameters(&f.rules).unwrap());
    }

    #[test]
    fn weight_is_read_through_the_rule_table() {
        let mut f = fixture(false);
        let k = kernel(&f);
        f.rules.set_weight(f.rule, 4.0).unwrap();
        let weighted = k.as_weighted().unwrap();
        assert_eq!(weighted.weight(&f.rules), 4.0);
        assert!((weighted.weighted_incompatibility(&f.atoms, &f.rules) - 2.8).abs() < 1e-12);
    }

    #[test]
    fn potential_folds_observed_atoms() {
        let f = fixture(false);
        let k = kernel(&f);
        // d = 1 - (1 - friends) - (1 - a) - b, with friends = 1 observed
        let Potential::Hinge { expr, squared } = k.potential(&f.atoms) else {
            panic!("logical rules ground to hinges");
        };
        assert!(!squared);
        assert_eq!(expr.terms, vec![(f.smokes_a, 1.0), (f.smokes_b, -1.0)]);
        assert!(expr.offset.abs() < 1e-12);
        assert!((expr.eval(&f.atoms) - k.incompatibility(&f.atoms)).abs() < 1e-12);
    }

    #[test]
    fn squared_potential_matches_incompatibility() {
        let mut f = fixture(true);
        let k = kernel(&f);
        for step in 0..=10 {
            f.atoms.set_value(f.smokes_b, step as f64 / 10.0).unwrap();
            let p = k.potential(&f.atoms);
            assert!((p.value(&f.atoms) - k.incompatibility(&f.atoms)).abs() < 1e-12);
        }
    }
}

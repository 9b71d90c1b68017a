//! Everything a learning run reads and mutates.

use crate::atom::{AtomStore, ObservedStore};
use crate::error::{LearnResult, ModelError, ModelResult, ReasonerResult};
use crate::ground::GroundRuleStore;
use crate::reasoner::{CancellationToken, Reasoner, ReasonerStats, TermStore};
use crate::rule::{RuleId, RuleTable};

/// The model under training: rules, their groundings, the random-variable
/// database, ground-truth labels, and the MPE solver.
///
/// The learning loop owns the context mutably for the whole run, so atom
/// values (mutated by the reasoner) and weights (mutated by the loop) are
/// never changed concurrently.
#[derive(Debug)]
pub struct LearningContext {
    pub(crate) rules: RuleTable,
    pub(crate) ground_rules: GroundRuleStore,
    pub(crate) atoms: AtomStore,
    pub(crate) observed: ObservedStore,
    reasoner: Box<dyn Reasoner>,
}

impl LearningContext {
    /// Assemble a context, checking that every grounding and label refers to
    /// known rules and atoms.
    pub fn new(
        rules: RuleTable,
        ground_rules: GroundRuleStore,
        atoms: AtomStore,
        observed: ObservedStore,
        reasoner: Box<dyn Reasoner>,
    ) -> ModelResult<Self> {
        for kernel in ground_rules.kernels() {
            let rule = kernel.kernel();
            if rules.get(rule).is_none() {
                return Err(ModelError::UnknownRule {
                    rule: rule.to_string(),
                });
            }
            if let Some(missing) = kernel.atoms().iter().find(|&&a| !atoms.contains(a)) {
                return Err(ModelError::UnknownAtom {
                    atom: missing.to_string(),
                });
            }
        }
        if let Some((missing, _)) = observed.iter().find(|(a, _)| !atoms.contains(*a)) {
            return Err(ModelError::UnknownAtom {
                atom: missing.to_string(),
            });
        }

        Ok(Self {
            rules,
            ground_rules,
            atoms,
            observed,
            reasoner,
        })
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub fn ground_rules(&self) -> &GroundRuleStore {
        &self.ground_rules
    }

    pub fn atoms(&self) -> &AtomStore {
        &self.atoms
    }

    pub fn observed(&self) -> &ObservedStore {
        &self.observed
    }

    /// Set a rule weight outside of learning (e.g. to restore a checkpoint).
    pub fn set_weight(&mut self, rule: RuleId, weight: f64) -> ModelResult<bool> {
        let changed = self.rules.set_weight(rule, weight)?;
        if changed {
            self.ground_rules.update_parameters(rule, &self.rules);
        }
        Ok(changed)
    }

    /// Rules whose weights learning may change.
    pub fn mutable_rules(&self) -> Vec<RuleId> {
        self.rules.mutable_rules()
    }

    /// Current `(rule, weight)` pairs of the mutable rules.
    pub fn weights(&self) -> Vec<(RuleId, f64)> {
        self.mutable_rules()
            .into_iter()
            .map(|r| (r, self.rules.weight(r)))
            .collect()
    }

    /// Clamp every random variable to its observed label.
    ///
    /// Unlabeled random variables keep their current value. Returns how many
    /// there were.
    pub fn set_labeled_random_variables(&mut self) -> LearnResult<usize> {
        let mut unlabeled = 0;
        for id in self.atoms.random_variables() {
            match self.observed.get(id) {
                Some(value) => self.atoms.set_value(id, value)?,
                None => unlabeled += 1,
            }
        }
        if unlabeled > 0 {
            tracing::warn!(
                unlabeled,
                "random variables without an observed label keep their current value"
            );
        }
        Ok(unlabeled)
    }

    /// Run the reasoner to an MPE state at the current weights.
    pub fn run_mpe(&mut self, cancel: &CancellationToken) -> ReasonerResult<ReasonerStats> {
        let terms = TermStore::new(&self.rules, &self.ground_rules);
        self.reasoner.optimize(terms, &mut self.atoms, cancel)
    }

    /// Take the model apart again.
    pub fn into_parts(self) -> (RuleTable, GroundRuleStore, AtomStore, ObservedStore) {
        (self.rules, self.ground_rules, self.atoms, self.observed)
    }
}

//! Maximum-likelihood weight learning with an MPE estimate of the expectation.
//!
//! The gradient of the log-likelihood with respect to a rule weight is the gap
//! between the rule's total incompatibility in the data and its expectation
//! under the model. The expectation is intractable, so it is estimated with
//! the total incompatibility at the MPE state.

use crate::error::LearnResult;
use crate::reasoner::{CancellationToken, ReasonerStats};
use crate::rule::RuleId;

use super::{LearningContext, LearningObjective, total_incompatibilities};

/// Voted-perceptron maximum-likelihood objective.
#[derive(Debug, Clone, Default)]
pub struct MaxLikelihoodMpe {
    full_observed: Vec<f64>,
    full_expected: Vec<f64>,
    num_groundings: Vec<usize>,
    last_solve: Option<ReasonerStats>,
}

impl MaxLikelihoodMpe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observed incompatibility per mutable rule, from the last computation.
    pub fn observed_incompatibility(&self) -> &[f64] {
        &self.full_observed
    }

    /// MPE-state incompatibility per mutable rule, from the last computation.
    pub fn expected_incompatibility(&self) -> &[f64] {
        &self.full_expected
    }

    /// Diagnostics of the most recent MPE solve.
    pub fn last_solve(&self) -> Option<ReasonerStats> {
        self.last_solve
    }
}

impl LearningObjective for MaxLikelihoodMpe {
    fn name(&self) -> &'static str {
        "max-likelihood-mpe"
    }

    fn compute_observed_incomp(
        &mut self,
        ctx: &mut LearningContext,
        rules: &[RuleId],
    ) -> LearnResult<Vec<f64>> {
        ctx.set_labeled_random_variables()?;

        self.num_groundings = rules
            .iter()
            .map(|&r| ctx.ground_rules.ground_rules(r).len())
            .collect();
        self.full_observed = total_incompatibilities(ctx, rules)?;
        Ok(self.full_observed.clone())
    }

    fn compute_expected_incomp(
        &mut self,
        ctx: &mut LearningContext,
        rules: &[RuleId],
        cancel: &CancellationToken,
    ) -> LearnResult<Vec<f64>> {
        let stats = ctx.run_mpe(cancel)?;
        tracing::debug!(
            iterations = stats.iterations,
            objective = stats.objective,
            "MPE state computed"
        );
        self.last_solve = Some(stats);

        self.full_expected = total_incompatibilities(ctx, rules)?;
        Ok(self.full_expected.clone())
    }

    fn compute_loss(&self, ctx: &LearningContext, rules: &[RuleId]) -> f64 {
        rules
            .iter()
            .zip(self.full_observed.iter().zip(&self.full_expected))
            .map(|(&rule, (observed, expected))| ctx.rules.weight(rule) * (observed - expected))
            .sum()
    }

    fn num_groundings(&self) -> &[usize] {
        &self.num_groundings
    }
}

//! Voted-perceptron weight learning.
//!
//! The iteration control lives in [`learn_weights`], implemented once. The
//! numbers it works with come from a [`LearningObjective`]: the observed
//! incompatibility of every learnable rule at the labeled state, the expected
//! incompatibility (typically estimated at an MPE state), and a scalar loss.
//! [`MaxLikelihoodMpe`] is the maximum-likelihood objective; other objectives
//! plug in by supplying the same three computations over the same grounding
//! and reasoning primitives.
//!
//! Each iteration:
//!
//! 1. re-runs MPE inference if any weight changed since the last solve,
//! 2. forms the per-rule signal `observed - expected` (minus regularization),
//! 3. stops if the signal's norm is below the tolerance,
//! 4. moves every rule with groundings along its signal by the scheduled step,
//!    projecting onto `w >= 0` when configured. Nothing is committed unless
//!    every gradient component and updated weight is finite.

pub mod config;
pub mod context;
pub mod max_likelihood;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{LearnError, LearnResult};
use crate::reasoner::CancellationToken;
use crate::rule::RuleId;

pub use config::{LearnConfig, StepSchedule};
pub use context::LearningContext;
pub use max_likelihood::MaxLikelihoodMpe;

/// The numeric hooks of the learning loop.
///
/// All three computations are indexed like `rules`, the context's mutable
/// rules in a fixed order.
pub trait LearningObjective {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Per-rule incompatibility at the observed (labeled) state.
    ///
    /// Also records the number of groundings per rule, see
    /// [`num_groundings`](Self::num_groundings).
    fn compute_observed_incomp(
        &mut self,
        ctx: &mut LearningContext,
        rules: &[RuleId],
    ) -> LearnResult<Vec<f64>>;

    /// Per-rule expected incompatibility under the current weights.
    fn compute_expected_incomp(
        &mut self,
        ctx: &mut LearningContext,
        rules: &[RuleId],
        cancel: &CancellationToken,
    ) -> LearnResult<Vec<f64>>;

    /// Scalar loss from the most recent observed and expected computations.
    fn compute_loss(&self, ctx: &LearningContext, rules: &[RuleId]) -> f64;

    /// Groundings per rule, as counted by the last observed computation.
    fn num_groundings(&self) -> &[usize];
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Termination {
    /// The gradient norm fell below the tolerance.
    Converged,
    /// The iteration budget ran out.
    BudgetExhausted,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Converged => write!(f, "converged"),
            Termination::BudgetExhausted => write!(f, "iteration budget exhausted"),
        }
    }
}

/// Outcome of a learning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningReport {
    /// Final `(rule, weight)` of every mutable rule.
    pub weights: Vec<(RuleId, f64)>,
    pub iterations: usize,
    pub termination: Termination,
    /// Loss at each iteration, before that iteration's update.
    pub loss_history: Vec<f64>,
    pub final_loss: f64,
    /// Norm of the last gradient signal.
    pub gradient_norm: f64,
    /// How many times MPE inference ran.
    pub mpe_solves: usize,
}

/// Learn the weights of `ctx`'s mutable rules.
///
/// Weights are updated in place and also returned in the report. An error
/// (cancellation, a failed MPE solve, a non-finite incompatibility, gradient
/// or updated weight) aborts the current iteration before any of its updates
/// are committed.
pub fn learn_weights<O>(
    objective: &mut O,
    ctx: &mut LearningContext,
    config: &LearnConfig,
    cancel: &CancellationToken,
) -> LearnResult<LearningReport>
where
    O: LearningObjective + ?Sized,
{
    config.validate()?;
    let rules = ctx.mutable_rules();

    tracing::info!(
        objective = objective.name(),
        rules = rules.len(),
        groundings = ctx.ground_rules.len(),
        max_iterations = config.max_iterations,
        schedule = %config.schedule,
        "starting weight learning"
    );

    if rules.is_empty() {
        tracing::warn!("no learnable rules, nothing to do");
        return Ok(LearningReport {
            weights: Vec::new(),
            iterations: 0,
            termination: Termination::Converged,
            loss_history: Vec::new(),
            final_loss: 0.0,
            gradient_norm: 0.0,
            mpe_solves: 0,
        });
    }

    // Observed incompatibility does not depend on the weights, and nothing
    // else can touch the data while we hold `ctx`.
    let observed = objective.compute_observed_incomp(ctx, &rules)?;
    ensure_finite(&rules, &observed, "observed")?;

    let mut expected: Vec<f64> = Vec::new();
    let mut solved_at: Option<u64> = None;
    let mut mpe_solves = 0;
    let mut loss_history = Vec::with_capacity(config.max_iterations);
    let mut weight_sums = vec![0.0; rules.len()];
    let mut gradient_norm = f64::INFINITY;
    let mut iterations = 0;
    let mut termination = Termination::BudgetExhausted;

    for t in 1..=config.max_iterations {
        if cancel.is_cancelled() {
            return Err(LearnError::Cancelled { iteration: t });
        }

        if solved_at != Some(ctx.rules.generation()) {
            expected = objective.compute_expected_incomp(ctx, &rules, cancel)?;
            ensure_finite(&rules, &expected, "expected")?;
            solved_at = Some(ctx.rules.generation());
            mpe_solves += 1;
        } else {
            tracing::debug!(iteration = t, "weights unchanged, reusing MPE state");
        }

        let loss = objective.compute_loss(ctx, &rules);
        loss_history.push(loss);
        iterations = t;

        let counts = objective.num_groundings();
        let gradient: Vec<Option<f64>> = rules
            .iter()
            .enumerate()
            .map(|(i, &rule)| {
                if counts.get(i).copied().unwrap_or(0) == 0 {
                    return None;
                }
                let w = ctx.rules.weight(rule);
                Some(
                    observed[i]
                        - expected[i]
                        - config.l2_regularization * w
                        - config.l1_regularization,
                )
            })
            .collect();
        for (&rule, g) in rules.iter().zip(&gradient) {
            if let Some(g) = *g {
                check_finite(rule, g, "gradient")?;
            }
        }
        gradient_norm = gradient.iter().flatten().map(|g| g * g).sum::<f64>().sqrt();

        tracing::debug!(iteration = t, loss, gradient_norm, "weight learning step");

        if gradient_norm < config.tolerance {
            accumulate(&mut weight_sums, ctx, &rules);
            termination = Termination::Converged;
            break;
        }

        let eta = config.schedule.step(config.step_size, t);
        let updates: Vec<(RuleId, f64)> = rules
            .iter()
            .zip(&gradient)
            .enumerate()
            .filter_map(|(i, (&rule, g))| {
                let g = (*g)?;
                let mut step = eta;
                if config.scale_gradient {
                    step /= counts[i] as f64;
                }
                Some((rule, ctx.rules.weight(rule) + step * g))
            })
            .collect();
        // Checked before projection, which would map -inf to zero.
        for &(rule, w) in &updates {
            check_finite(rule, w, "update")?;
        }

        let mut changed = Vec::new();
        for (rule, mut w) in updates {
            if config.non_negative_weights {
                w = w.max(0.0);
            }
            if ctx.rules.set_weight(rule, w)? {
                changed.push(rule);
            }
        }
        for &rule in &changed {
            let affected = ctx.ground_rules.update_parameters(rule, &ctx.rules);
            tracing::trace!(%rule, affected, "ground rules notified of new weight");
        }
        accumulate(&mut weight_sums, ctx, &rules);
    }

    if config.average_steps && iterations > 0 {
        for (&rule, sum) in rules.iter().zip(&weight_sums) {
            ctx.set_weight(rule, sum / iterations as f64)?;
        }
    }

    let weights = ctx.weights();
    let final_loss = loss_history.last().copied().unwrap_or(0.0);
    tracing::info!(
        iterations,
        %termination,
        final_loss,
        gradient_norm,
        mpe_solves,
        "weight learning finished"
    );

    Ok(LearningReport {
        weights,
        iterations,
        termination,
        loss_history,
        final_loss,
        gradient_norm,
        mpe_solves,
    })
}

fn accumulate(sums: &mut [f64], ctx: &LearningContext, rules: &[RuleId]) {
    for (sum, &rule) in sums.iter_mut().zip(rules) {
        *sum += ctx.rules.weight(rule);
    }
}

fn ensure_finite(rules: &[RuleId], values: &[f64], phase: &str) -> LearnResult<()> {
    rules
        .iter()
        .zip(values)
        .try_for_each(|(&rule, &value)| check_finite(rule, value, phase))
}

fn check_finite(rule: RuleId, value: f64, phase: &str) -> LearnResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(LearnError::NumericInstability {
            rule: rule.index(),
            phase: phase.to_string(),
            value,
        })
    }
}

/// Sum each rule's weighted ground-rule incompatibilities at the current atom
/// values, in parallel across instances.
pub(crate) fn total_incompatibilities(
    ctx: &LearningContext,
    rules: &[RuleId],
) -> LearnResult<Vec<f64>> {
    rules
        .iter()
        .map(|&rule| {
            let kernels = ctx.ground_rules.ground_rules(rule);
            if kernels.iter().any(|k| k.as_weighted().is_none()) {
                return Err(LearnError::UnweightedGrounding { rule: rule.index() });
            }
            Ok(kernels
                .par_iter()
                .map(|k| k.incompatibility(&ctx.atoms))
                .sum::<f64>())
        })
        .collect()
}

//! Consensus ADMM MPE solver.
//!
//! Every ground kernel keeps a local copy of the random variables in its
//! potential. One iteration minimizes each potential plus a proximal term
//! around the consensus (in closed form for hinges and linear constraints),
//! averages the local copies back into the consensus clamped to `[0, 1]`, and
//! updates the scaled duals. Hard constraints are enforced by projection.
//!
//! Weights are divided by the largest weight before solving. The MPE state
//! does not depend on the scale of the weights, so neither do the iterates
//! nor the stopping test. A solve has converged once the primal residual
//! (local copies vs. consensus) and the dual residual (movement of the
//! consensus) both fall below `epsilon_abs * sqrt(copies) + epsilon_rel * scale`.

use serde::{Deserialize, Serialize};

use crate::atom::AtomStore;
use crate::error::{ReasonerError, ReasonerResult};
use crate::kernel::{Comparison, Potential};

use super::{CancellationToken, Reasoner, ReasonerStats, TermStore};

/// Configuration for the [`AdmmReasoner`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmmReasonerConfig {
    /// Iteration budget per solve (default: 25,000).
    pub max_iterations: usize,
    /// ADMM penalty parameter `rho` (default: 1.0).
    pub step_size: f64,
    /// Absolute residual tolerance (default: 1e-5).
    pub epsilon_abs: f64,
    /// Relative residual tolerance (default: 1e-3).
    pub epsilon_rel: f64,
}

impl Default for AdmmReasonerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25_000,
            step_size: 1.0,
            epsilon_abs: 1e-5,
            epsilon_rel: 1e-3,
        }
    }
}

/// MPE solver for hinge-loss potentials and linear hard constraints.
#[derive(Debug, Clone, Default)]
pub struct AdmmReasoner {
    config: AdmmReasonerConfig,
}

impl AdmmReasoner {
    pub fn new(config: AdmmReasonerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AdmmReasonerConfig {
        &self.config
    }
}

#[derive(Debug, Clone, Copy)]
enum Shape {
    Linear,
    Squared,
    Constraint(Comparison),
}

/// One potential with its local variable copies and scaled duals.
#[derive(Debug)]
struct LocalTerm {
    shape: Shape,
    weight: f64,
    coeffs: Vec<f64>,
    offset: f64,
    norm_sq: f64,
    /// Consensus positions of the local copies.
    vars: Vec<usize>,
    x: Vec<f64>,
    u: Vec<f64>,
}

impl LocalTerm {
    fn value(&self) -> f64 {
        self.coeffs
            .iter()
            .zip(&self.x)
            .map(|(c, x)| c * x)
            .sum::<f64>()
            + self.offset
    }

    /// `x = argmin w * phi(x) + rho / 2 * |x - (z - u)|^2`.
    fn minimize(&mut self, z: &[f64], rho: f64) {
        for ((x, u), &v) in self.x.iter_mut().zip(&self.u).zip(&self.vars) {
            *x = z[v] - u;
        }
        let value = self.value();
        let shift = match self.shape {
            Shape::Linear => {
                if value <= 0.0 {
                    return;
                }
                let step = self.weight / rho;
                if value - step * self.norm_sq >= 0.0 {
                    step
                } else {
                    // The minimum sits on the hinge.
                    value / self.norm_sq
                }
            }
            Shape::Squared => {
                if value <= 0.0 {
                    return;
                }
                2.0 * self.weight * value / (rho + 2.0 * self.weight * self.norm_sq)
            }
            Shape::Constraint(comparison) => {
                if comparison.violation(value) == 0.0 {
                    return;
                }
                value / self.norm_sq
            }
        };
        for (x, c) in self.x.iter_mut().zip(&self.coeffs) {
            *x -= shift * c;
        }
    }
}

/// Collect the potentials of every ground kernel over the random variables.
///
/// `index[slot]` is the consensus position of the atom in that slot.
fn local_terms(
    terms: TermStore<'_>,
    atoms: &AtomStore,
    index: &[Option<usize>],
) -> ReasonerResult<Vec<LocalTerm>> {
    let mut local = Vec::new();
    for (rule, kernels) in terms.ground_rules.iter() {
        let rule_weight = terms.rules.weight(rule);
        for kernel in kernels {
            let (shape, weight, expr) = match kernel.potential(atoms) {
                Potential::Hinge { expr, squared } => {
                    if rule_weight < 0.0 {
                        return Err(ReasonerError::NegativeWeight {
                            rule: rule.index(),
                            weight: rule_weight,
                        });
                    }
                    if rule_weight == 0.0 {
                        continue;
                    }
                    let shape = if squared { Shape::Squared } else { Shape::Linear };
                    (shape, rule_weight, expr)
                }
                Potential::Constraint { expr, comparison } => {
                    (Shape::Constraint(comparison), 0.0, expr)
                }
            };

            let mut vars = Vec::with_capacity(expr.terms.len());
            let mut coeffs = Vec::with_capacity(expr.terms.len());
            let mut offset = expr.offset;
            for (atom, c) in expr.terms {
                match atoms.slot(atom).and_then(|s| index[s]) {
                    Some(v) => {
                        vars.push(v);
                        coeffs.push(c);
                    }
                    // Kernels that did not fold an observed atom themselves.
                    None => offset += c * atoms.value(atom),
                }
            }
            let norm_sq: f64 = coeffs.iter().map(|c| c * c).sum();
            if vars.is_empty() || norm_sq == 0.0 {
                continue;
            }
            local.push(LocalTerm {
                shape,
                weight,
                offset,
                norm_sq,
                x: vec![0.0; vars.len()],
                u: vec![0.0; vars.len()],
                coeffs,
                vars,
            });
        }
    }

    let max_weight = local.iter().map(|t| t.weight).fold(0.0, f64::max);
    if max_weight > 0.0 {
        for term in &mut local {
            term.weight /= max_weight;
        }
    }
    Ok(local)
}

impl Reasoner for AdmmReasoner {
    fn optimize(
        &self,
        terms: TermStore<'_>,
        atoms: &mut AtomStore,
        cancel: &CancellationToken,
    ) -> ReasonerResult<ReasonerStats> {
        let rho = self.config.step_size;
        let variables = atoms.random_variables();
        let mut index = vec![None; atoms.len()];
        let mut slots = Vec::with_capacity(variables.len());
        let mut z = Vec::with_capacity(variables.len());
        for id in &variables {
            if let Some(slot) = atoms.slot(*id) {
                index[slot] = Some(z.len());
                slots.push(slot);
                z.push(atoms.value(*id));
            }
        }

        let mut local = local_terms(terms, atoms, &index)?;
        let mut copies = vec![0usize; z.len()];
        for term in &local {
            for &v in &term.vars {
                copies[v] += 1;
            }
        }
        let sqrt_copies = (copies.iter().sum::<usize>() as f64).sqrt();
        tracing::trace!(
            terms = local.len(),
            variables = z.len(),
            "starting ADMM solve"
        );

        let mut sums = vec![0.0_f64; z.len()];
        let mut residual = f64::INFINITY;

        for t in 1..=self.config.max_iterations {
            if cancel.is_cancelled() {
                return Err(ReasonerError::Cancelled);
            }

            for term in &mut local {
                term.minimize(&z, rho);
            }

            sums.iter_mut().for_each(|s| *s = 0.0);
            for term in &local {
                for ((&v, x), u) in term.vars.iter().zip(&term.x).zip(&term.u) {
                    sums[v] += x + u;
                }
            }
            let mut dual_sq = 0.0;
            for (v, zv) in z.iter_mut().enumerate() {
                if copies[v] == 0 {
                    continue;
                }
                let next = (sums[v] / copies[v] as f64).clamp(0.0, 1.0);
                dual_sq += copies[v] as f64 * (next - *zv).powi(2);
                *zv = next;
            }

            let (mut primal_sq, mut x_sq, mut z_sq, mut u_sq) = (0.0, 0.0, 0.0, 0.0);
            for term in &mut local {
                for ((&v, x), u) in term.vars.iter().zip(&term.x).zip(term.u.iter_mut()) {
                    let diff = x - z[v];
                    *u += diff;
                    primal_sq += diff * diff;
                    x_sq += x * x;
                    z_sq += z[v] * z[v];
                    u_sq += *u * *u;
                }
            }

            let primal = primal_sq.sqrt();
            let dual = rho * dual_sq.sqrt();
            if !(primal.is_finite() && dual.is_finite()) {
                return Err(ReasonerError::NumericInstability {
                    quantity: "residual".into(),
                    iteration: t,
                });
            }
            residual = primal.max(dual);

            let eps_abs = self.config.epsilon_abs * sqrt_copies;
            let eps_primal = eps_abs + self.config.epsilon_rel * x_sq.sqrt().max(z_sq.sqrt());
            let eps_dual = eps_abs + self.config.epsilon_rel * rho * u_sq.sqrt();

            if primal <= eps_primal && dual <= eps_dual {
                for (&slot, &value) in slots.iter().zip(&z) {
                    atoms.write_slot(slot, value);
                }
                let objective = terms.objective(atoms);
                if !objective.is_finite() {
                    return Err(ReasonerError::NumericInstability {
                        quantity: "objective".into(),
                        iteration: t,
                    });
                }
                let infeasibility = terms.infeasibility(atoms);
                tracing::trace!(
                    iterations = t,
                    objective,
                    infeasibility,
                    primal,
                    dual,
                    "ADMM solve converged"
                );
                return Ok(ReasonerStats {
                    iterations: t,
                    objective,
                    infeasibility,
                });
            }
        }

        Err(ReasonerError::NonConvergent {
            iterations: self.config.max_iterations,
            residual,
        })
    }
}

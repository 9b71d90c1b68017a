//! End-to-end integration tests for softlogic.
//!
//! These tests drive weight learning through the public API only: models
//! built by hand and from files, the ADMM reasoner, and kernels,
//! reasoners, and objectives defined outside the crate.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use softlogic::atom::{AtomId, AtomStore, ObservedStore, Partition};
use softlogic::config::Settings;
use softlogic::error::{KernelError, KernelResult, LearnError, LearnResult, ReasonerResult};
use softlogic::ground::GroundRuleStore;
use softlogic::kernel::{
    Affine, BindingMode, Comparison, GroundKernel, GroundLinearConstraint, GroundLogicalRule,
    Literal, Potential, WeightedGroundRule,
};
use softlogic::learn::{
    LearnConfig, LearningContext, LearningObjective, MaxLikelihoodMpe, StepSchedule, Termination,
    learn_weights,
};
use softlogic::model::{ModelFile, weights_by_name};
use softlogic::reasoner::{AdmmReasoner, CancellationToken, Reasoner, ReasonerStats, TermStore};
use softlogic::rule::{RuleId, RuleTable};

// ---------------------------------------------------------------------------
// Kernels, reasoners and objectives defined outside the crate
// ---------------------------------------------------------------------------

/// Incompatibility `scale * value(atom)`.
#[derive(Debug)]
struct Scaled {
    rule: RuleId,
    atom: [AtomId; 1],
    scale: f64,
}

impl GroundKernel for Scaled {
    fn kernel(&self) -> RuleId {
        self.rule
    }

    fn atoms(&self) -> &[AtomId] {
        &self.atom
    }

    fn incompatibility(&self, atoms: &AtomStore) -> f64 {
        self.scale * atoms.value(self.atom[0])
    }

    fn binding(&self, atom: AtomId) -> KernelResult<BindingMode> {
        if atom == self.atom[0] {
            Ok(BindingMode::Increasing)
        } else {
            Err(KernelError::InvalidBinding {
                atom: atom.get(),
                rule: self.rule.index(),
            })
        }
    }

    fn update_parameters(&mut self, _rules: &RuleTable) -> KernelResult<bool> {
        Ok(false)
    }

    fn potential(&self, _atoms: &AtomStore) -> Potential {
        Potential::Hinge {
            expr: Affine::new([(self.atom[0], self.scale)], 0.0),
            squared: false,
        }
    }

    fn as_weighted(&self) -> Option<&dyn WeightedGroundRule> {
        Some(self)
    }
}

impl WeightedGroundRule for Scaled {}

/// Moves every random variable to a fixed value.
#[derive(Debug)]
struct Constant {
    value: f64,
    solves: Arc<AtomicUsize>,
}

impl Reasoner for Constant {
    fn optimize(
        &self,
        terms: TermStore<'_>,
        atoms: &mut AtomStore,
        _cancel: &CancellationToken,
    ) -> ReasonerResult<ReasonerStats> {
        self.solves.fetch_add(1, Ordering::SeqCst);
        for id in atoms.random_variables() {
            atoms.set_value(id, self.value).unwrap();
        }
        Ok(ReasonerStats {
            iterations: 1,
            objective: terms.objective(atoms),
            infeasibility: terms.infeasibility(atoms),
        })
    }
}

/// Reports fixed incompatibilities regardless of the data.
struct FixedGap {
    observed: f64,
    expected: f64,
    groundings: Vec<usize>,
}

impl LearningObjective for FixedGap {
    fn name(&self) -> &'static str {
        "fixed-gap"
    }

    fn compute_observed_incomp(
        &mut self,
        ctx: &mut LearningContext,
        rules: &[RuleId],
    ) -> LearnResult<Vec<f64>> {
        self.groundings = rules
            .iter()
            .map(|&r| ctx.ground_rules().ground_rules(r).len())
            .collect();
        Ok(vec![self.observed; rules.len()])
    }

    fn compute_expected_incomp(
        &mut self,
        ctx: &mut LearningContext,
        rules: &[RuleId],
        cancel: &CancellationToken,
    ) -> LearnResult<Vec<f64>> {
        ctx.run_mpe(cancel)?;
        Ok(vec![self.expected; rules.len()])
    }

    fn compute_loss(&self, ctx: &LearningContext, rules: &[RuleId]) -> f64 {
        rules
            .iter()
            .map(|&r| ctx.rules().weight(r) * (self.observed - self.expected))
            .sum()
    }

    fn num_groundings(&self) -> &[usize] {
        &self.groundings
    }
}

/// One learnable rule with one `Scaled` grounding per `(label, scale)` pair;
/// the reasoner moves every atom to `mpe_value`.
fn scaled_context(
    weight: f64,
    groundings: &[(f64, f64)],
    mpe_value: f64,
) -> (LearningContext, RuleId, Arc<AtomicUsize>) {
    let mut rules = RuleTable::new();
    let rule = rules.add_logical("scaled", weight, false, true).unwrap();
    let mut atoms = AtomStore::new();
    let mut observed = ObservedStore::new();
    let mut ground = GroundRuleStore::new();
    for (i, &(label, scale)) in groundings.iter().enumerate() {
        let id = atoms
            .insert("X", vec![i.to_string()], 0.0, Partition::RandomVariable)
            .unwrap();
        observed.insert(id, label).unwrap();
        ground.add(Box::new(Scaled {
            rule,
            atom: [id],
            scale,
        }));
    }
    let solves = Arc::new(AtomicUsize::new(0));
    let reasoner = Constant {
        value: mpe_value,
        solves: solves.clone(),
    };
    let ctx = LearningContext::new(rules, ground, atoms, observed, Box::new(reasoner)).unwrap();
    (ctx, rule, solves)
}

fn unscaled(step_size: f64, max_iterations: usize) -> LearnConfig {
    LearnConfig {
        step_size,
        max_iterations,
        scale_gradient: false,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Learning through external kernels and reasoners
// ---------------------------------------------------------------------------

#[test]
fn two_groundings_lower_the_weight() {
    let (mut ctx, rule, solves) = scaled_context(1.0, &[(0.2, 1.0), (0.4, 1.0)], 0.5);
    let mut objective = MaxLikelihoodMpe::new();
    let report = learn_weights(
        &mut objective,
        &mut ctx,
        &unscaled(0.5, 1),
        &CancellationToken::new(),
    )
    .unwrap();

    assert!((objective.observed_incompatibility()[0] - 0.6).abs() < 1e-12);
    assert!((objective.expected_incompatibility()[0] - 1.0).abs() < 1e-12);
    assert!((report.final_loss + 0.4).abs() < 1e-12);
    assert_eq!(report.termination, Termination::BudgetExhausted);
    assert_eq!(solves.load(Ordering::SeqCst), 1);
    assert!(ctx.rules().weight(rule) < 1.0);
    assert_eq!(report.weights, vec![(rule, ctx.rules().weight(rule))]);
}

#[test]
fn custom_objective_follows_update_law() {
    let (mut ctx, rule, _) = scaled_context(1.0, &[(1.0, 1.0)], 0.0);
    let mut objective = FixedGap {
        observed: 5.0,
        expected: 3.0,
        groundings: Vec::new(),
    };
    let report = learn_weights(
        &mut objective,
        &mut ctx,
        &unscaled(0.5, 1),
        &CancellationToken::new(),
    )
    .unwrap();

    // max(0, 1.0 + 0.5 * (5 - 3))
    assert_eq!(ctx.rules().weight(rule), 2.0);
    // Loss is taken before the update.
    assert_eq!(report.loss_history, vec![2.0]);
}

#[test]
fn projection_clamps_weights_at_zero() {
    let (mut ctx, rule, _) = scaled_context(0.1, &[(0.0, 1.0)], 1.0);
    let report = learn_weights(
        &mut MaxLikelihoodMpe::new(),
        &mut ctx,
        &unscaled(1.0, 5),
        &CancellationToken::new(),
    )
    .unwrap();
    assert_eq!(ctx.rules().weight(rule), 0.0);
    assert_eq!(report.iterations, 5);
}

#[test]
fn cancelled_run_commits_nothing() {
    let (mut ctx, rule, solves) = scaled_context(1.0, &[(0.2, 1.0)], 0.5);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = learn_weights(
        &mut MaxLikelihoodMpe::new(),
        &mut ctx,
        &LearnConfig::default(),
        &cancel,
    )
    .unwrap_err();
    assert!(matches!(err, LearnError::Cancelled { iteration: 1 }));
    assert_eq!(ctx.rules().weight(rule), 1.0);
    assert_eq!(solves.load(Ordering::SeqCst), 0);
}

#[test]
fn unweighted_instance_of_learnable_rule_is_rejected() {
    let mut rules = RuleTable::new();
    let rule = rules.add_logical("r", 1.0, false, true).unwrap();
    let mut atoms = AtomStore::new();
    let x = atoms
        .insert("X", vec![], 0.5, Partition::RandomVariable)
        .unwrap();
    let mut ground = GroundRuleStore::new();
    ground.add(Box::new(GroundLinearConstraint::new(
        rule,
        [(x, 1.0)],
        Comparison::LessEq,
        1.0,
    )
    .unwrap()));
    let mut ctx = LearningContext::new(
        rules,
        ground,
        atoms,
        ObservedStore::new(),
        Box::new(AdmmReasoner::default()),
    )
    .unwrap();

    let err = learn_weights(
        &mut MaxLikelihoodMpe::new(),
        &mut ctx,
        &LearnConfig::default(),
        &CancellationToken::new(),
    )
    .unwrap_err();
    assert!(matches!(err, LearnError::UnweightedGrounding { rule: 0 }));
}

// ---------------------------------------------------------------------------
// Learning with the ADMM reasoner
// ---------------------------------------------------------------------------

#[test]
fn learns_smokers_model_with_admm_reasoner() {
    let mut rules = RuleTable::new();
    let smokers = rules.add_logical("smokers", 1.0, false, true).unwrap();
    let prior = rules.add_logical("prior", 2.0, true, true).unwrap();
    let cap = rules.add_constraint("cap").unwrap();

    let mut atoms = AtomStore::new();
    let friends = atoms
        .insert("Friends", vec!["alice".into(), "bob".into()], 1.0, Partition::Observed)
        .unwrap();
    let alice = atoms
        .insert("Smokes", vec!["alice".into()], 1.0, Partition::Observed)
        .unwrap();
    let bob = atoms
        .insert("Smokes", vec!["bob".into()], 0.0, Partition::RandomVariable)
        .unwrap();
    let carol = atoms
        .insert("Smokes", vec!["carol".into()], 0.0, Partition::RandomVariable)
        .unwrap();

    let mut observed = ObservedStore::new();
    observed.insert(bob, 1.0).unwrap();
    observed.insert(carol, 0.0).unwrap();

    let mut ground = GroundRuleStore::new();
    ground.add(Box::new(GroundLogicalRule::implication(
        smokers,
        &[friends, alice],
        &[bob],
        &rules,
    )));
    ground.add(Box::new(GroundLogicalRule::implication(
        smokers,
        &[bob],
        &[carol],
        &rules,
    )));
    for id in [bob, carol] {
        ground.add(Box::new(GroundLogicalRule::new(
            prior,
            vec![Literal::negative(id)],
            &rules,
        )));
    }
    ground.add(Box::new(GroundLinearConstraint::new(
        cap,
        [(bob, 1.0), (carol, 1.0)],
        Comparison::LessEq,
        1.5,
    )
    .unwrap()));

    let mut ctx = LearningContext::new(
        rules,
        ground,
        atoms,
        observed,
        Box::new(AdmmReasoner::default()),
    )
    .unwrap();

    let config = LearnConfig {
        step_size: 0.5,
        schedule: StepSchedule::InverseSqrt,
        max_iterations: 10,
        ..Default::default()
    };
    let report = learn_weights(
        &mut MaxLikelihoodMpe::new(),
        &mut ctx,
        &config,
        &CancellationToken::new(),
    )
    .unwrap();

    assert!(report.iterations >= 1 && report.iterations <= 10);
    assert_eq!(report.loss_history.len(), report.iterations);
    assert!(report.mpe_solves >= 1 && report.mpe_solves <= report.iterations);
    assert_eq!(report.weights.len(), 2);
    for (_, w) in &report.weights {
        assert!(w.is_finite() && *w >= 0.0);
    }
    for id in [bob, carol] {
        let v = ctx.atoms().value(id);
        assert!((0.0..=1.0).contains(&v));
    }
    // Evidence never moves, and the hard cap holds at the last MPE state.
    assert_eq!(ctx.atoms().value(alice), 1.0);
    assert!(ctx.atoms().value(bob) + ctx.atoms().value(carol) <= 1.5 + 1e-2);
}

#[test]
fn one_step_against_solved_mpe_state() {
    // E -> Y (weight 1) and !Y (weight 2): the MPE state is Y = 0, where
    // "pos" is fully violated and "neg" is satisfied. The label is Y = 1.
    let mut rules = RuleTable::new();
    let pos = rules.add_logical("pos", 1.0, false, true).unwrap();
    let neg = rules.add_logical("neg", 2.0, false, true).unwrap();
    let mut atoms = AtomStore::new();
    let e = atoms
        .insert("E", vec![], 1.0, Partition::Observed)
        .unwrap();
    let y = atoms
        .insert("Y", vec![], 0.0, Partition::RandomVariable)
        .unwrap();
    let mut observed = ObservedStore::new();
    observed.insert(y, 1.0).unwrap();
    let mut ground = GroundRuleStore::new();
    ground.add(Box::new(GroundLogicalRule::implication(pos, &[e], &[y], &rules)));
    ground.add(Box::new(GroundLogicalRule::new(
        neg,
        vec![Literal::negative(y)],
        &rules,
    )));
    let mut ctx = LearningContext::new(
        rules,
        ground,
        atoms,
        observed,
        Box::new(AdmmReasoner::default()),
    )
    .unwrap();

    let mut objective = MaxLikelihoodMpe::new();
    let config = LearnConfig {
        step_size: 0.5,
        max_iterations: 1,
        ..Default::default()
    };
    learn_weights(&mut objective, &mut ctx, &config, &CancellationToken::new()).unwrap();

    let mpe = ctx.atoms().value(y);
    assert!(mpe < 1e-2, "Y = {mpe}");
    assert_eq!(objective.observed_incompatibility(), &[0.0, 1.0]);
    let expected = objective.expected_incompatibility();
    assert!((expected[0] - 1.0).abs() < 1e-2);
    assert!(expected[1] < 1e-2);

    // Each weight moves by 0.5 * (observed - expected).
    let (w_pos, w_neg) = (ctx.rules().weight(pos), ctx.rules().weight(neg));
    assert!(w_pos < 1.0 && (w_pos - 0.5).abs() < 1e-2, "pos = {w_pos}");
    assert!(w_neg > 2.0 && (w_neg - 2.5).abs() < 1e-2, "neg = {w_neg}");
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

const MODEL: &str = r#"{
    "rules": [
        { "name": "smokers", "type": "logical", "weight": 1.0 },
        { "name": "prior", "type": "logical", "squared": true, "weight": 0.5 }
    ],
    "atoms": [
        { "atom": "Friends(alice, bob)", "value": 1.0, "observed": true },
        { "atom": "Smokes(alice)", "value": 1.0, "observed": true },
        { "atom": "Smokes(bob)", "label": 1.0 }
    ],
    "groundings": [
        { "rule": "smokers", "body": ["Friends(alice, bob)", "Smokes(alice)"], "head": ["Smokes(bob)"] },
        { "rule": "prior", "body": ["Smokes(bob)"] }
    ]
}"#;

const SETTINGS: &str = r#"
[learn]
step_size = 0.2
max_iterations = 4

[reasoner]
epsilon_rel = 1e-3
"#;

#[test]
fn learns_from_model_and_settings_files() {
    let dir = tempfile::TempDir::new().unwrap();
    let model_path = dir.path().join("model.json");
    let settings_path = dir.path().join("settings.toml");
    std::fs::write(&model_path, MODEL).unwrap();
    std::fs::write(&settings_path, SETTINGS).unwrap();

    let settings = Settings::load(&settings_path).unwrap();
    assert_eq!(settings.learn.max_iterations, 4);
    assert_eq!(settings.learn.step_size, 0.2);

    let mut model = ModelFile::load(&model_path).unwrap();
    let mut ctx = model
        .into_context(Box::new(AdmmReasoner::new(settings.reasoner.clone())))
        .unwrap();
    let report = learn_weights(
        &mut MaxLikelihoodMpe::new(),
        &mut ctx,
        &settings.learn,
        &CancellationToken::new(),
    )
    .unwrap();
    assert!(report.iterations <= 4);

    let weights = weights_by_name(ctx.rules());
    assert_eq!(weights.len(), 2);
    assert!(weights.values().all(|w| *w >= 0.0));

    // Save the trained model and read it back.
    model.update_weights(ctx.rules());
    let saved = dir.path().join("trained.json");
    std::fs::write(&saved, model.to_json().unwrap()).unwrap();
    let reloaded = ModelFile::load(&saved).unwrap();
    assert_eq!(reloaded, model);
    assert_eq!(reloaded.rules[0].weight, weights["smokers"]);
}

#[test]
fn missing_model_file_is_reported() {
    let dir = tempfile::TempDir::new().unwrap();
    let err = ModelFile::load(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, softlogic::error::ModelError::Read { .. }));
}

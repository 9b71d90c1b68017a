//! JSON model files.
//!
//! A model file declares rules, atoms (with optional ground-truth labels), and
//! ground instances of the rules:
//!
//! ```json
//! {
//!   "rules": [
//!     { "name": "smokers", "type": "logical", "weight": 1.0 },
//!     { "name": "at-most-one", "type": "constraint" }
//!   ],
//!   "atoms": [
//!     { "atom": "Friends(alice, bob)", "value": 1.0, "observed": true },
//!     { "atom": "Smokes(alice)", "value": 1.0, "observed": true },
//!     { "atom": "Smokes(bob)", "label": 1.0 }
//!   ],
//!   "groundings": [
//!     { "rule": "smokers", "body": ["Friends(alice, bob)", "Smokes(alice)"], "head": ["Smokes(bob)"] },
//!     { "rule": "at-most-one", "terms": [["Smokes(bob)", 1.0]], "comparison": "less-eq", "constant": 1.0 }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::atom::{AtomId, AtomStore, ObservedStore, Partition};
use crate::error::{ModelError, ModelResult};
use crate::ground::GroundRuleStore;
use crate::kernel::{Comparison, GroundLinearConstraint, GroundLogicalRule};
use crate::learn::LearningContext;
use crate::reasoner::Reasoner;
use crate::rule::{RuleId, RuleKind, RuleTable};

fn default_learnable() -> bool {
    true
}

/// A rule declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: RuleKind,
    /// Initial weight; ignored for constraints.
    #[serde(default)]
    pub weight: f64,
    /// Ignored for constraints, which are never learnable.
    #[serde(default = "default_learnable")]
    pub learnable: bool,
}

/// An atom declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomSpec {
    /// Reference of the form `Predicate(arg, ...)`.
    pub atom: String,
    #[serde(default)]
    pub value: f64,
    /// Evidence atoms are never changed by inference.
    #[serde(default)]
    pub observed: bool,
    /// Ground-truth value used by weight learning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<f64>,
}

/// A ground instance of a rule.
///
/// Constraint groundings are tried first: a logical grounding has no
/// required fields, so it would otherwise match everything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroundingSpec {
    Constraint {
        rule: String,
        terms: Vec<(String, f64)>,
        comparison: Comparison,
        constant: f64,
    },
    Logical {
        rule: String,
        #[serde(default)]
        body: Vec<String>,
        #[serde(default)]
        head: Vec<String>,
    },
}

/// Parsed contents of a model file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelFile {
    pub rules: Vec<RuleSpec>,
    pub atoms: Vec<AtomSpec>,
    pub groundings: Vec<GroundingSpec>,
}

impl ModelFile {
    /// Read and parse a model file.
    pub fn load(path: &Path) -> ModelResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ModelError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_json(&content, &path.display().to_string())
    }

    /// Parse model JSON; `origin` names the source in errors.
    pub fn from_json(content: &str, origin: &str) -> ModelResult<Self> {
        serde_json::from_str(content).map_err(|e| ModelError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    /// Build the in-memory model and wrap it in a learning context.
    pub fn into_context(&self, reasoner: Box<dyn Reasoner>) -> ModelResult<LearningContext> {
        let mut rules = RuleTable::new();
        for spec in &self.rules {
            match spec.kind {
                RuleKind::Logical { squared } => {
                    rules.add_logical(spec.name.clone(), spec.weight, squared, spec.learnable)?
                }
                RuleKind::Constraint => rules.add_constraint(spec.name.clone())?,
            };
        }

        let mut atoms = AtomStore::new();
        let mut observed = ObservedStore::new();
        for spec in &self.atoms {
            let (predicate, arguments) = parse_atom_ref(&spec.atom)?;
            let partition = if spec.observed {
                Partition::Observed
            } else {
                Partition::RandomVariable
            };
            let id = atoms.insert(predicate, arguments, spec.value, partition)?;
            if let Some(label) = spec.label {
                observed.insert(id, label)?;
            }
        }

        let mut ground_rules = GroundRuleStore::new();
        for grounding in &self.groundings {
            match grounding {
                GroundingSpec::Logical { rule, body, head } => {
                    let id = rule_of_kind(&rules, rule, "logical")?;
                    let body = resolve_all(&atoms, body)?;
                    let head = resolve_all(&atoms, head)?;
                    ground_rules.add(Box::new(GroundLogicalRule::implication(
                        id, &body, &head, &rules,
                    )));
                }
                GroundingSpec::Constraint {
                    rule,
                    terms,
                    comparison,
                    constant,
                } => {
                    let id = rule_of_kind(&rules, rule, "constraint")?;
                    let terms = terms
                        .iter()
                        .map(|(atom, coeff)| Ok((resolve(&atoms, atom)?, *coeff)))
                        .collect::<ModelResult<Vec<_>>>()?;
                    ground_rules.add(Box::new(GroundLinearConstraint::new(
                        id,
                        terms,
                        *comparison,
                        *constant,
                    )?));
                }
            }
        }

        tracing::debug!(
            rules = rules.len(),
            atoms = atoms.len(),
            labels = observed.len(),
            groundings = ground_rules.len(),
            "model built"
        );
        LearningContext::new(rules, ground_rules, atoms, observed, reasoner)
    }

    /// Copy weights back into the rule declarations, e.g. to save a trained
    /// model.
    pub fn update_weights(&mut self, rules: &RuleTable) {
        for spec in &mut self.rules {
            if let Some(id) = rules.lookup(&spec.name) {
                spec.weight = rules.weight(id);
            }
        }
    }

    pub fn to_json(&self) -> ModelResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| ModelError::Serialize {
            message: e.to_string(),
        })
    }
}

/// Weights of all weighted rules, keyed by rule name.
pub fn weights_by_name(rules: &RuleTable) -> BTreeMap<String, f64> {
    rules
        .iter()
        .filter(|r| r.is_weighted())
        .map(|r| (r.name.clone(), r.weight()))
        .collect()
}

/// Split `Pred(a, b)` into its predicate and arguments. A bare `Pred` or
/// `Pred()` has no arguments.
pub fn parse_atom_ref(text: &str) -> ModelResult<(String, Vec<String>)> {
    let syntax = || ModelError::AtomSyntax {
        text: text.to_string(),
    };
    let is_name = |s: &str| !s.is_empty() && !s.contains(['(', ')', ',']);

    let text_trimmed = text.trim();
    let (predicate, arguments) = match text_trimmed.split_once('(') {
        None => (text_trimmed, Vec::new()),
        Some((predicate, rest)) => {
            let inner = rest.strip_suffix(')').ok_or_else(syntax)?;
            let arguments = if inner.trim().is_empty() {
                Vec::new()
            } else {
                inner
                    .split(',')
                    .map(|arg| {
                        let arg = arg.trim();
                        if is_name(arg) { Ok(arg.to_string()) } else { Err(syntax()) }
                    })
                    .collect::<ModelResult<Vec<_>>>()?
            };
            (predicate.trim(), arguments)
        }
    };
    if !is_name(predicate) {
        return Err(syntax());
    }
    Ok((predicate.to_string(), arguments))
}

fn resolve(atoms: &AtomStore, text: &str) -> ModelResult<AtomId> {
    let (predicate, arguments) = parse_atom_ref(text)?;
    atoms
        .lookup(&predicate, &arguments)
        .ok_or_else(|| ModelError::UnknownAtom {
            atom: text.to_string(),
        })
}

fn resolve_all(atoms: &AtomStore, texts: &[String]) -> ModelResult<Vec<AtomId>> {
    texts.iter().map(|t| resolve(atoms, t)).collect()
}

fn rule_of_kind(rules: &RuleTable, name: &str, expected: &str) -> ModelResult<RuleId> {
    let id = rules.lookup(name).ok_or_else(|| ModelError::UnknownRule {
        rule: name.to_string(),
    })?;
    let matches = match rules.get(id).map(|r| r.kind) {
        Some(RuleKind::Logical { .. }) => expected == "logical",
        Some(RuleKind::Constraint) => expected == "constraint",
        None => false,
    };
    if matches {
        Ok(id)
    } else {
        Err(ModelError::KindMismatch {
            rule: name.to_string(),
            expected: expected.to_string(),
        })
    }
}

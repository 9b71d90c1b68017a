//! Weighted rule templates and the table that owns their weights.
//!
//! A [`Rule`] is the template every ground kernel is instantiated from. The
//! [`RuleTable`] is the single owner of each rule's weight: ground kernels hold
//! a [`RuleId`] into it, so a weight update is visible to every instantiation
//! at once.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Dense index of a rule in its [`RuleTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct RuleId(usize);

impl RuleId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rule:{}", self.0)
    }
}

/// Logical structure of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RuleKind {
    /// A weighted logical rule; groundings are hinge-loss potentials, squared
    /// when `squared` is set.
    Logical {
        #[serde(default)]
        squared: bool,
    },
    /// An unweighted hard constraint.
    Constraint,
}

/// A rule template with a mutable weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    pub kind: RuleKind,
    weight: f64,
    /// Whether weight learning may change this rule's weight.
    pub learnable: bool,
    /// Bumped every time the weight actually changes.
    version: u64,
}

impl Rule {
    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn is_weighted(&self) -> bool {
        matches!(self.kind, RuleKind::Logical { .. })
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}

/// Owner of all rules in a model.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<Rule>,
    by_name: HashMap<String, RuleId>,
    generation: u64,
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a weighted logical rule.
    pub fn add_logical(
        &mut self,
        name: impl Into<String>,
        weight: f64,
        squared: bool,
        learnable: bool,
    ) -> ModelResult<RuleId> {
        self.add(name.into(), RuleKind::Logical { squared }, weight, learnable)
    }

    /// Add an unweighted hard constraint.
    pub fn add_constraint(&mut self, name: impl Into<String>) -> ModelResult<RuleId> {
        self.add(name.into(), RuleKind::Constraint, 0.0, false)
    }

    fn add(
        &mut self,
        name: String,
        kind: RuleKind,
        weight: f64,
        learnable: bool,
    ) -> ModelResult<RuleId> {
        if self.by_name.contains_key(&name) {
            return Err(ModelError::DuplicateRule { name });
        }
        if !weight.is_finite() {
            return Err(ModelError::InvalidWeight { rule: name, weight });
        }
        let id = RuleId(self.rules.len());
        self.by_name.insert(name.clone(), id);
        self.rules.push(Rule {
            id,
            name,
            kind,
            weight,
            learnable: learnable && matches!(kind, RuleKind::Logical { .. }),
            version: 0,
        });
        Ok(id)
    }

    pub fn get(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(id.0)
    }

    pub fn lookup(&self, name: &str) -> Option<RuleId> {
        self.by_name.get(name).copied()
    }

    /// Current weight of a rule, `0.0` for unknown IDs.
    pub fn weight(&self, id: RuleId) -> f64 {
        self.get(id).map(Rule::weight).unwrap_or(0.0)
    }

    /// Weight version of a rule, `0` for unknown IDs.
    pub fn version(&self, id: RuleId) -> u64 {
        self.get(id).map(Rule::version).unwrap_or(0)
    }

    /// Set a rule's weight.
    ///
    /// Returns whether the stored weight actually changed.
    pub fn set_weight(&mut self, id: RuleId, weight: f64) -> ModelResult<bool> {
        let rule = self
            .rules
            .get_mut(id.0)
            .ok_or_else(|| ModelError::UnknownRule {
                rule: id.to_string(),
            })?;
        if !weight.is_finite() || !rule.is_weighted() {
            return Err(ModelError::InvalidWeight {
                rule: rule.name.clone(),
                weight,
            });
        }
        if rule.weight == weight {
            return Ok(false);
        }
        rule.weight = weight;
        rule.version += 1;
        self.generation += 1;
        Ok(true)
    }

    /// Weighted, learnable rules in insertion order.
    pub fn mutable_rules(&self) -> Vec<RuleId> {
        self.rules
            .iter()
            .filter(|r| r.learnable && r.is_weighted())
            .map(|r| r.id)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Bumped on every weight change across the table.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Name of a rule, or its ID when unknown.
    pub fn name(&self, id: RuleId) -> String {
        self.get(id)
            .map(|r| r.name.clone())
            .unwrap_or_else(|| id.to_string())
    }
}

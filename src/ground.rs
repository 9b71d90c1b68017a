//! Index of ground kernels by the rule they were grounded from.

use std::collections::HashMap;

use crate::error::KernelError;
use crate::kernel::GroundKernel;
use crate::rule::{RuleId, RuleTable};

/// Every current ground instance, grouped by rule.
#[derive(Debug, Default)]
pub struct GroundRuleStore {
    by_rule: HashMap<RuleId, Vec<Box<dyn GroundKernel>>>,
    len: usize,
    generation: u64,
}

impl GroundRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a ground kernel under its rule.
    pub fn add(&mut self, kernel: Box<dyn GroundKernel>) {
        self.by_rule.entry(kernel.kernel()).or_default().push(kernel);
        self.len += 1;
        self.generation += 1;
    }

    /// Current ground instances of `rule` (empty for rules with no groundings).
    pub fn ground_rules(&self, rule: RuleId) -> &[Box<dyn GroundKernel>] {
        self.by_rule.get(&rule).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drop every ground instance of a retracted rule. Returns how many were removed.
    pub fn retract(&mut self, rule: RuleId) -> usize {
        let removed = self.by_rule.remove(&rule).map(|v| v.len()).unwrap_or(0);
        if removed > 0 {
            self.len -= removed;
            self.generation += 1;
        }
        removed
    }

    /// Iterate `(rule, instances)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (RuleId, &[Box<dyn GroundKernel>])> {
        self.by_rule.iter().map(|(&r, v)| (r, v.as_slice()))
    }

    /// Iterate every ground kernel.
    pub fn kernels(&self) -> impl Iterator<Item = &(dyn GroundKernel + 'static)> {
        self.by_rule.values().flatten().map(|k| k.as_ref())
    }

    /// Total number of ground instances.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bumped whenever instances are added or retracted.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Notify every instance of `rule` that its parameters changed.
    ///
    /// Kernels without parameters are skipped. Returns how many instances
    /// reported a changed contribution; callers may use this to skip
    /// unaffected instances, but nothing relies on it.
    pub fn update_parameters(&mut self, rule: RuleId, rules: &RuleTable) -> usize {
        let Some(kernels) = self.by_rule.get_mut(&rule) else {
            return 0;
        };
        let mut changed = 0;
        for kernel in kernels.iter_mut() {
            match kernel.update_parameters(rules) {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(KernelError::UnsupportedParameterUpdate { .. }) => {}
                Err(e) => tracing::debug!(error = %e, %rule, "parameter update failed"),
            }
        }
        changed
    }
}

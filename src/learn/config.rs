//! Weight-learning configuration.

use serde::{Deserialize, Serialize};

use crate::error::{LearnError, LearnResult};

/// How the step size decays over iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepSchedule {
    /// `eta` at every iteration.
    #[default]
    Constant,
    /// `eta / sqrt(t)`.
    InverseSqrt,
    /// `eta / t`.
    Inverse,
}

impl StepSchedule {
    /// Step size at iteration `t` (1-based).
    pub fn step(self, base: f64, t: usize) -> f64 {
        let t = t.max(1) as f64;
        match self {
            StepSchedule::Constant => base,
            StepSchedule::InverseSqrt => base / t.sqrt(),
            StepSchedule::Inverse => base / t,
        }
    }
}

impl std::fmt::Display for StepSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepSchedule::Constant => write!(f, "constant"),
            StepSchedule::InverseSqrt => write!(f, "inverse-sqrt"),
            StepSchedule::Inverse => write!(f, "inverse"),
        }
    }
}

/// Configuration for the voted-perceptron learning loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnConfig {
    /// Base step size (default: 1.0).
    pub step_size: f64,
    /// Step-size decay (default: constant).
    pub schedule: StepSchedule,
    /// Iteration budget (default: 25).
    pub max_iterations: usize,
    /// Stop once the gradient norm drops below this (default: 1e-6).
    pub tolerance: f64,
    /// Project weights onto `w >= 0` after every update (default: true).
    pub non_negative_weights: bool,
    /// Divide each rule's step by its number of groundings (default: true).
    pub scale_gradient: bool,
    /// Report the average of the per-iteration weights (default: false).
    pub average_steps: bool,
    /// L1 penalty pulling weights toward zero (default: 0).
    pub l1_regularization: f64,
    /// L2 penalty pulling weights toward zero (default: 0).
    pub l2_regularization: f64,
}

impl Default for LearnConfig {
    fn default() -> Self {
        Self {
            step_size: 1.0,
            schedule: StepSchedule::Constant,
            max_iterations: 25,
            tolerance: 1e-6,
            non_negative_weights: true,
            scale_gradient: true,
            average_steps: false,
            l1_regularization: 0.0,
            l2_regularization: 0.0,
        }
    }
}

impl LearnConfig {
    pub fn validate(&self) -> LearnResult<()> {
        let invalid = |message: String| Err(LearnError::InvalidConfig { message });
        if !(self.step_size.is_finite() && self.step_size > 0.0) {
            return invalid(format!("step_size must be positive, got {}", self.step_size));
        }
        if self.max_iterations == 0 {
            return invalid("max_iterations must be at least 1".into());
        }
        if !(self.tolerance >= 0.0) {
            return invalid(format!("tolerance must be >= 0, got {}", self.tolerance));
        }
        for (name, value) in [
            ("l1_regularization", self.l1_regularization),
            ("l2_regularization", self.l2_regularization),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return invalid(format!("{name} must be finite and >= 0, got {value}"));
            }
        }
        Ok(())
    }
}

// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # softlogic
//!
//! Weight learning for soft-logic models: rules whose groundings are hinge-loss
//! potentials over atoms with truth values in `[0, 1]`.
//!
//! ## Architecture
//!
//! - **Atoms** (`atom`): the random-variable database and ground-truth labels
//! - **Rules** (`rule`): rule templates and their mutable weights
//! - **Ground kernels** (`kernel`): the contract every ground instance satisfies,
//!   with logical (hinge-loss) and linear-constraint implementations
//! - **Ground rule store** (`ground`): ground instances indexed by rule
//! - **Reasoner** (`reasoner`): the MPE inference boundary plus a consensus ADMM solver
//! - **Learning** (`learn`): the voted-perceptron loop and `MaxLikelihoodMpe`
//! - **Model files** (`model`) and **settings** (`config`)
//!
//! ## Library usage
//!
//! ```no_run
//! use softlogic::atom::{AtomStore, ObservedStore, Partition};
//! use softlogic::ground::GroundRuleStore;
//! use softlogic::kernel::GroundLogicalRule;
//! use softlogic::learn::{LearnConfig, LearningContext, MaxLikelihoodMpe, learn_weights};
//! use softlogic::reasoner::{AdmmReasoner, CancellationToken};
//! use softlogic::rule::RuleTable;
//!
//! let mut rules = RuleTable::new();
//! let smokers = rules.add_logical("smokers", 1.0, false, true).unwrap();
//!
//! let mut atoms = AtomStore::new();
//! let alice = atoms.insert("Smokes", vec!["alice".into()], 1.0, Partition::Observed).unwrap();
//! let bob = atoms.insert("Smokes", vec!["bob".into()], 0.0, Partition::RandomVariable).unwrap();
//! let mut observed = ObservedStore::new();
//! observed.insert(bob, 1.0).unwrap();
//!
//! let mut ground = GroundRuleStore::new();
//! ground.add(Box::new(GroundLogicalRule::implication(smokers, &[alice], &[bob], &rules)));
//!
//! let mut ctx = LearningContext::new(
//!     rules, ground, atoms, observed, Box::new(AdmmReasoner::default()),
//! ).unwrap();
//! let report = learn_weights(
//!     &mut MaxLikelihoodMpe::new(),
//!     &mut ctx,
//!     &LearnConfig::default(),
//!     &CancellationToken::new(),
//! ).unwrap();
//! println!("{:?}", report.weights);
//! ```

pub mod atom;
pub mod config;
pub mod error;
pub mod ground;
pub mod kernel;
pub mod learn;
pub mod model;
pub mod reasoner;
pub mod rule;

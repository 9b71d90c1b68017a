//! Rich diagnostic error types for softlogic.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so users know exactly what
//! went wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for softlogic.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum SoftLogicError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Kernel(#[from] KernelError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Reasoner(#[from] ReasonerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Learn(#[from] LearnError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Kernel errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum KernelError {
    #[error("atom {atom} is not in the scope of this ground kernel of rule {rule}")]
    #[diagnostic(
        code(softlogic::kernel::invalid_binding),
        help(
            "A binding mode only exists for atoms the ground kernel was created over. \
             Query `atoms()` first, or check that the atom ID belongs to this grounding."
        )
    )]
    InvalidBinding { atom: u64, rule: usize },

    #[error("ground kernel of rule {rule} has no weight-dependent parameters to update")]
    #[diagnostic(
        code(softlogic::kernel::unsupported_update),
        help(
            "Unweighted kernels (hard constraints) never change when a weight changes. \
             Callers should treat this as a no-op."
        )
    )]
    UnsupportedParameterUpdate { rule: usize },

    #[error("non-finite coefficient {value} in a ground instance of rule {rule}")]
    #[diagnostic(
        code(softlogic::kernel::non_finite),
        help("Constraint coefficients and constants must be finite numbers.")
    )]
    NonFiniteCoefficient { rule: usize, value: f64 },
}

// ---------------------------------------------------------------------------
// Reasoner errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ReasonerError {
    #[error("MPE optimization did not converge after {iterations} iterations (residual {residual:.3e})")]
    #[diagnostic(
        code(softlogic::reasoner::non_convergent),
        help(
            "Raise the reasoner's max_iterations or loosen epsilon_abs/epsilon_rel. \
             Infeasible hard constraints never converge."
        )
    )]
    NonConvergent { iterations: usize, residual: f64 },

    #[error("MPE optimization was cancelled")]
    #[diagnostic(
        code(softlogic::reasoner::cancelled),
        help("The cancellation token was triggered while the reasoner was running.")
    )]
    Cancelled,

    #[error("MPE optimization produced a non-finite {quantity} at iteration {iteration}")]
    #[diagnostic(
        code(softlogic::reasoner::numeric),
        help(
            "A weight or ground kernel evaluated to NaN or infinity. \
             Check the rule weights and constraint coefficients for non-finite values."
        )
    )]
    NumericInstability { quantity: String, iteration: usize },

    #[error("rule {rule} has negative weight {weight}; the MPE problem is not convex")]
    #[diagnostic(
        code(softlogic::reasoner::negative_weight),
        help(
            "Hinge potentials are only convex under non-negative weights. \
             Keep `non_negative_weights` enabled when learning with this reasoner."
        )
    )]
    NegativeWeight { rule: usize, weight: f64 },
}

// ---------------------------------------------------------------------------
// Learning errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum LearnError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Reasoner(#[from] ReasonerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Model(#[from] ModelError),

    #[error("non-finite {phase} value ({value}) for rule {rule}")]
    #[diagnostic(
        code(softlogic::learn::numeric),
        help(
            "A ground rule, gradient, or updated weight evaluated to NaN or infinity. \
             The iteration was aborted without committing any weight update."
        )
    )]
    NumericInstability {
        rule: usize,
        phase: String,
        value: f64,
    },

    #[error("rule {rule} is learnable but has an unweighted ground instance")]
    #[diagnostic(
        code(softlogic::learn::unweighted_grounding),
        help(
            "Only weighted ground rules contribute to weight learning. \
             Mark constraint rules as non-learnable, or regrind the rule."
        )
    )]
    UnweightedGrounding { rule: usize },

    #[error("invalid learning configuration: {message}")]
    #[diagnostic(
        code(softlogic::learn::invalid_config),
        help("Check the [learn] section of the settings. {message}")
    )]
    InvalidConfig { message: String },

    #[error("weight learning was cancelled before iteration {iteration}")]
    #[diagnostic(
        code(softlogic::learn::cancelled),
        help("No weight update from the interrupted iteration was committed.")
    )]
    Cancelled { iteration: usize },
}

// ---------------------------------------------------------------------------
// Model errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ModelError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Kernel(#[from] KernelError),

    #[error("unknown atom: {atom}")]
    #[diagnostic(
        code(softlogic::model::unknown_atom),
        help("Every atom referenced by a grounding or label must be inserted into the atom store first.")
    )]
    UnknownAtom { atom: String },

    #[error("unknown rule: {rule}")]
    #[diagnostic(
        code(softlogic::model::unknown_rule),
        help("Declare the rule before adding ground instances of it.")
    )]
    UnknownRule { rule: String },

    #[error("duplicate atom: {atom}")]
    #[diagnostic(
        code(softlogic::model::duplicate_atom),
        help("Each (predicate, arguments) combination may be declared only once.")
    )]
    DuplicateAtom { atom: String },

    #[error("duplicate rule: {name}")]
    #[diagnostic(
        code(softlogic::model::duplicate_rule),
        help("Rule names must be unique within a model.")
    )]
    DuplicateRule { name: String },

    #[error("invalid truth value {value} for atom {atom}")]
    #[diagnostic(
        code(softlogic::model::truth_value),
        help("Soft truth values must be finite and lie in [0, 1].")
    )]
    InvalidTruthValue { atom: String, value: f64 },

    #[error("invalid weight {weight} for rule {rule}")]
    #[diagnostic(
        code(softlogic::model::weight),
        help("Rule weights must be finite. Constraints carry no weight at all.")
    )]
    InvalidWeight { rule: String, weight: f64 },

    #[error("atom {atom} is observed and cannot be modified")]
    #[diagnostic(
        code(softlogic::model::observed_atom),
        help("Only random-variable atoms may change value. Swap its partition first.")
    )]
    ObservedAtom { atom: String },

    #[error("malformed atom reference: {text}")]
    #[diagnostic(
        code(softlogic::model::atom_syntax),
        help("Atom references are written as `Predicate(arg1, arg2, ...)`.")
    )]
    AtomSyntax { text: String },

    #[error("rule {rule} is not a {expected} rule")]
    #[diagnostic(
        code(softlogic::model::kind_mismatch),
        help(
            "Groundings with `body`/`head` belong to logical rules; groundings with \
             `terms`/`comparison`/`constant` belong to constraint rules."
        )
    )]
    KindMismatch { rule: String, expected: String },

    #[error("failed to read model file {path}: {source}")]
    #[diagnostic(
        code(softlogic::model::read),
        help("Check that the model file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse model file {path}: {message}")]
    #[diagnostic(
        code(softlogic::model::parse),
        help("The model file must be JSON with `rules`, `atoms` and `groundings` arrays.")
    )]
    Parse { path: String, message: String },

    #[error("failed to serialize model: {message}")]
    #[diagnostic(
        code(softlogic::model::serialize),
        help("This is a bug: every in-memory model should be representable as JSON.")
    )]
    Serialize { message: String },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read settings {path}: {source}")]
    #[diagnostic(
        code(softlogic::config::read),
        help("Check that the settings file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write settings {path}: {source}")]
    #[diagnostic(
        code(softlogic::config::write),
        help("Check that the parent directory is writable.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings {path}: {message}")]
    #[diagnostic(
        code(softlogic::config::parse),
        help("Settings are TOML with optional [learn] and [reasoner] tables.")
    )]
    Parse { path: String, message: String },

    #[error("failed to serialize settings: {message}")]
    #[diagnostic(
        code(softlogic::config::serialize),
        help("This is a bug: every settings value should be representable as TOML.")
    )]
    Serialize { message: String },
}

/// Result type for ground kernel operations.
pub type KernelResult<T> = std::result::Result<T, KernelError>;

/// Result type for reasoner operations.
pub type ReasonerResult<T> = std::result::Result<T, ReasonerError>;

/// Result type for weight learning.
pub type LearnResult<T> = std::result::Result<T, LearnError>;

/// Result type for model construction and loading.
pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Result type for settings I/O.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Convenience alias for functions returning softlogic results.
pub type SoftLogicResult<T> = std::result::Result<T, SoftLogicError>;

//! Error types for the DE-MCMC sampler.
//!
//! Configuration problems and user-callback failures are surfaced through
//! [`DemcError`] before or during a run. Internal numeric conditions (a
//! proposal outside the bounds, a NaN weight, a degenerate snooker
//! direction) are absorbed by the engine and never appear here.

use thiserror::Error;

use crate::model::ModelError;
use crate::value::ParamValue;

/// Errors that can occur while configuring or running the sampler.
#[derive(Debug, Error)]
pub enum DemcError {
    /// Group size is too small; the proposal operators need at least three
    /// peers besides the current particle.
    #[error("particles per group ({np}) must be >= 4")]
    PopulationTooSmall {
        /// The invalid group size.
        np: usize,
    },

    /// The population must contain at least one group.
    #[error("number of groups must be >= 1")]
    NoGroups,

    /// Migration swaps particles between groups and needs at least two.
    #[error("migration requires >= 2 groups, got {n_groups}")]
    MigrationNeedsGroups {
        /// The configured group count.
        n_groups: usize,
    },

    /// The iteration count must be positive.
    #[error("number of iterations must be > 0")]
    ZeroIterations,

    /// The migration interval must be positive.
    #[error("migration interval must be > 0")]
    InvalidMigrationInterval,

    /// No bounds were provided.
    #[error("bounds must contain one (lo, hi) pair per parameter")]
    EmptyBounds,

    /// A lower bound exceeds its upper bound.
    #[error("invalid bounds at index {index}: lower ({lower}) > upper ({upper})")]
    InvalidBounds {
        /// Index of the invalid pair.
        index: usize,
        /// The lower bound value.
        lower: f64,
        /// The upper bound value.
        upper: f64,
    },

    /// A probability parameter lies outside `[0, 1]`.
    #[error("invalid probability for {name}: {value} (must be in [0, 1])")]
    InvalidProbability {
        /// Name of the offending option.
        name: &'static str,
        /// The invalid value.
        value: f64,
    },

    /// The jitter half-width must be non-negative.
    #[error("invalid jitter half-width: {value} (must be >= 0)")]
    InvalidJitter {
        /// The invalid value.
        value: f64,
    },

    /// The number of bounds does not match the number of parameter
    /// components produced by the prior.
    #[error("bounds arity mismatch: prior draws {components} components, bounds has {bounds} pairs")]
    BoundsArityMismatch {
        /// Component count of the first prior draw.
        components: usize,
        /// Number of bounds pairs.
        bounds: usize,
    },

    /// The number of parameter names does not match the number of
    /// components produced by the prior.
    #[error("names arity mismatch: prior draws {components} components, model names {names}")]
    NamesArityMismatch {
        /// Component count of the first prior draw.
        components: usize,
        /// Number of names.
        names: usize,
    },

    /// A blocking mask does not cover the flattened parameter vector.
    #[error("blocking mask {index} has length {got}, expected the flattened dimension {expected}")]
    BlockingMaskMismatch {
        /// Index of the offending mask.
        index: usize,
        /// Expected mask length.
        expected: usize,
        /// Actual mask length.
        got: usize,
    },

    /// A blocking mask updates no scalar entry at all.
    #[error("blocking mask {index} selects no entries")]
    EmptyBlockingMask {
        /// Index of the offending mask.
        index: usize,
    },

    /// The entry point does not match the configured update rule, e.g.
    /// `run()` with an optimization rule.
    #[error("update rule mismatch: {entry} requires {expected}")]
    WrongUpdateRule {
        /// The entry point that was called.
        entry: &'static str,
        /// The update rule(s) it requires.
        expected: &'static str,
    },

    /// A prior draw deviated from the component structure fixed by the
    /// first draw of the run.
    #[error("prior draw for particle {particle} does not match the component structure of the first draw")]
    ShapeMismatch {
        /// Id of the particle whose draw mismatched.
        particle: usize,
    },

    /// A user callback returned an error. The offending parameter vector is
    /// attached for debugging.
    #[error("user callback `{callback}` failed at theta {theta:?}")]
    Model {
        /// Which callback failed (`sample_prior`, `prior_loglike` or
        /// `loglike`).
        callback: &'static str,
        /// The parameter vector that was being evaluated.
        theta: Vec<ParamValue>,
        /// The underlying error.
        #[source]
        source: ModelError,
    },
}

/// A specialized `Result` type for sampler operations.
pub type Result<T> = std::result::Result<T, DemcError>;

impl DemcError {
    pub(crate) fn model(callback: &'static str, theta: &[ParamValue], source: ModelError) -> Self {
        DemcError::Model {
            callback,
            theta: theta.to_vec(),
            source,
        }
    }

    /// Returns `true` if this error was raised by a user callback.
    pub fn is_model_error(&self) -> bool {
        matches!(self, DemcError::Model { .. })
    }

    /// Returns `true` if this is a configuration error that was (or would
    /// have been) caught before sampling started.
    pub fn is_config_error(&self) -> bool {
        !matches!(
            self,
            DemcError::Model { .. } | DemcError::ShapeMismatch { .. }
        )
    }
}

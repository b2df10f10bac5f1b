//! Error types for the simulation engine.
//!
//! Two families are kept apart: [`ConfigError`] is raised while validating
//! inputs, before any trial runs; [`NumericalError`] aborts a run that has
//! already started and carries enough context (trial, step, seed) to
//! replay it.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, SimError>;

/// Top-level error returned by every fallible engine operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Numerical(#[from] NumericalError),
}

impl SimError {
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    pub fn is_numerical(&self) -> bool {
        matches!(self, Self::Numerical(_))
    }
}

/// Invalid shapes or ranges in the supplied parameters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Two vectors or matrix dimensions that must agree do not.
    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A scalar parameter lies outside its valid range.
    #[error("invalid {name}: {message}")]
    InvalidParameter { name: &'static str, message: String },

    /// The covariance (or correlation) matrix is not symmetric.
    #[error("{what} is not symmetric at ({row}, {col}): {upper} != {lower}")]
    NotSymmetric {
        what: &'static str,
        row: usize,
        col: usize,
        upper: f64,
        lower: f64,
    },

    /// A reduction was asked for over zero outcomes.
    #[error("empty population: {context}")]
    EmptyPopulation { context: &'static str },
}

impl ConfigError {
    pub fn dimension_mismatch(what: &'static str, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            what,
            expected,
            actual,
        }
    }

    pub fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            message: message.into(),
        }
    }

    pub fn empty(context: &'static str) -> Self {
        Self::EmptyPopulation { context }
    }
}

/// Failures of the numerics themselves.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NumericalError {
    /// Cholesky factorization met a pivot that is not strictly positive.
    #[error("covariance matrix is not positive definite: pivot {pivot:e} at row {row}")]
    NotPositiveDefinite { row: usize, pivot: f64 },

    /// A simulated value became NaN, infinite, or underflowed to zero.
    #[error("non-finite value {value} in trial {trial} (seed {seed:#018x}) at step {step}")]
    NonFinite {
        trial: usize,
        step: usize,
        seed: u64,
        value: f64,
    },

    /// An outcome handed to the metrics reduction is NaN or infinite.
    #[error("non-finite outcome {value} at index {index}")]
    NonFiniteOutcome { index: usize, value: f64 },
}

/// Failure to load the driver settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid settings in [{section}]: {source}")]
    Invalid {
        section: &'static str,
        #[source]
        source: SimError,
    },
}

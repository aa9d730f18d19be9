use nalgebra::DVector;
use thiserror::Error;

/// Unified error type for `mnlrs` operations.
#[derive(Debug, Error)]
pub enum ChoiceError {
    /// Raised when provided arrays or matrices have incompatible dimensions.
    #[error("dimension mismatch in {context}: expected {expected} but found {found}")]
    DimensionMismatch {
        /// Human-readable context describing the operation.
        context: &'static str,
        /// The required dimension, often the model-implied value.
        expected: usize,
        /// The dimension that was actually supplied.
        found: usize,
    },

    /// Raised when a decision group does not hold exactly `J` alternatives with one chosen.
    #[error("decision `{decision}` is malformed: {reason}")]
    MalformedGroup { decision: String, reason: String },

    /// Raised when no records were supplied to a dataset builder.
    #[error("choice data must contain at least one decision")]
    EmptyDataset,

    /// Raised when an option value is outside its admissible range.
    #[error("invalid configuration for {option}: {reason}")]
    InvalidConfiguration { option: &'static str, reason: String },

    /// Raised when the quasi-Newton search stops before meeting its tolerance.
    ///
    /// The best coefficients found so far are returned so the caller can decide whether to
    /// retry.
    #[error(
        "optimizer did not converge after {iterations} iterations; best log-likelihood {log_likelihood}"
    )]
    ConvergenceFailure {
        /// Number of iterations performed before termination.
        iterations: u64,
        /// Log-likelihood at the best coefficients.
        log_likelihood: f64,
        /// Best coefficients found.
        beta: DVector<f64>,
    },

    /// Raised when linear algebra operations encounter a singular system.
    #[error("matrix in {context} is singular")]
    SingularMatrix { context: &'static str },

    /// Raised when numerical routines produce NaN or infinities.
    #[error("encountered non-finite value during {context}")]
    NumericalError { context: &'static str },

    /// Runtime failure reported by the optimizer backend (line search, solver setup).
    #[error("optimizer failed: {message}")]
    Optimizer { message: String },
}

impl ChoiceError {
    /// Helper to format a [`DimensionMismatch`](ChoiceError::DimensionMismatch) error.
    pub fn dimension_mismatch(context: &'static str, expected: usize, found: usize) -> Self {
        Self::DimensionMismatch {
            context,
            expected,
            found,
        }
    }

    /// Helper for dataset validation failures.
    pub fn malformed_group<D: Into<String>, R: Into<String>>(decision: D, reason: R) -> Self {
        Self::MalformedGroup {
            decision: decision.into(),
            reason: reason.into(),
        }
    }

    /// Helper for rejecting option values.
    pub fn invalid_configuration<R: Into<String>>(option: &'static str, reason: R) -> Self {
        Self::InvalidConfiguration {
            option,
            reason: reason.into(),
        }
    }

    /// Helper to raise when a matrix factorization fails due to singularity.
    pub fn singular(context: &'static str) -> Self {
        Self::SingularMatrix { context }
    }
}

impl From<argmin::core::Error> for ChoiceError {
    fn from(error: argmin::core::Error) -> Self {
        match error.downcast::<ChoiceError>() {
            Ok(inner) => inner,
            Err(other) => Self::Optimizer {
                message: other.to_string(),
            },
        }
    }
}

/// Type alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, ChoiceError>;

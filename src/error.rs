use thiserror::Error;

/// Unified error type for `equilibria` operations.
#[derive(Debug, Error)]
pub enum EquilibriumError {
    /// Raised when provided vectors or matrices have incompatible dimensions.
    #[error("dimension mismatch in {context}: expected {expected} but found {found}")]
    DimensionMismatch {
        /// Human-readable context describing the operation.
        context: &'static str,
        /// The required dimension, usually the length of the first operand.
        expected: usize,
        /// The dimension that was actually supplied.
        found: usize,
    },

    /// Raised when a configuration value or argument lies outside its valid range.
    #[error("invalid {name} = {value}: {reason}")]
    InvalidParameter {
        /// Name of the offending parameter.
        name: &'static str,
        /// The value that was supplied.
        value: f64,
        /// Description of the accepted range.
        reason: &'static str,
    },

    /// Raised when a configuration document lacks required keys.
    #[error("missing required keys: {}", .missing.join(", "))]
    MissingKeys { missing: Vec<String> },

    /// Raised by [`ConvergeSummary::into_result`](crate::ConvergeSummary::into_result)
    /// when the iteration budget ran out.
    #[error("iteration did not converge after {iterations} iterations; last diff {last_diff}")]
    DidNotConverge {
        /// Number of iterations performed before termination.
        iterations: usize,
        /// Deviation reported by the final step.
        last_diff: f64,
    },

    /// Raised when numerical routines produce NaN, infinities, or a zero derivative.
    #[error("encountered a numerical failure during {context}")]
    NumericalError { context: &'static str },

    /// Raised when a caller-supplied step or update function fails.
    #[error("callback failed: {source}")]
    Callback {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl EquilibriumError {
    /// Helper to format a [`DimensionMismatch`](EquilibriumError::DimensionMismatch) error.
    pub fn dimension_mismatch(context: &'static str, expected: usize, found: usize) -> Self {
        Self::DimensionMismatch {
            context,
            expected,
            found,
        }
    }

    /// Helper to format an [`InvalidParameter`](EquilibriumError::InvalidParameter) error.
    pub fn invalid_parameter(name: &'static str, value: f64, reason: &'static str) -> Self {
        Self::InvalidParameter {
            name,
            value,
            reason,
        }
    }

    /// Wraps an arbitrary error raised inside a caller-supplied closure.
    pub fn callback<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Callback {
            source: error.into(),
        }
    }

    /// Whether the error reports malformed arguments rather than a runtime failure.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::DimensionMismatch { .. } | Self::InvalidParameter { .. } | Self::MissingKeys { .. }
        )
    }
}

/// Type alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, EquilibriumError>;

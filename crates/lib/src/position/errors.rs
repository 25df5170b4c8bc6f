//! Error types for position arithmetic.

use thiserror::Error;

use super::Position;

/// Errors produced by the position algebra.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    /// A strict split was requested with `lower >= upper`.
    #[error("Invalid bounds: lower {lower} is not below upper {upper}")]
    InvalidBounds {
        /// The lower bound supplied
        lower: Position,
        /// The upper bound supplied
        upper: Position,
    },

    /// No value at the configured scale lies strictly between the bounds.
    #[error("Precision exhausted between {lower} and {upper}")]
    PrecisionExhausted {
        /// The lower bound supplied
        lower: Position,
        /// The upper bound supplied
        upper: Position,
    },

    /// Arithmetic left the representable decimal range.
    #[error("Position arithmetic overflowed during {operation}")]
    Overflow {
        /// The operation that overflowed
        operation: &'static str,
    },

    /// Input text is not a decimal number.
    #[error("Invalid position '{input}': {reason}")]
    Parse {
        /// The rejected input
        input: String,
        /// Parser message
        reason: String,
    },
}

impl PositionError {
    /// Check if this error is a bounds violation.
    pub fn is_invalid_bounds(&self) -> bool {
        matches!(self, PositionError::InvalidBounds { .. })
    }

    /// Check if the interval ran out of representable values.
    pub fn is_precision_exhausted(&self) -> bool {
        matches!(self, PositionError::PrecisionExhausted { .. })
    }

    /// Check if this error came from range overflow.
    pub fn is_overflow(&self) -> bool {
        matches!(self, PositionError::Overflow { .. })
    }
}

impl From<PositionError> for crate::Error {
    fn from(err: PositionError) -> Self {
        crate::Error::Position(err)
    }
}

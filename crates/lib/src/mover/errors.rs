//! Error types for the move protocol.

use thiserror::Error;

use crate::position::{Position, PositionError};
use crate::record::RecordId;

/// Errors that end a single move.
///
/// Any other storage failure is passed through unchanged as
/// [`crate::Error::Backend`]; it is never reported as a conflict.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    /// The record being moved does not exist.
    #[error("Record not found: {id}")]
    RecordNotFound {
        /// The missing record
        id: RecordId,
    },

    /// Resolved neighbours are out of order.
    #[error("Invalid bounds: lower {lower} is not below upper {upper}")]
    InvalidBounds {
        /// Position of the preceding neighbour
        lower: Position,
        /// Position of the following neighbour
        upper: Position,
    },

    /// Every write attempt lost a uniqueness race.
    #[error("Move of record {id} into '{group}' conflicted on all {attempts} attempts")]
    PersistenceConflict {
        /// The record being moved
        id: RecordId,
        /// Target group
        group: String,
        /// Write attempts made
        attempts: u32,
    },

    /// The neighbours stayed too close even after rebalancing the group.
    #[error("No position left between the neighbours in '{group}' after rebalancing")]
    PrecisionExhausted {
        /// Target group
        group: String,
    },
}

impl MoveError {
    /// Check if the moving record was missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, MoveError::RecordNotFound { .. })
    }

    /// Check if the neighbours were inconsistent.
    pub fn is_invalid_bounds(&self) -> bool {
        matches!(self, MoveError::InvalidBounds { .. })
    }

    /// Check if the retry budget was exhausted.
    pub fn is_conflict(&self) -> bool {
        matches!(self, MoveError::PersistenceConflict { .. })
    }

    /// Check if the group ran out of precision.
    pub fn is_precision_exhausted(&self) -> bool {
        matches!(self, MoveError::PrecisionExhausted { .. })
    }

    /// Map a position failure for a move into `group`.
    ///
    /// Overflow and parse failures are not move failures and return `None`.
    pub(crate) fn from_position(err: &PositionError, group: &str) -> Option<Self> {
        match err {
            PositionError::InvalidBounds { lower, upper } => Some(MoveError::InvalidBounds {
                lower: *lower,
                upper: *upper,
            }),
            PositionError::PrecisionExhausted { .. } => Some(MoveError::PrecisionExhausted {
                group: group.to_string(),
            }),
            _ => None,
        }
    }
}

impl From<MoveError> for crate::Error {
    fn from(err: MoveError) -> Self {
        crate::Error::Move(err)
    }
}

//! Error types for the storage backends.
//!
//! Driver errors are translated here exactly once: uniqueness violations on
//! `(group, position)` become [`BackendError::UniqueViolation`], everything
//! else keeps its original message and source.

use thiserror::Error;

use crate::position::Position;
use crate::record::RecordId;

/// Errors that can occur during backend operations.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Existing variants will not be removed in minor versions
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BackendError {
    /// Record not found by ID.
    #[error("Record not found: {id}")]
    RecordNotFound {
        /// The ID of the record that was not found
        id: RecordId,
    },

    /// A record with the same ID already exists.
    #[error("Record already exists: {id}")]
    RecordExists {
        /// The duplicated ID
        id: RecordId,
    },

    /// Another record of the group already holds the position.
    #[error("Position {} already taken in group '{group}'", display_position(.position))]
    UniqueViolation {
        /// Group in which the write collided
        group: String,
        /// Position that collided, when known
        position: Option<Position>,
        /// Driver message describing the violation
        detail: String,
    },

    /// The position cannot be represented by the storage column.
    #[error("Position {position} is outside the storable range: {reason}")]
    PositionOutOfRange {
        /// The rejected position
        position: Position,
        /// Why it cannot be stored
        reason: String,
    },

    /// A stored row could not be decoded.
    #[error("Corrupt row for record {id}: {reason}")]
    CorruptRow {
        /// The record whose row is corrupt
        id: RecordId,
        /// Description of the problem
        reason: String,
    },

    /// Serialization failed.
    #[error("Serialization failed")]
    SerializationFailed {
        /// The underlying serialization error
        #[source]
        source: serde_json::Error,
    },

    /// Deserialization failed.
    #[error("Deserialization failed")]
    DeserializationFailed {
        /// The underlying deserialization error
        #[source]
        source: serde_json::Error,
    },

    /// File I/O error.
    #[error("File I/O error")]
    FileIo {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The store was created with incompatible settings.
    #[error("Incompatible storage configuration: {reason}")]
    InvalidConfiguration {
        /// Description of the incompatibility
        reason: String,
    },

    /// Any other SQL driver failure.
    #[cfg(any(feature = "sqlite", feature = "postgres"))]
    #[error("SQL error: {reason}")]
    SqlxError {
        /// Context and driver message
        reason: String,
        /// The underlying driver error, when there is one
        #[source]
        source: Option<sqlx::Error>,
    },
}

fn display_position(position: &Option<Position>) -> String {
    match position {
        Some(p) => p.to_string(),
        None => "<unknown>".to_string(),
    }
}

impl BackendError {
    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::RecordNotFound { .. })
    }

    /// Check if this error is a `(group, position)` uniqueness violation.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, BackendError::UniqueViolation { .. })
    }

    /// Check if a position falls outside what the backend can store.
    pub fn is_position_out_of_range(&self) -> bool {
        matches!(self, BackendError::PositionOutOfRange { .. })
    }

    /// Check if this error is related to I/O or encoding.
    pub fn is_io_error(&self) -> bool {
        matches!(
            self,
            BackendError::FileIo { .. }
                | BackendError::SerializationFailed { .. }
                | BackendError::DeserializationFailed { .. }
        )
    }

    /// Check if this error indicates stored data is unusable.
    pub fn is_integrity_error(&self) -> bool {
        matches!(
            self,
            BackendError::CorruptRow { .. } | BackendError::InvalidConfiguration { .. }
        )
    }

    /// Get the record ID if this error is about a specific record.
    pub fn record_id(&self) -> Option<&RecordId> {
        match self {
            BackendError::RecordNotFound { id }
            | BackendError::RecordExists { id }
            | BackendError::CorruptRow { id, .. } => Some(id),
            _ => None,
        }
    }
}

impl From<BackendError> for crate::Error {
    fn from(err: BackendError) -> Self {
        crate::Error::Backend(err)
    }
}

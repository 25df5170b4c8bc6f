//! Error types for group rebalancing.

use thiserror::Error;

/// Errors produced by the gap rebalancer.
///
/// Storage failures other than position conflicts are not wrapped; they
/// propagate as [`crate::Error::Backend`].
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RebalanceError {
    /// Concurrent writers kept claiming positions of the new layout.
    #[error("Rebalance of group '{group}' kept conflicting after {attempts} attempts")]
    PersistenceConflict {
        /// The group being rebalanced
        group: String,
        /// Rewrite attempts made
        attempts: u32,
    },
}

impl RebalanceError {
    /// Check if the rebalance gave up on conflicts.
    pub fn is_conflict(&self) -> bool {
        matches!(self, RebalanceError::PersistenceConflict { .. })
    }

    /// The group the error refers to.
    pub fn group(&self) -> &str {
        match self {
            RebalanceError::PersistenceConflict { group, .. } => group,
        }
    }
}

impl From<RebalanceError> for crate::Error {
    fn from(err: RebalanceError) -> Self {
        crate::Error::Rebalance(err)
    }
}

//! Storage backends for ordinal records.
//!
//! The [`BackendImpl`] trait is the only thing the position algebra, the
//! rebalancer and the move protocol know about persistence. A backend must
//! provide:
//!
//! - equality filtering by record id and by group,
//! - ordering by position using true numeric comparison,
//! - an atomic uniqueness constraint on `(group, position)`, surfaced as
//!   [`BackendError::UniqueViolation`].
//!
//! Nothing else is assumed; in particular there are no locks or multi-call
//! transactions. Concurrent writers are kept apart solely by the uniqueness
//! constraint.

pub mod conflict;
pub mod database;
pub mod errors;

pub use conflict::{ConflictClassifier, Driver};
pub use errors::BackendError;

use std::any::Any;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::Result;
use crate::position::Position;
use crate::record::{Record, RecordId};

/// Positions a backend is able to store.
///
/// `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageLimits {
    /// Most fractional digits a stored position may carry.
    pub max_scale: Option<u32>,
    /// Largest storable absolute value.
    pub max_magnitude: Option<Decimal>,
}

impl StorageLimits {
    /// True if `position` fits within these limits.
    pub fn admits(&self, position: Position) -> bool {
        let value = position.value();
        let scale_ok = self
            .max_scale
            .is_none_or(|max| value.normalize().scale() <= max);
        let magnitude_ok = self.max_magnitude.is_none_or(|max| value.abs() <= max);
        scale_ok && magnitude_ok
    }
}

/// Backend trait abstracting the underlying record store.
///
/// All implementations must be `Send` and `Sync` to allow sharing across
/// tasks, and implement `Any` to allow for downcasting if needed.
#[async_trait]
pub trait BackendImpl: Send + Sync + Any {
    /// Retrieve a record by ID.
    ///
    /// Fails with [`BackendError::RecordNotFound`] if it does not exist.
    async fn get(&self, id: &RecordId) -> Result<Record>;

    /// Store a new record.
    ///
    /// Fails with [`BackendError::RecordExists`] if the ID is taken and with
    /// [`BackendError::UniqueViolation`] if another record of the group
    /// already holds the position.
    async fn insert(&self, record: Record) -> Result<()>;

    /// Place a record at `position` in `group`, moving it between groups if
    /// needed. Single atomic write.
    ///
    /// Fails with [`BackendError::UniqueViolation`] on a position collision,
    /// in which case the record keeps its previous placement.
    async fn update_placement(
        &self,
        id: &RecordId,
        group: &str,
        position: Option<Position>,
    ) -> Result<()>;

    /// Replace the positions of several records of one group.
    ///
    /// Existing positions of the listed records are released before the new
    /// ones are claimed, so a permutation of the current positions is a
    /// valid rewrite. Records that are no longer in `group` are skipped.
    /// Either every remaining update applies or none does.
    ///
    /// Returns the number of records rewritten.
    async fn rewrite_positions(&self, group: &str, updates: &[(RecordId, Position)])
    -> Result<usize>;

    /// Remove a record. Fails with [`BackendError::RecordNotFound`] if absent.
    async fn delete(&self, id: &RecordId) -> Result<()>;

    /// All records of a group in display order (see
    /// [`Record::display_cmp`](crate::record::Record::display_cmp)).
    async fn list_group(&self, group: &str) -> Result<Vec<Record>>;

    /// Non-null positions of a group, ascending.
    async fn group_positions(&self, group: &str) -> Result<Vec<Position>>;

    /// The greatest position in a group, if any record is positioned.
    async fn last_position(&self, group: &str) -> Result<Option<Position>>;

    /// Every distinct group key present in storage, sorted.
    async fn groups(&self) -> Result<Vec<String>>;

    /// Storage engine behind this backend.
    fn driver(&self) -> Driver;

    /// Range and precision of storable positions. Unbounded by default.
    fn limits(&self) -> StorageLimits {
        StorageLimits::default()
    }

    /// Returns a reference to the backend instance as a dynamic `Any` type.
    fn as_any(&self) -> &dyn Any;
}

//! Persisted records and their identifiers.

use serde::{Deserialize, Serialize};

use crate::position::Position;

/// Opaque identifier of a record.
///
/// Freshly created records get a random UUID, but any non-empty string is
/// accepted so callers can reuse identifiers from their own systems.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Creates a new ID from any string-like input.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Generate a random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&RecordId> for RecordId {
    fn from(id: &RecordId) -> Self {
        id.clone()
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

impl PartialEq<&str> for RecordId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// A record placed in a group.
///
/// `position` is `None` only for records imported without a placement;
/// those sort after every positioned record of their group until the group
/// is rebalanced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier.
    pub id: RecordId,
    /// Grouping key, e.g. a column identifier.
    pub group: String,
    /// Place within the group.
    pub position: Option<Position>,
    /// Caller-owned data, stored verbatim.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Creation time in milliseconds since the Unix epoch. Breaks ties when
    /// ordering records that share a position or have none.
    pub created_at: i64,
}

impl Record {
    /// Display order within a group: position ascending with unpositioned
    /// records last, then creation time, then id.
    pub fn display_cmp(&self, other: &Record) -> std::cmp::Ordering {
        let placement = |r: &Record| (r.position.is_none(), r.position);
        placement(self)
            .cmp(&placement(other))
            .then(self.created_at.cmp(&other.created_at))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Sort records into display order.
pub fn sort_for_display(records: &mut [Record]) {
    records.sort_by(Record::display_cmp);
}

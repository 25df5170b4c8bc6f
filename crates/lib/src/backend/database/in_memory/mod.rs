//! In-memory backend implementation
//!
//! This module provides an in-memory implementation of the BackendImpl
//! trait, suitable for testing, development, or single-process deployments
//! that persist by snapshotting the whole state to a JSON file.

mod persistence;
mod storage;

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::Result;
use crate::backend::{BackendImpl, Driver};
use crate::position::Position;
use crate::record::{Record, RecordId};

/// Records plus the uniqueness index over `(group, position)`.
///
/// Both maps are only ever modified together under the same write lock, so
/// the index is always exactly the set of positioned records.
#[derive(Debug, Default)]
pub(crate) struct State {
    pub(crate) records: HashMap<RecordId, Record>,
    pub(crate) placements: BTreeMap<(String, Position), RecordId>,
}

/// A simple in-memory backend.
///
/// Uniqueness of `(group, position)` is enforced by an ordered index that is
/// checked and updated under one write lock, which gives the same atomic
/// claim-or-fail behaviour as a database constraint.
///
/// Persistence is available via `save_to_file` and `load_from_file`,
/// serializing every record to JSON.
#[derive(Debug, Default)]
pub struct InMemory {
    pub(crate) state: RwLock<State>,
}

impl InMemory {
    /// Creates a new, empty `InMemory` backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    /// True when no records are stored.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.records.is_empty()
    }

    /// Saves every record to a JSON file.
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        persistence::save_to_file(self, path).await
    }

    /// Loads a backend from a JSON file written by `save_to_file`.
    ///
    /// If the file does not exist, a new, empty `InMemory` backend is returned.
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        persistence::load_from_file(path).await
    }

    /// Serialize the current state to a JSON string.
    pub async fn to_json(&self) -> Result<String> {
        persistence::to_json(self).await
    }

    /// Build a backend from JSON produced by `to_json`.
    pub fn from_json(json: &str) -> Result<Self> {
        persistence::from_json(json)
    }
}

#[async_trait]
impl BackendImpl for InMemory {
    async fn get(&self, id: &RecordId) -> Result<Record> {
        storage::get(self, id).await
    }

    async fn insert(&self, record: Record) -> Result<()> {
        storage::insert(self, record).await
    }

    async fn update_placement(
        &self,
        id: &RecordId,
        group: &str,
        position: Option<Position>,
    ) -> Result<()> {
        storage::update_placement(self, id, group, position).await
    }

    async fn rewrite_positions(
        &self,
        group: &str,
        updates: &[(RecordId, Position)],
    ) -> Result<usize> {
        storage::rewrite_positions(self, group, updates).await
    }

    async fn delete(&self, id: &RecordId) -> Result<()> {
        storage::delete(self, id).await
    }

    async fn list_group(&self, group: &str) -> Result<Vec<Record>> {
        storage::list_group(self, group).await
    }

    async fn group_positions(&self, group: &str) -> Result<Vec<Position>> {
        storage::group_positions(self, group).await
    }

    async fn last_position(&self, group: &str) -> Result<Option<Position>> {
        storage::last_position(self, group).await
    }

    async fn groups(&self) -> Result<Vec<String>> {
        storage::groups(self).await
    }

    fn driver(&self) -> Driver {
        Driver::Other
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

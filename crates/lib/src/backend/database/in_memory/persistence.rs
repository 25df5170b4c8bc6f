//! Persistence operations for the InMemory backend
//!
//! This module handles serialization and file I/O for saving/loading
//! the in-memory state to/from JSON files. Only records are written; the
//! placement index is rebuilt on load, which also re-checks uniqueness.

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use super::{InMemory, State};
use crate::{
    Result,
    backend::errors::BackendError,
    record::{Record, RecordId},
};

/// The current persistence file format version.
/// v0 indicates this is an unstable format subject to breaking changes.
const PERSISTENCE_VERSION: u8 = 0;

/// Helper to check if version is default (0) for serde skip_serializing_if
fn is_v0(v: &u8) -> bool {
    *v == 0
}

/// Validates the persistence version during deserialization.
fn validate_persistence_version<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let version = u8::deserialize(deserializer)?;
    if version != PERSISTENCE_VERSION {
        return Err(serde::de::Error::custom(format!(
            "unsupported persistence version {version}; only version {PERSISTENCE_VERSION} is supported"
        )));
    }
    Ok(version)
}

/// Serializable form of the InMemory backend
#[derive(Serialize, Deserialize)]
struct SerializableState {
    /// File format version for compatibility checking
    #[serde(
        rename = "_v",
        default,
        skip_serializing_if = "is_v0",
        deserialize_with = "validate_persistence_version"
    )]
    version: u8,
    records: Vec<Record>,
}

pub(crate) async fn to_json(backend: &InMemory) -> Result<String> {
    let state = backend.state.read().await;
    let mut records: Vec<Record> = state.records.values().cloned().collect();
    // Stable file contents for identical states.
    records.sort_by(|a, b| a.id.cmp(&b.id));
    let serializable = SerializableState {
        version: PERSISTENCE_VERSION,
        records,
    };
    serde_json::to_string_pretty(&serializable)
        .map_err(|e| BackendError::SerializationFailed { source: e }.into())
}

pub(crate) fn from_json(json: &str) -> Result<InMemory> {
    let serializable: SerializableState = serde_json::from_str(json)
        .map_err(|e| BackendError::DeserializationFailed { source: e })?;

    let mut state = State::default();
    for record in serializable.records {
        if state.records.contains_key(&record.id) {
            return Err(BackendError::RecordExists { id: record.id }.into());
        }
        if let Some(position) = record.position {
            let key = (record.group.clone(), position);
            if let Some(holder) = state.placements.get(&key) {
                return Err(duplicate_on_load(&record, holder).into());
            }
            state.placements.insert(key, record.id.clone());
        }
        state.records.insert(record.id.clone(), record);
    }

    Ok(InMemory {
        state: tokio::sync::RwLock::new(state),
    })
}

fn duplicate_on_load(record: &Record, holder: &RecordId) -> BackendError {
    BackendError::UniqueViolation {
        group: record.group.clone(),
        position: record.position,
        detail: format!(
            "records {} and {holder} share a position in the saved state",
            record.id
        ),
    }
}

/// Saves the backend state to a JSON file.
pub(crate) async fn save_to_file<P: AsRef<Path>>(backend: &InMemory, path: P) -> Result<()> {
    let json = to_json(backend).await?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| BackendError::FileIo { source: e })?;
    Ok(())
}

/// Loads the backend state from a JSON file.
pub(crate) async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<InMemory> {
    let path = path.as_ref();
    match tokio::fs::read_to_string(path).await {
        Ok(json) => from_json(&json),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(InMemory::new()),
        Err(e) => Err(BackendError::FileIo { source: e }.into()),
    }
}

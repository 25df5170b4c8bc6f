//! Core storage operations for the InMemory backend

use std::collections::{BTreeSet, HashSet};

use super::{InMemory, State};
use crate::{
    Result,
    backend::errors::BackendError,
    position::Position,
    record::{Record, RecordId, sort_for_display},
};

fn placement_key(group: &str, position: Position) -> (String, Position) {
    (group.to_string(), position)
}

fn violation(group: &str, position: Position, holder: &RecordId) -> BackendError {
    BackendError::UniqueViolation {
        group: group.to_string(),
        position: Some(position),
        detail: format!("position already held by record {holder}"),
    }
}

/// Retrieves a record by ID.
pub(crate) async fn get(backend: &InMemory, id: &RecordId) -> Result<Record> {
    let state = backend.state.read().await;
    state
        .records
        .get(id)
        .cloned()
        .ok_or_else(|| BackendError::RecordNotFound { id: id.clone() }.into())
}

/// Stores a new record, claiming its placement.
pub(crate) async fn insert(backend: &InMemory, record: Record) -> Result<()> {
    let mut state = backend.state.write().await;
    if state.records.contains_key(&record.id) {
        return Err(BackendError::RecordExists { id: record.id }.into());
    }
    if let Some(position) = record.position {
        let key = placement_key(&record.group, position);
        if let Some(holder) = state.placements.get(&key) {
            return Err(violation(&record.group, position, holder).into());
        }
        state.placements.insert(key, record.id.clone());
    }
    state.records.insert(record.id.clone(), record);
    Ok(())
}

/// Moves a record to `(group, position)`.
///
/// The claim check and the update happen under one write lock.
pub(crate) async fn update_placement(
    backend: &InMemory,
    id: &RecordId,
    group: &str,
    position: Option<Position>,
) -> Result<()> {
    let mut state = backend.state.write().await;
    let State {
        records,
        placements,
    } = &mut *state;

    let record = records
        .get_mut(id)
        .ok_or_else(|| BackendError::RecordNotFound { id: id.clone() })?;

    if let Some(position) = position
        && let Some(holder) = placements.get(&placement_key(group, position))
        && holder != id
    {
        return Err(violation(group, position, holder).into());
    }

    if let Some(old) = record.position {
        placements.remove(&placement_key(&record.group, old));
    }
    if let Some(position) = position {
        placements.insert(placement_key(group, position), id.clone());
    }
    record.group = group.to_string();
    record.position = position;
    Ok(())
}

/// Applies a batch of position rewrites within one group, all or nothing.
pub(crate) async fn rewrite_positions(
    backend: &InMemory,
    group: &str,
    updates: &[(RecordId, Position)],
) -> Result<usize> {
    let mut state = backend.state.write().await;
    let State {
        records,
        placements,
    } = &mut *state;

    let applicable: Vec<&(RecordId, Position)> = updates
        .iter()
        .filter(|(id, _)| records.get(id).is_some_and(|r| r.group == group))
        .collect();
    let rewritten: HashSet<&RecordId> = applicable.iter().map(|(id, _)| id).collect();

    // Validate the target layout before touching anything.
    let mut claimed = HashSet::new();
    for (id, position) in &applicable {
        if !claimed.insert(*position) {
            return Err(violation(group, *position, id).into());
        }
        if let Some(holder) = placements.get(&placement_key(group, *position))
            && !rewritten.contains(holder)
        {
            return Err(violation(group, *position, holder).into());
        }
    }

    for (id, _) in &applicable {
        if let Some(old) = records.get(id).and_then(|r| r.position) {
            placements.remove(&placement_key(group, old));
        }
    }
    for (id, position) in &applicable {
        placements.insert(placement_key(group, *position), id.clone());
        if let Some(record) = records.get_mut(id) {
            record.position = Some(*position);
        }
    }

    Ok(applicable.len())
}

/// Removes a record and releases its placement.
pub(crate) async fn delete(backend: &InMemory, id: &RecordId) -> Result<()> {
    let mut state = backend.state.write().await;
    let record = state
        .records
        .remove(id)
        .ok_or_else(|| BackendError::RecordNotFound { id: id.clone() })?;
    if let Some(position) = record.position {
        state
            .placements
            .remove(&placement_key(&record.group, position));
    }
    Ok(())
}

/// Records of a group in display order.
pub(crate) async fn list_group(backend: &InMemory, group: &str) -> Result<Vec<Record>> {
    let state = backend.state.read().await;
    let mut records: Vec<Record> = state
        .records
        .values()
        .filter(|r| r.group == group)
        .cloned()
        .collect();
    sort_for_display(&mut records);
    Ok(records)
}

/// Ascending positions of a group, read from the ordered index.
pub(crate) async fn group_positions(backend: &InMemory, group: &str) -> Result<Vec<Position>> {
    let state = backend.state.read().await;
    Ok(state
        .placements
        .keys()
        .filter(|(g, _)| g == group)
        .map(|(_, p)| *p)
        .collect())
}

/// Greatest position of a group.
pub(crate) async fn last_position(backend: &InMemory, group: &str) -> Result<Option<Position>> {
    let state = backend.state.read().await;
    Ok(state
        .placements
        .keys()
        .filter(|(g, _)| g == group)
        .map(|(_, p)| *p)
        .next_back())
}

/// Distinct group keys, sorted.
pub(crate) async fn groups(backend: &InMemory) -> Result<Vec<String>> {
    let state = backend.state.read().await;
    let groups: BTreeSet<&String> = state.records.values().map(|r| &r.group).collect();
    Ok(groups.into_iter().cloned().collect())
}

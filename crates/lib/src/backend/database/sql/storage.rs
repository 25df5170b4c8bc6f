//! Record storage operations for SQL backends.
//!
//! This module implements the core CRUD operations for records using sqlx.
//! Every statement that claims a position goes through
//! [`SqlxWriteExt::write_context`] so uniqueness violations surface as
//! `BackendError::UniqueViolation`.

use crate::Result;
use crate::backend::errors::BackendError;
use crate::position::Position;
use crate::record::{Record, RecordId};

use super::{SqlxBackend, SqlxResultExt, SqlxWriteExt, column_to_position, position_to_column};

/// Row shape shared by every record query.
type RecordRow = (String, String, Option<i64>, String, i64);

const SELECT_RECORD: &str = "SELECT id, group_key, position, payload, created_at FROM records";

fn row_to_record((id, group, position, payload, created_at): RecordRow) -> Result<Record> {
    let position = position
        .map(|value| column_to_position(&id, value))
        .transpose()?;
    let payload = serde_json::from_str(&payload)
        .map_err(|e| BackendError::DeserializationFailed { source: e })?;
    Ok(Record {
        id: RecordId::from(id),
        group,
        position,
        payload,
        created_at,
    })
}

fn optional_column(position: Option<Position>) -> Result<Option<i64>> {
    position.map(position_to_column).transpose()
}

/// Get a record by ID.
pub async fn get(backend: &SqlxBackend, id: &RecordId) -> Result<Record> {
    let row: Option<RecordRow> = sqlx::query_as(&format!("{SELECT_RECORD} WHERE id = $1"))
        .bind(id.as_str())
        .fetch_optional(backend.pool())
        .await
        .sql_context("Failed to get record")?;

    match row {
        Some(row) => row_to_record(row),
        None => Err(BackendError::RecordNotFound { id: id.clone() }.into()),
    }
}

/// Store a new record, claiming its placement.
pub async fn insert(backend: &SqlxBackend, record: Record) -> Result<()> {
    let pool = backend.pool();
    let column = optional_column(record.position)?;
    let payload = serde_json::to_string(&record.payload)
        .map_err(|e| BackendError::SerializationFailed { source: e })?;

    // The primary key violation would otherwise be indistinguishable from a
    // position conflict on some drivers.
    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM records WHERE id = $1")
        .bind(record.id.as_str())
        .fetch_optional(pool)
        .await
        .sql_context("Failed to check record id")?;
    if existing.is_some() {
        return Err(BackendError::RecordExists { id: record.id }.into());
    }

    sqlx::query(
        "INSERT INTO records (id, group_key, position, payload, created_at)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(record.id.as_str())
    .bind(record.group.as_str())
    .bind(column)
    .bind(payload)
    .bind(record.created_at)
    .execute(pool)
    .await
    .write_context(backend, "Failed to insert record", &record.group, record.position)?;

    Ok(())
}

/// Move a record to `(group, position)` in a single statement.
pub async fn update_placement(
    backend: &SqlxBackend,
    id: &RecordId,
    group: &str,
    position: Option<Position>,
) -> Result<()> {
    let column = optional_column(position)?;

    let result = sqlx::query("UPDATE records SET group_key = $1, position = $2 WHERE id = $3")
        .bind(group)
        .bind(column)
        .bind(id.as_str())
        .execute(backend.pool())
        .await
        .write_context(backend, "Failed to update placement", group, position)?;

    if result.rows_affected() == 0 {
        return Err(BackendError::RecordNotFound { id: id.clone() }.into());
    }
    Ok(())
}

/// Apply a batch of position rewrites within one group, all or nothing.
///
/// Runs in one transaction: the listed records first release their
/// positions, then each claims its new one. Records that are no longer in
/// `group` match no rows and are skipped.
pub async fn rewrite_positions(
    backend: &SqlxBackend,
    group: &str,
    updates: &[(RecordId, Position)],
) -> Result<usize> {
    let columns = updates
        .iter()
        .map(|(id, position)| Ok((id, *position, position_to_column(*position)?)))
        .collect::<Result<Vec<_>>>()?;

    let mut tx = backend
        .pool()
        .begin()
        .await
        .sql_context("Failed to begin transaction")?;

    for (id, _, _) in &columns {
        sqlx::query("UPDATE records SET position = NULL WHERE id = $1 AND group_key = $2")
            .bind(id.as_str())
            .bind(group)
            .execute(&mut *tx)
            .await
            .sql_context("Failed to release position")?;
    }

    let mut rewritten = 0usize;
    for (id, position, column) in &columns {
        let result =
            sqlx::query("UPDATE records SET position = $1 WHERE id = $2 AND group_key = $3")
                .bind(*column)
                .bind(id.as_str())
                .bind(group)
                .execute(&mut *tx)
                .await
                .write_context(backend, "Failed to rewrite position", group, Some(*position))?;
        rewritten += result.rows_affected() as usize;
    }

    tx.commit()
        .await
        .sql_context("Failed to commit position rewrite")?;

    Ok(rewritten)
}

/// Delete a record, releasing its position.
pub async fn delete(backend: &SqlxBackend, id: &RecordId) -> Result<()> {
    let result = sqlx::query("DELETE FROM records WHERE id = $1")
        .bind(id.as_str())
        .execute(backend.pool())
        .await
        .sql_context("Failed to delete record")?;

    if result.rows_affected() == 0 {
        return Err(BackendError::RecordNotFound { id: id.clone() }.into());
    }
    Ok(())
}

/// Records of a group in display order.
pub async fn list_group(backend: &SqlxBackend, group: &str) -> Result<Vec<Record>> {
    let rows: Vec<RecordRow> = sqlx::query_as(&format!(
        "{SELECT_RECORD} WHERE group_key = $1
         ORDER BY (position IS NULL), position, created_at, id"
    ))
    .bind(group)
    .fetch_all(backend.pool())
    .await
    .sql_context("Failed to list group")?;

    let mut records = rows
        .into_iter()
        .map(row_to_record)
        .collect::<Result<Vec<_>>>()?;
    // Id tie-breaks follow collation in SQL; settle them the same way as
    // every other backend.
    crate::record::sort_for_display(&mut records);
    Ok(records)
}

/// Ascending positions of a group.
pub async fn group_positions(backend: &SqlxBackend, group: &str) -> Result<Vec<Position>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT id, position FROM records
         WHERE group_key = $1 AND position IS NOT NULL
         ORDER BY position",
    )
    .bind(group)
    .fetch_all(backend.pool())
    .await
    .sql_context("Failed to read group positions")?;

    rows.into_iter()
        .map(|(id, value)| column_to_position(&id, value))
        .collect()
}

/// Greatest position of a group.
pub async fn last_position(backend: &SqlxBackend, group: &str) -> Result<Option<Position>> {
    let row: Option<(String, i64)> = sqlx::query_as(
        "SELECT id, position FROM records
         WHERE group_key = $1 AND position IS NOT NULL
         ORDER BY position DESC
         LIMIT 1",
    )
    .bind(group)
    .fetch_optional(backend.pool())
    .await
    .sql_context("Failed to read last position")?;

    row.map(|(id, value)| column_to_position(&id, value))
        .transpose()
}

/// Distinct group keys, sorted.
pub async fn groups(backend: &SqlxBackend) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT DISTINCT group_key FROM records")
        .fetch_all(backend.pool())
        .await
        .sql_context("Failed to list groups")?;

    let mut groups: Vec<String> = rows.into_iter().map(|(g,)| g).collect();
    groups.sort();
    Ok(groups)
}

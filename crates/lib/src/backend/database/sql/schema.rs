//! Tables, indexes and schema versioning for the SQL backends.
//!
//! The DDL is portable between SQLite and PostgreSQL. The name of the
//! position constraint must match
//! [`POSITION_CONSTRAINT`](crate::backend::conflict::POSITION_CONSTRAINT),
//! which the conflict classifiers fall back to.
//!
//! Migrations are Rust functions rather than SQL files so a step can branch
//! on [`DbKind`](super::DbKind). To change the schema, bump
//! [`SCHEMA_VERSION`], write a `migrate_vN_to_vM(backend)` step and
//! dispatch to it from `run_migration`.

use crate::Result;
use crate::backend::errors::BackendError;

use super::{SqlxBackend, SqlxResultExt};

/// Version written by this build.
pub const SCHEMA_VERSION: i64 = 1;

/// Table definitions, applied in order on every connect.
pub const CREATE_TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schema_version (
        version BIGINT PRIMARY KEY
    )",
    // position: the decimal scaled by 10^STORAGE_SCALE, NULL while
    // unpositioned. NULLs never collide under the unique constraint.
    // payload: opaque JSON text.
    "CREATE TABLE IF NOT EXISTS records (
        id TEXT PRIMARY KEY NOT NULL,
        group_key TEXT NOT NULL,
        position BIGINT,
        payload TEXT NOT NULL,
        created_at BIGINT NOT NULL,
        CONSTRAINT records_group_position_unique UNIQUE (group_key, position)
    )",
];

/// Secondary indexes. `(group_key, position)` is already covered by the
/// unique constraint.
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_records_group_created ON records(group_key, created_at)",
];

/// Create missing tables and indexes and bring the schema up to
/// [`SCHEMA_VERSION`].
///
/// A database written by a newer build is refused with
/// `BackendError::InvalidConfiguration`.
pub async fn initialize(backend: &SqlxBackend) -> Result<()> {
    let pool = backend.pool();

    for statement in CREATE_TABLES {
        sqlx::query(statement)
            .execute(pool)
            .await
            .sql_context(&format!("Failed to create table ({statement})"))?;
    }

    let stored: Option<(i64,)> = sqlx::query_as("SELECT version FROM schema_version")
        .fetch_optional(pool)
        .await
        .sql_context("Failed to read schema version")?;

    match stored {
        None => {
            tracing::info!(version = SCHEMA_VERSION, "Initializing SQL schema");
            sqlx::query("INSERT INTO schema_version (version) VALUES ($1)")
                .bind(SCHEMA_VERSION)
                .execute(pool)
                .await
                .sql_context("Failed to record schema version")?;
        }
        Some((version,)) if version < SCHEMA_VERSION => {
            migrate(backend, version).await?;
        }
        Some((version,)) if version > SCHEMA_VERSION => {
            return Err(BackendError::InvalidConfiguration {
                reason: format!(
                    "database schema v{version} is newer than supported v{SCHEMA_VERSION}"
                ),
            }
            .into());
        }
        Some(_) => {}
    }

    for statement in CREATE_INDEXES {
        sqlx::query(statement)
            .execute(pool)
            .await
            .sql_context(&format!("Failed to create index ({statement})"))?;
    }

    Ok(())
}

/// Step the schema from `from` to [`SCHEMA_VERSION`] one version at a time,
/// recording each completed step.
async fn migrate(backend: &SqlxBackend, from: i64) -> Result<()> {
    tracing::info!(from, to = SCHEMA_VERSION, "Migrating SQL schema");

    for next in (from + 1)..=SCHEMA_VERSION {
        run_migration(backend, next - 1, next).await?;
        sqlx::query("UPDATE schema_version SET version = $1")
            .bind(next)
            .execute(backend.pool())
            .await
            .sql_context(&format!("Failed to record schema version {next}"))?;
        tracing::info!(version = next, "Migration step completed");
    }
    Ok(())
}

/// Dispatch a single migration step.
///
/// Version 1 is the first schema, so no step exists yet.
async fn run_migration(_backend: &SqlxBackend, from: i64, to: i64) -> Result<()> {
    Err(BackendError::InvalidConfiguration {
        reason: format!("no migration step from schema v{from} to v{to}"),
    }
    .into())
}

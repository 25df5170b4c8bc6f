//! Record storage in SQLite or PostgreSQL via sqlx.
//!
//! Both engines share one [`SqlxBackend`] over an `AnyPool`; the few dialect
//! differences are keyed on [`DbKind`]. Enable them with the `sqlite` and
//! `postgres` features.
//!
//! Positions live in a `BIGINT` column as integers scaled by
//! `10^STORAGE_SCALE`. Ordering and the `(group_key, position)` uniqueness
//! constraint therefore compare exact integers on every engine, never
//! collation-dependent text.
//!
//! Tables are created and migrated by [`schema::initialize`] on connect.

mod storage;

/// Table definitions and versioned migrations.
pub mod schema;

use std::any::Any;
#[cfg(feature = "postgres")]
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::AnyPool;
#[cfg(feature = "postgres")]
use sqlx::Executor;
use sqlx::any::AnyPoolOptions;

use crate::Result;
use crate::backend::{
    BackendError, BackendImpl, StorageLimits,
    conflict::{ConflictClassifier, Driver, DriverClassifier, StorageFailure, classifier_for},
};
use crate::position::Position;
use crate::record::{Record, RecordId};

/// Number of fractional digits kept by the `position` column.
pub const STORAGE_SCALE: u32 = 10;

/// Attach a context message to sqlx failures, turning them into
/// `BackendError::SqlxError`.
pub(crate) trait SqlxResultExt<T> {
    fn sql_context(self, context: &str) -> Result<T>;
}

impl<T> SqlxResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn sql_context(self, context: &str) -> Result<T> {
        self.map_err(|e| {
            BackendError::SqlxError {
                reason: format!("{context}: {e}"),
                source: Some(e),
            }
            .into()
        })
    }
}

/// Like [`SqlxResultExt`], but for statements that claim a position.
///
/// Uniqueness violations are recognized by the backend's classifier and
/// reported as `BackendError::UniqueViolation`; every other failure is
/// passed through as `SqlxError`.
pub(crate) trait SqlxWriteExt<T> {
    fn write_context(
        self,
        backend: &SqlxBackend,
        context: &str,
        group: &str,
        position: Option<Position>,
    ) -> Result<T>;
}

impl<T> SqlxWriteExt<T> for std::result::Result<T, sqlx::Error> {
    fn write_context(
        self,
        backend: &SqlxBackend,
        context: &str,
        group: &str,
        position: Option<Position>,
    ) -> Result<T> {
        self.map_err(|e| backend.translate_write_error(e, context, group, position))
    }
}

/// Engine behind an [`SqlxBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    /// Embedded SQLite
    Sqlite,
    /// PostgreSQL server
    Postgres,
}

impl From<DbKind> for Driver {
    fn from(kind: DbKind) -> Self {
        match kind {
            DbKind::Sqlite => Driver::Sqlite,
            DbKind::Postgres => Driver::Postgres,
        }
    }
}

/// `BackendImpl` over a sqlx connection pool.
///
/// Uniqueness of `(group, position)` is enforced by the database
/// constraint; failed writes are classified with the [`DriverClassifier`]
/// for the engine, so callers see `UniqueViolation` regardless of dialect.
///
/// Tests against a shared PostgreSQL server should use
/// [`SqlxBackend::connect_postgres_isolated`], which gives every instance
/// its own schema.
pub struct SqlxBackend {
    pool: AnyPool,
    kind: DbKind,
    classifier: DriverClassifier,
}

impl SqlxBackend {
    fn new(pool: AnyPool, kind: DbKind) -> Self {
        Self {
            pool,
            kind,
            classifier: classifier_for(kind.into()),
        }
    }

    /// The connection pool.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// True for SQLite.
    pub fn is_sqlite(&self) -> bool {
        self.kind == DbKind::Sqlite
    }

    /// Classify a failed write.
    fn translate_write_error(
        &self,
        e: sqlx::Error,
        context: &str,
        group: &str,
        position: Option<Position>,
    ) -> crate::Error {
        if let sqlx::Error::Database(db) = &e {
            let code = db.code();
            let failure = StorageFailure {
                code: code.as_deref(),
                message: db.message(),
                constraint: db.constraint(),
            };
            if self.classifier.is_unique_violation(&failure) {
                return BackendError::UniqueViolation {
                    group: group.to_string(),
                    position,
                    detail: db.message().to_string(),
                }
                .into();
            }
        }
        BackendError::SqlxError {
            reason: format!("{context}: {e}"),
            source: Some(e),
        }
        .into()
    }
}

impl std::fmt::Debug for SqlxBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlxBackend")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Convert a position to its column value.
pub(crate) fn position_to_column(position: Position) -> Result<i64> {
    let units = position
        .to_units(STORAGE_SCALE)
        .ok_or_else(|| BackendError::PositionOutOfRange {
            position,
            reason: format!("more than {STORAGE_SCALE} fractional digits"),
        })?;
    i64::try_from(units).map_err(|_| {
        BackendError::PositionOutOfRange {
            position,
            reason: "magnitude exceeds the 64-bit column".to_string(),
        }
        .into()
    })
}

/// What the `position` column can hold.
pub(crate) fn column_limits() -> StorageLimits {
    StorageLimits {
        max_scale: Some(STORAGE_SCALE),
        max_magnitude: Some(Decimal::new(i64::MAX, STORAGE_SCALE)),
    }
}

/// Convert a column value back to a position.
pub(crate) fn column_to_position(id: &str, value: i64) -> Result<Position> {
    Position::from_units(i128::from(value), STORAGE_SCALE).ok_or_else(|| {
        BackendError::CorruptRow {
            id: RecordId::from(id),
            reason: format!("position column {value} is not representable"),
        }
        .into()
    })
}

/// Pragmas applied after connecting. WAL and relaxed sync only make sense
/// for files; the busy timeout applies to both.
#[cfg(feature = "sqlite")]
fn sqlite_pragmas(in_memory: bool) -> &'static str {
    if in_memory {
        "PRAGMA busy_timeout = 5000;"
    } else {
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = 5000;"
    }
}

#[cfg(feature = "sqlite")]
impl SqlxBackend {
    /// Open (or create) a SQLite database file and initialize its schema.
    ///
    /// ```ignore
    /// use ordinal::{Board, backend::database::Sqlite};
    ///
    /// let board = Board::open(Box::new(Sqlite::open_sqlite("board.db").await?));
    /// ```
    pub async fn open_sqlite<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let url = format!("sqlite:{}?mode=rwc", path.as_ref().display());
        Self::connect_sqlite(&url).await
    }

    /// Connect to SQLite by URL, e.g. `sqlite:./board.db`.
    pub async fn connect_sqlite(url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let in_memory = url.contains("mode=memory");
        let mut options = AnyPoolOptions::new().max_connections(5);
        if in_memory {
            // A shared-cache memory database is dropped with its last
            // connection, so keep one open for the life of the pool.
            options = options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = options
            .connect(url)
            .await
            .sql_context("Failed to connect to SQLite")?;

        sqlx::query(sqlite_pragmas(in_memory))
            .execute(&pool)
            .await
            .sql_context("Failed to configure SQLite")?;

        let backend = Self::new(pool, DbKind::Sqlite);
        schema::initialize(&backend).await?;
        Ok(backend)
    }

    /// A private in-memory SQLite database, gone when the backend is dropped.
    pub async fn sqlite_in_memory() -> Result<Self> {
        // Shared cache so every pooled connection sees the same database;
        // a unique name per instance keeps tests apart.
        let url = format!(
            "sqlite:file:mem_{}?mode=memory&cache=shared",
            uuid::Uuid::new_v4()
        );
        Self::connect_sqlite(&url).await
    }
}

#[cfg(feature = "postgres")]
impl SqlxBackend {
    /// Connect to PostgreSQL by URL, using the default search path.
    ///
    /// ```ignore
    /// let backend = Postgres::connect_postgres("postgres://localhost/ordinal").await?;
    /// ```
    pub async fn connect_postgres(url: &str) -> Result<Self> {
        Self::connect_postgres_with_schema(url, None).await
    }

    /// Connect with every pooled connection pinned to `schema`, creating it
    /// first if needed.
    async fn connect_postgres_with_schema(url: &str, schema: Option<String>) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let options = match &schema {
            Some(schema) => {
                let setup = AnyPoolOptions::new()
                    .max_connections(1)
                    .connect(url)
                    .await
                    .sql_context("Failed to connect to PostgreSQL")?;
                sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {schema}"))
                    .execute(&setup)
                    .await
                    .sql_context(&format!("Failed to create schema {schema}"))?;
                setup.close().await;

                // Many isolated test backends share one server: keep pools
                // small and wait for a connection instead of failing.
                AnyPoolOptions::new()
                    .max_connections(2)
                    .acquire_timeout(Duration::from_secs(30))
            }
            None => AnyPoolOptions::new().max_connections(5),
        };

        let search_path = schema.map(|s| format!("SET search_path TO {s}"));
        let pool = options
            .after_connect(move |conn, _meta| {
                let search_path = search_path.clone();
                Box::pin(async move {
                    if let Some(statement) = search_path {
                        conn.execute(statement.as_str()).await?;
                    }
                    Ok(())
                })
            })
            .connect(url)
            .await
            .sql_context("Failed to connect to PostgreSQL")?;

        let backend = Self::new(pool, DbKind::Postgres);
        schema::initialize(&backend).await?;
        Ok(backend)
    }

    /// Connect inside a fresh, uniquely named schema.
    pub async fn connect_postgres_isolated(url: &str) -> Result<Self> {
        // Unquoted schema names must start with a letter.
        let schema = format!("test_{}", uuid::Uuid::new_v4().simple());
        Self::connect_postgres_with_schema(url, Some(schema)).await
    }
}

#[async_trait]
impl BackendImpl for SqlxBackend {
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
        self.kind.into()
    }

    fn limits(&self) -> StorageLimits {
        column_limits()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// [`SqlxBackend`] opened on SQLite.
#[cfg(feature = "sqlite")]
pub type Sqlite = SqlxBackend;

/// [`SqlxBackend`] connected to PostgreSQL.
#[cfg(feature = "postgres")]
pub type Postgres = SqlxBackend;

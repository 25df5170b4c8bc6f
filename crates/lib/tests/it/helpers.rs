use std::any::Any;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use ordinal::{
    Board, Config, Position, Record, RecordId, Result,
    backend::{BackendError, BackendImpl, Driver, StorageLimits, database::InMemory},
};

// ==========================
// CORE TEST FACTORIES
// ==========================
// These are the foundation for all test setup. They provide a single point of change
// for backend matrix testing via TEST_BACKEND env var.

/// Creates a test backend based on TEST_BACKEND env var.
///
/// Supported values:
/// - "inmemory" or unset: InMemory backend (default)
/// - "sqlite": SQLite in-memory backend (requires `sqlite` feature)
/// - "postgres": PostgreSQL backend (requires `postgres` feature and TEST_POSTGRES_URL)
///
/// # Example
/// ```bash
/// # Run tests with SQLite
/// TEST_BACKEND=sqlite cargo test --features sqlite
///
/// # Run tests with PostgreSQL
/// TEST_BACKEND=postgres TEST_POSTGRES_URL="postgres://localhost/ordinal_test" \
///   cargo test --features postgres
/// ```
pub async fn test_backend() -> Box<dyn BackendImpl> {
    match std::env::var("TEST_BACKEND").as_deref() {
        Ok("sqlite") => {
            #[cfg(feature = "sqlite")]
            {
                use ordinal::backend::database::Sqlite;
                Box::new(
                    Sqlite::sqlite_in_memory()
                        .await
                        .expect("Failed to create SQLite backend"),
                )
            }
            #[cfg(not(feature = "sqlite"))]
            {
                panic!("TEST_BACKEND=sqlite requires the 'sqlite' feature to be enabled")
            }
        }
        Ok("postgres") => {
            #[cfg(feature = "postgres")]
            {
                use ordinal::backend::database::Postgres;
                let url = std::env::var("TEST_POSTGRES_URL")
                    .unwrap_or_else(|_| "postgres://localhost/ordinal_test".to_string());
                Box::new(
                    Postgres::connect_postgres_isolated(&url)
                        .await
                        .expect("Failed to connect to PostgreSQL"),
                )
            }
            #[cfg(not(feature = "postgres"))]
            {
                panic!("TEST_BACKEND=postgres requires the 'postgres' feature to be enabled")
            }
        }
        Ok("inmemory") | Ok("") | Err(_) => Box::new(InMemory::new()),
        Ok(other) => {
            panic!("Unknown TEST_BACKEND value: {other}. Supported: inmemory, sqlite, postgres")
        }
    }
}

/// Board over the configured test backend with default settings.
pub async fn test_board() -> Board {
    Board::open(test_backend().await)
}

/// Board over the configured test backend with custom settings.
pub async fn test_board_with(config: Config) -> Board {
    Board::open_with_config(test_backend().await, config).expect("valid test config")
}

/// Create records in `group` and return them in creation order.
pub async fn create_records(board: &Board, group: &str, n: usize) -> Vec<Record> {
    let mut records = Vec::with_capacity(n);
    for i in 0..n {
        records.push(
            board
                .create_record(group, serde_json::json!({ "n": i }))
                .await
                .expect("Failed to create record"),
        );
    }
    records
}

/// Ids of `group` in display order.
pub async fn group_ids(board: &Board, group: &str) -> Vec<RecordId> {
    board
        .list_group(group)
        .await
        .expect("Failed to list group")
        .into_iter()
        .map(|r| r.id)
        .collect()
}

/// Positions of `group` in display order, asserting every record has one.
pub async fn group_positions(board: &Board, group: &str) -> Vec<Position> {
    board
        .list_group(group)
        .await
        .expect("Failed to list group")
        .into_iter()
        .map(|r| r.position.expect("record should be positioned"))
        .collect()
}

/// Assert positions are strictly increasing (distinct and ordered).
pub fn assert_strictly_increasing(positions: &[Position]) {
    for pair in positions.windows(2) {
        assert!(
            pair[0] < pair[1],
            "positions out of order or duplicated: {} then {}",
            pair[0],
            pair[1]
        );
    }
}

// ==========================
// FAULT INJECTION
// ==========================

/// What a [`FlakyBackend`] injects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// A `(group, position)` uniqueness violation
    Conflict,
    /// A storage failure unrelated to positioning
    Storage,
}

/// Backend wrapper failing the next `n` position writes.
///
/// Only `insert` and `update_placement` are affected; everything else is
/// delegated to the wrapped backend.
pub struct FlakyBackend {
    inner: Box<dyn BackendImpl>,
    remaining: AtomicU32,
    fault: Fault,
    writes: AtomicU32,
}

impl FlakyBackend {
    pub fn new(inner: Box<dyn BackendImpl>, fault: Fault, failures: u32) -> Self {
        Self {
            inner,
            remaining: AtomicU32::new(failures),
            fault,
            writes: AtomicU32::new(0),
        }
    }

    /// Position writes attempted so far, failed ones included.
    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Fail the next `n` writes.
    pub fn arm(&self, n: u32) {
        self.remaining.store(n, Ordering::SeqCst);
    }

    fn inject(&self, group: &str, position: Option<Position>) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let armed = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !armed {
            return Ok(());
        }
        Err(match self.fault {
            Fault::Conflict => BackendError::UniqueViolation {
                group: group.to_string(),
                position,
                detail: "injected conflict".to_string(),
            },
            Fault::Storage => BackendError::InvalidConfiguration {
                reason: "injected storage failure".to_string(),
            },
        }
        .into())
    }
}

#[async_trait]
impl BackendImpl for FlakyBackend {
    async fn get(&self, id: &RecordId) -> Result<Record> {
        self.inner.get(id).await
    }

    async fn insert(&self, record: Record) -> Result<()> {
        self.inject(&record.group, record.position)?;
        self.inner.insert(record).await
    }

    async fn update_placement(
        &self,
        id: &RecordId,
        group: &str,
        position: Option<Position>,
    ) -> Result<()> {
        self.inject(group, position)?;
        self.inner.update_placement(id, group, position).await
    }

    async fn rewrite_positions(
        &self,
        group: &str,
        updates: &[(RecordId, Position)],
    ) -> Result<usize> {
        self.inner.rewrite_positions(group, updates).await
    }

    async fn delete(&self, id: &RecordId) -> Result<()> {
        self.inner.delete(id).await
    }

    async fn list_group(&self, group: &str) -> Result<Vec<Record>> {
        self.inner.list_group(group).await
    }

    async fn group_positions(&self, group: &str) -> Result<Vec<Position>> {
        self.inner.group_positions(group).await
    }

    async fn last_position(&self, group: &str) -> Result<Option<Position>> {
        self.inner.last_position(group).await
    }

    async fn groups(&self) -> Result<Vec<String>> {
        self.inner.groups().await
    }

    fn driver(&self) -> Driver {
        self.inner.driver()
    }

    fn limits(&self) -> StorageLimits {
        self.inner.limits()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Board over a [`FlakyBackend`] that starts disarmed.
pub async fn flaky_board(fault: Fault, config: Config) -> Board {
    let backend = FlakyBackend::new(test_backend().await, fault, 0);
    Board::open_with_config(Box::new(backend), config).expect("valid test config")
}

/// The [`FlakyBackend`] behind a board created by [`flaky_board`].
pub fn flaky(board: &Board) -> &FlakyBackend {
    board
        .backend()
        .as_any()
        .downcast_ref::<FlakyBackend>()
        .expect("board should use a FlakyBackend")
}

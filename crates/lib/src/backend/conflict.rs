//! Classification of write failures as position conflicts.
//!
//! Each storage engine reports a uniqueness violation differently. The
//! classifiers in this module are the only place that knows those
//! dialects; backends describe a failure as a [`StorageFailure`] and ask
//! the classifier chosen for their [`Driver`]. Adding a driver means adding
//! a classifier and a `Driver` variant here, nothing else.

/// Name of the composite uniqueness constraint on `(group_key, position)`.
pub const POSITION_CONSTRAINT: &str = "records_group_position_unique";

/// Capability tag identifying the storage engine behind a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Driver {
    /// SQLite
    Sqlite,
    /// PostgreSQL
    Postgres,
    /// MySQL or MariaDB
    MySql,
    /// Anything without a dedicated classifier
    Other,
}

/// Driver-neutral description of a failed write.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageFailure<'a> {
    /// Vendor error code (SQLSTATE, extended result code, ...), if any.
    pub code: Option<&'a str>,
    /// Human readable driver message.
    pub message: &'a str,
    /// Name of the violated constraint, when the driver reports it.
    pub constraint: Option<&'a str>,
}

/// Decides whether a failure is a `(group, position)` uniqueness violation.
pub trait ConflictClassifier: Send + Sync {
    /// Returns true if `failure` is a uniqueness violation.
    fn is_unique_violation(&self, failure: &StorageFailure<'_>) -> bool;
}

/// SQLite: extended result code 2067 (`SQLITE_CONSTRAINT_UNIQUE`) or the
/// "UNIQUE constraint failed" message. The primary key code 1555 alone is
/// not treated as a position conflict.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteClassifier;

impl ConflictClassifier for SqliteClassifier {
    fn is_unique_violation(&self, failure: &StorageFailure<'_>) -> bool {
        failure.code == Some("2067") || failure.message.contains("UNIQUE constraint failed")
    }
}

/// PostgreSQL: SQLSTATE `23505` (`unique_violation`).
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresClassifier;

impl ConflictClassifier for PostgresClassifier {
    fn is_unique_violation(&self, failure: &StorageFailure<'_>) -> bool {
        failure.code == Some("23505")
    }
}

/// MySQL / MariaDB: error 1062 (`ER_DUP_ENTRY`), or SQLSTATE `23000` with a
/// "Duplicate entry" message. `23000` alone also covers foreign-key and
/// not-null violations, so the message is required in that case.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlClassifier;

impl ConflictClassifier for MySqlClassifier {
    fn is_unique_violation(&self, failure: &StorageFailure<'_>) -> bool {
        failure.code == Some("1062")
            || (failure.code == Some("23000") && failure.message.contains("Duplicate entry"))
    }
}

/// Any driver: the failure names the position constraint.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintNameClassifier;

impl ConflictClassifier for ConstraintNameClassifier {
    fn is_unique_violation(&self, failure: &StorageFailure<'_>) -> bool {
        failure.constraint == Some(POSITION_CONSTRAINT)
            || failure.message.contains(POSITION_CONSTRAINT)
    }
}

/// A driver-specific classifier with the constraint-name fallback.
pub struct DriverClassifier {
    driver: Driver,
    specific: Option<Box<dyn ConflictClassifier>>,
    fallback: ConstraintNameClassifier,
}

impl DriverClassifier {
    /// The driver this classifier was built for.
    pub fn driver(&self) -> Driver {
        self.driver
    }
}

impl std::fmt::Debug for DriverClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverClassifier")
            .field("driver", &self.driver)
            .finish()
    }
}

impl ConflictClassifier for DriverClassifier {
    fn is_unique_violation(&self, failure: &StorageFailure<'_>) -> bool {
        self.specific
            .as_ref()
            .is_some_and(|c| c.is_unique_violation(failure))
            || self.fallback.is_unique_violation(failure)
    }
}

/// Build the classifier for a driver.
pub fn classifier_for(driver: Driver) -> DriverClassifier {
    let specific: Option<Box<dyn ConflictClassifier>> = match driver {
        Driver::Sqlite => Some(Box::new(SqliteClassifier)),
        Driver::Postgres => Some(Box::new(PostgresClassifier)),
        Driver::MySql => Some(Box::new(MySqlClassifier)),
        Driver::Other => None,
    };
    DriverClassifier {
        driver,
        specific,
        fallback: ConstraintNameClassifier,
    }
}

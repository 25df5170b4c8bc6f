//!
//! Ordinal: persisted ordering of records within named groups.
//!
//! Records (cards in kanban columns, items in playlists, ...) carry a
//! fixed-scale decimal position. Clients reorder them concurrently without
//! locks; the only synchronization primitive is a uniqueness constraint on
//! `(group, position)` in the storage engine.
//!
//! ## Core Concepts
//!
//! * **Positions (`position::Position`)**: Fixed-scale decimals whose natural ordering is the display order.
//! * **Position algebra (`position::PositionAlgebra`)**: Pure arithmetic generating positions after, before and between neighbours, with jitter so concurrent splits do not collide.
//! * **Rebalancer (`rebalance::GapRebalancer`)**: Detects groups whose adjacent positions became too close to split and re-spaces them without changing order.
//! * **Move protocol (`mover::Mover`)**: Computes a candidate position for a record, persists it under the uniqueness constraint and retries on conflicts.
//! * **Backends (`backend::BackendImpl`)**: Pluggable storage, in memory or SQL via sqlx.
//! * **Board (`Board`)**: The facade tying all of the above together.

pub mod backend;
pub mod board;
pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod hooks;
pub mod mover;
pub mod position;
pub mod rebalance;
pub mod record;

pub use board::Board;
#[cfg(any(test, feature = "testing"))]
pub use clock::FixedClock;
pub use clock::{Clock, SystemClock};
pub use config::{Config, MoveConfig, PositionConfig};
pub use hooks::{BroadcastObserver, MoveEvent, MoveObserver};
pub use mover::{MoveOutcome, MoveRequest};
pub use position::{Position, PositionAlgebra};
pub use rebalance::{GapRebalancer, GapStatistics};
pub use record::{Record, RecordId};

/// Result type used throughout the Ordinal library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Ordinal library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured configuration errors from the config module
    #[error(transparent)]
    Config(config::ConfigError),

    /// Structured errors from the position algebra
    #[error(transparent)]
    Position(position::PositionError),

    /// Structured storage errors from the backend module
    #[error(transparent)]
    Backend(backend::BackendError),

    /// Structured errors from the move protocol
    #[error(transparent)]
    Move(mover::MoveError),

    /// Structured errors from the rebalancer
    #[error(transparent)]
    Rebalance(rebalance::RebalanceError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Serialize(_) => "serialize",
            Error::Config(_) => "config",
            Error::Position(_) => "position",
            Error::Backend(_) => "backend",
            Error::Move(_) => "mover",
            Error::Rebalance(_) => "rebalance",
        }
    }

    /// Check if this error indicates a record was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Backend(backend_err) => backend_err.is_not_found(),
            Error::Move(move_err) => move_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error is a `(group, position)` uniqueness conflict,
    /// either raw from storage or after retries were exhausted.
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Backend(backend_err) => backend_err.is_unique_violation(),
            Error::Move(move_err) => move_err.is_conflict(),
            Error::Rebalance(rebalance_err) => rebalance_err.is_conflict(),
            _ => false,
        }
    }

    /// Check if this error reports out-of-order bounds.
    pub fn is_invalid_bounds(&self) -> bool {
        match self {
            Error::Position(position_err) => position_err.is_invalid_bounds(),
            Error::Move(move_err) => move_err.is_invalid_bounds(),
            _ => false,
        }
    }

    /// Check if an interval ran out of representable positions.
    pub fn is_precision_exhausted(&self) -> bool {
        match self {
            Error::Position(position_err) => position_err.is_precision_exhausted(),
            Error::Move(move_err) => move_err.is_precision_exhausted(),
            _ => false,
        }
    }

    /// Check if a position could not be stored because of the backend's
    /// range or precision.
    pub fn is_position_out_of_range(&self) -> bool {
        match self {
            Error::Backend(backend_err) => backend_err.is_position_out_of_range(),
            _ => false,
        }
    }

    /// Check if this error is a storage failure unrelated to positioning
    /// (connectivity, I/O, corrupt data, ...).
    pub fn is_storage_error(&self) -> bool {
        match self {
            Error::Io(_) => true,
            Error::Backend(backend_err) => {
                !backend_err.is_not_found() && !backend_err.is_unique_violation()
            }
            _ => false,
        }
    }

    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        match self {
            Error::Io(_) => true,
            Error::Backend(backend_err) => backend_err.is_io_error(),
            _ => false,
        }
    }
}

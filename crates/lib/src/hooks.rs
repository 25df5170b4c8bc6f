//! Move-completed notifications.
//!
//! Observers are told about every successful move so that views can
//! refresh. Notification is a side effect: a failing observer is logged
//! and never turns a committed move into an error.

use std::sync::{Arc, RwLock};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::Result;
use crate::position::Position;
use crate::record::RecordId;

/// Context passed to observers after a move was committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveEvent {
    /// The record that moved
    pub record_id: RecordId,
    /// Group the record left
    pub from_group: String,
    /// Group the record now belongs to
    pub group: String,
    /// The committed position
    pub position: Position,
    /// Whether the target group was rebalanced as part of the move
    pub rebalanced: bool,
}

/// Trait for observers of completed moves.
pub trait MoveObserver: Send + Sync {
    /// Called after a move has been persisted.
    ///
    /// Errors are logged by the caller and otherwise ignored.
    fn on_move_completed(&self, event: &MoveEvent) -> Result<()>;
}

/// A set of observers notified together.
///
/// Registration takes `&self` so observers can be added to a shared board.
#[derive(Default)]
pub struct MoveHookCollection {
    hooks: RwLock<Vec<Arc<dyn MoveObserver>>>,
}

impl MoveHookCollection {
    /// Create a new empty hook collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer.
    pub fn add_hook(&self, hook: Arc<dyn MoveObserver>) {
        self.hooks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(hook);
    }

    /// Notify every observer in registration order.
    ///
    /// All observers run even if one fails. Failures are logged here;
    /// returns how many observers failed.
    pub fn execute_hooks(&self, event: &MoveEvent) -> usize {
        let hooks = self
            .hooks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        let mut failures = 0;
        for hook in &hooks {
            if let Err(e) = hook.on_move_completed(event) {
                tracing::error!(record_id = %event.record_id, error = %e, "Move observer failed");
                failures += 1;
            }
        }
        failures
    }

    /// Get the number of registered observers.
    pub fn len(&self) -> usize {
        self.hooks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Check if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for MoveHookCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MoveHookCollection")
            .field("len", &self.len())
            .finish()
    }
}

/// Observer publishing events on a tokio broadcast channel.
///
/// Events sent while nobody is subscribed are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastObserver {
    sender: broadcast::Sender<MoveEvent>,
}

impl BroadcastObserver {
    /// Create an observer buffering up to `capacity` events per receiver.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<MoveEvent> {
        self.sender.subscribe()
    }
}

impl MoveObserver for BroadcastObserver {
    fn on_move_completed(&self, event: &MoveEvent) -> Result<()> {
        // Err only means there are no receivers right now.
        let _ = self.sender.send(event.clone());
        Ok(())
    }
}

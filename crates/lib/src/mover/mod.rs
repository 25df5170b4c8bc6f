//! The optimistic-concurrency move protocol.
//!
//! A move resolves the record's new neighbours, asks the position algebra
//! for a candidate, and writes it under the storage uniqueness constraint
//! on `(group, position)`. There are no locks: when another writer claimed
//! the same position first, the write fails with a uniqueness violation and
//! the protocol re-resolves the neighbours, draws a fresh candidate and
//! tries again, up to `1 + max_retries` write attempts.
//!
//! Appending and prepending have no jitter, so every caller racing for the
//! same end of a group computes the same candidate. Once a write lost such
//! a race, the open side is closed against the records now adjacent in the
//! group (or one default gap away) and split with jitter instead.
//!
//! A group whose neighbours ran out of digits, or whose positions drifted
//! beyond what the backend stores, is rebalanced once and the candidate
//! recomputed.
//!
//! Creating records uses the same loop, so appends and bulk inserts are
//! just as safe under concurrent writers.

pub mod errors;

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info, warn};

pub use errors::MoveError;

use crate::Result;
use crate::backend::BackendImpl;
use crate::clock::Clock;
use crate::config::MoveConfig;
use crate::hooks::{MoveEvent, MoveHookCollection};
use crate::position::{Position, PositionAlgebra, PositionError};
use crate::rebalance::GapRebalancer;
use crate::record::{Record, RecordId};

/// A request to place a record between two neighbours.
///
/// `after` is the record that should end up directly before the moved one
/// (`None` for the top of the group); `before` the one directly after it
/// (`None` for the bottom).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRequest {
    /// The record to move
    pub record_id: RecordId,
    /// Group to move into; may be the record's current group
    pub target_group: String,
    /// Neighbour that precedes the drop point
    pub after: Option<RecordId>,
    /// Neighbour that follows the drop point
    pub before: Option<RecordId>,
}

impl MoveRequest {
    /// Move `record_id` into `target_group`, with no neighbours yet.
    pub fn new(record_id: impl Into<RecordId>, target_group: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            target_group: target_group.into(),
            after: None,
            before: None,
        }
    }

    /// Set the preceding neighbour.
    pub fn after(mut self, id: impl Into<RecordId>) -> Self {
        self.after = Some(id.into());
        self
    }

    /// Set the following neighbour.
    pub fn before(mut self, id: impl Into<RecordId>) -> Self {
        self.before = Some(id.into());
        self
    }
}

/// Result of a successful move.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MoveOutcome {
    /// The record that moved
    pub record_id: RecordId,
    /// Group the record was in before the move
    pub from_group: String,
    /// Group the record is in now
    pub group: String,
    /// Position of the record after the move, including any rebalance
    pub position: Position,
    /// Write attempts needed
    pub attempts: u32,
    /// Whether the target group was rebalanced during the move
    pub rebalanced: bool,
}

/// Executes moves and creations against a backend.
#[derive(Clone)]
pub struct Mover {
    backend: Arc<dyn BackendImpl>,
    algebra: PositionAlgebra,
    rebalancer: GapRebalancer,
    config: MoveConfig,
    hooks: Arc<MoveHookCollection>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Mover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mover")
            .field("algebra", &self.algebra)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Mover {
    /// Create a mover. `rebalancer` must operate on the same backend.
    pub fn new(
        backend: Arc<dyn BackendImpl>,
        rebalancer: GapRebalancer,
        config: MoveConfig,
        hooks: Arc<MoveHookCollection>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            algebra: rebalancer.algebra().clone(),
            backend,
            rebalancer,
            config,
            hooks,
            clock,
        }
    }

    /// Write attempts allowed per record.
    fn max_attempts(&self) -> u32 {
        self.config.max_retries.saturating_add(1)
    }

    /// Move a record between two neighbours, possibly into another group.
    ///
    /// Fails with [`MoveError::RecordNotFound`] if the record does not
    /// exist and with [`MoveError::PersistenceConflict`] once every write
    /// attempt lost a uniqueness race. Other storage errors are returned
    /// unchanged. On failure the record keeps its previous placement.
    pub async fn move_record(&self, request: &MoveRequest) -> Result<MoveOutcome> {
        let id = &request.record_id;
        let group = request.target_group.as_str();

        let record = self.backend.get(id).await.map_err(|e| {
            if e.is_not_found() {
                MoveError::RecordNotFound { id: id.clone() }.into()
            } else {
                e
            }
        })?;

        let max_attempts = self.max_attempts();
        let mut attempts = 0u32;
        let mut rebalanced = false;
        let mut contested = false;

        let committed = loop {
            let mut lower = self
                .resolve_neighbor(group, request.after.as_ref(), Some(id))
                .await?;
            let mut upper = self
                .resolve_neighbor(group, request.before.as_ref(), Some(id))
                .await?;
            if contested {
                (lower, upper) = self.close_open_sides(group, lower, upper, Some(id)).await?;
            }

            let candidate = match self.candidate(lower, upper, contested) {
                Ok(candidate) => candidate,
                Err(e) if heals_by_rebalancing(&e) && !rebalanced => {
                    warn!(record_id = %id, group, error = %e, "No room between neighbours, rebalancing before retry");
                    self.rebalancer.rebalance_column(group).await?;
                    rebalanced = true;
                    continue;
                }
                Err(e) => return Err(position_failure(e, group)),
            };

            attempts += 1;
            debug!(record_id = %id, group, %candidate, attempt = attempts, "Attempting move");

            match self
                .backend
                .update_placement(id, group, Some(candidate))
                .await
            {
                Ok(()) => break candidate,
                Err(e) if e.is_conflict() => {
                    if attempts >= max_attempts {
                        return Err(MoveError::PersistenceConflict {
                            id: id.clone(),
                            group: group.to_string(),
                            attempts,
                        }
                        .into());
                    }
                    warn!(record_id = %id, group, attempt = attempts, "Position conflict, retrying move");
                    contested = true;
                }
                Err(e) if e.is_position_out_of_range() && !rebalanced => {
                    warn!(record_id = %id, group, error = %e, "Position beyond storage range, rebalancing before retry");
                    self.rebalancer.rebalance_column(group).await?;
                    rebalanced = true;
                }
                Err(e) if e.is_not_found() => {
                    return Err(MoveError::RecordNotFound { id: id.clone() }.into());
                }
                Err(e) => return Err(e),
            }
        };

        let mut position = committed;
        if self.maintain(group).await {
            rebalanced = true;
            // The rebalance may have re-spaced the record itself.
            if let Ok(current) = self.backend.get(id).await
                && let Some(p) = current.position
            {
                position = p;
            }
        }

        let outcome = MoveOutcome {
            record_id: id.clone(),
            from_group: record.group,
            group: group.to_string(),
            position,
            attempts,
            rebalanced,
        };
        info!(
            record_id = %outcome.record_id,
            from = %outcome.from_group,
            to = %outcome.group,
            position = %outcome.position,
            attempts,
            "Move completed"
        );

        let failed = self.hooks.execute_hooks(&MoveEvent {
            record_id: outcome.record_id.clone(),
            from_group: outcome.from_group.clone(),
            group: outcome.group.clone(),
            position: outcome.position,
            rebalanced: outcome.rebalanced,
        });
        if failed > 0 {
            debug!(record_id = %outcome.record_id, failed, "Move observers failed");
        }

        Ok(outcome)
    }

    /// Append a new record at the end of `group`.
    pub async fn append(&self, group: &str, payload: serde_json::Value) -> Result<Record> {
        let record = self.new_record(group, payload);
        let id = record.id.clone();
        self.insert_records(group, None, None, vec![record]).await?;
        self.backend.get(&id).await
    }

    /// Create one record per payload between two neighbours, in order.
    ///
    /// With no neighbours the records are appended after the group's last
    /// position. Positions are planned in one batch; after a conflict the
    /// remaining records are re-planned from fresh neighbour state.
    pub async fn insert_between(
        &self,
        group: &str,
        after: Option<&RecordId>,
        before: Option<&RecordId>,
        payloads: Vec<serde_json::Value>,
    ) -> Result<Vec<Record>> {
        let records = payloads
            .into_iter()
            .map(|payload| self.new_record(group, payload))
            .collect();
        self.insert_records(group, after, before, records).await
    }

    fn new_record(&self, group: &str, payload: serde_json::Value) -> Record {
        Record {
            id: RecordId::generate(),
            group: group.to_string(),
            position: None,
            payload,
            created_at: self.clock.now_millis(),
        }
    }

    async fn insert_records(
        &self,
        group: &str,
        after: Option<&RecordId>,
        before: Option<&RecordId>,
        records: Vec<Record>,
    ) -> Result<Vec<Record>> {
        let mut pending: VecDeque<Record> = records.into();

        let max_attempts = self.max_attempts();
        let mut inserted = Vec::with_capacity(pending.len());
        let mut anchor = after.cloned();
        let mut attempts = 0u32;
        let mut rebalanced = false;
        let mut contested = false;

        'plan: while !pending.is_empty() {
            let mut lower = self.resolve_neighbor(group, anchor.as_ref(), None).await?;
            let mut upper = self.resolve_neighbor(group, before, None).await?;
            if contested {
                (lower, upper) = self.close_open_sides(group, lower, upper, None).await?;
            } else if lower.is_none() && upper.is_none() {
                lower = self.backend.last_position(group).await?;
            }

            let plan = match self.plan(lower, upper, pending.len(), contested) {
                Ok(plan) => plan,
                Err(e) if heals_by_rebalancing(&e) && !rebalanced => {
                    warn!(group, error = %e, "No room for insert, rebalancing");
                    self.rebalancer.rebalance_column(group).await?;
                    rebalanced = true;
                    continue;
                }
                Err(e) => return Err(position_failure(e, group)),
            };

            for position in plan {
                let Some(mut record) = pending.pop_front() else {
                    break;
                };
                record.position = Some(position);
                attempts += 1;

                match self.backend.insert(record.clone()).await {
                    Ok(()) => {
                        debug!(record_id = %record.id, group, %position, "Inserted record");
                        anchor = Some(record.id.clone());
                        attempts = 0;
                        inserted.push(record);
                    }
                    Err(e) if e.is_conflict() => {
                        if attempts >= max_attempts {
                            return Err(MoveError::PersistenceConflict {
                                id: record.id,
                                group: group.to_string(),
                                attempts,
                            }
                            .into());
                        }
                        warn!(record_id = %record.id, group, attempt = attempts, "Position conflict, re-planning insert");
                        contested = true;
                        record.position = None;
                        pending.push_front(record);
                        continue 'plan;
                    }
                    Err(e) if e.is_position_out_of_range() && !rebalanced => {
                        warn!(record_id = %record.id, group, error = %e, "Position beyond storage range, rebalancing");
                        self.rebalancer.rebalance_column(group).await?;
                        rebalanced = true;
                        record.position = None;
                        pending.push_front(record);
                        continue 'plan;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        if !inserted.is_empty() && self.maintain(group).await {
            // Report the positions the records hold after the rebalance.
            for record in &mut inserted {
                if let Ok(current) = self.backend.get(&record.id).await {
                    record.position = current.position;
                }
            }
        }

        Ok(inserted)
    }

    /// Position for one record between the resolved bounds.
    ///
    /// Uncontested, this is [`PositionAlgebra::calculate`]. After a lost
    /// race an open side is capped one default gap away and the interval
    /// split with jitter.
    fn candidate(
        &self,
        lower: Option<Position>,
        upper: Option<Position>,
        contested: bool,
    ) -> std::result::Result<Position, PositionError> {
        match (lower, upper) {
            (Some(lower), None) if contested => {
                self.algebra.between(lower, self.algebra.after(lower)?)
            }
            (None, Some(upper)) if contested => {
                self.algebra.between(self.algebra.before(upper)?, upper)
            }
            (lower, upper) => self.algebra.calculate(lower, upper),
        }
    }

    /// Ascending positions for `n` records between the resolved bounds.
    fn plan(
        &self,
        lower: Option<Position>,
        upper: Option<Position>,
        n: usize,
        contested: bool,
    ) -> std::result::Result<Vec<Position>, PositionError> {
        match (lower, upper) {
            (None, None) => self.algebra.generate_sequence(n),
            (Some(lower), Some(upper)) => self.algebra.generate_between(lower, upper, n),
            (Some(lower), None) if contested => {
                let ceiling = self.stride(lower, n, Direction::Up)?;
                self.algebra.generate_between(lower, ceiling, n)
            }
            (None, Some(upper)) if contested => {
                let floor = self.stride(upper, n, Direction::Down)?;
                self.algebra.generate_between(floor, upper, n)
            }
            (Some(lower), None) => {
                let mut plan = Vec::with_capacity(n);
                let mut last = lower;
                for _ in 0..n {
                    last = self.algebra.after(last)?;
                    plan.push(last);
                }
                Ok(plan)
            }
            (None, Some(upper)) => {
                let mut plan = Vec::with_capacity(n);
                let mut first = upper;
                for _ in 0..n {
                    first = self.algebra.before(first)?;
                    plan.push(first);
                }
                plan.reverse();
                Ok(plan)
            }
        }
    }

    /// `from` moved `n` default gaps in `direction`.
    fn stride(
        &self,
        from: Position,
        n: usize,
        direction: Direction,
    ) -> std::result::Result<Position, PositionError> {
        let mut at = from;
        for _ in 0..n.max(1) {
            at = match direction {
                Direction::Up => self.algebra.after(at)?,
                Direction::Down => self.algebra.before(at)?,
            };
        }
        Ok(at)
    }

    /// Bound every open side of `(lower, upper)` by the record actually
    /// adjacent in `group`.
    ///
    /// With no bounds at all the group's last position becomes the lower
    /// one. Sides with no record beyond them stay open. `moving` is left
    /// out of the group.
    async fn close_open_sides(
        &self,
        group: &str,
        lower: Option<Position>,
        upper: Option<Position>,
        moving: Option<&RecordId>,
    ) -> Result<(Option<Position>, Option<Position>)> {
        if lower.is_some() && upper.is_some() {
            return Ok((lower, upper));
        }
        let taken: Vec<Position> = self
            .backend
            .list_group(group)
            .await?
            .into_iter()
            .filter(|r| Some(&r.id) != moving)
            .filter_map(|r| r.position)
            .collect();

        let lower = match (lower, upper) {
            (None, None) => taken.last().copied(),
            _ => lower,
        };
        Ok(match (lower, upper) {
            (Some(lower), None) => (Some(lower), taken.iter().copied().find(|p| *p > lower)),
            (None, Some(upper)) => (taken.iter().rev().copied().find(|p| *p < upper), Some(upper)),
            bounds => bounds,
        })
    }

    /// Current position of a neighbour in `group`.
    ///
    /// Missing neighbours, neighbours in another group, unpositioned ones
    /// and the moving record itself count as absent.
    async fn resolve_neighbor(
        &self,
        group: &str,
        neighbor: Option<&RecordId>,
        moving: Option<&RecordId>,
    ) -> Result<Option<Position>> {
        let Some(neighbor) = neighbor else {
            return Ok(None);
        };
        if moving == Some(neighbor) {
            debug!(record_id = %neighbor, "Ignoring the moving record as its own neighbour");
            return Ok(None);
        }
        match self.backend.get(neighbor).await {
            Ok(record) if record.group == group => Ok(record.position),
            Ok(record) => {
                debug!(neighbor = %neighbor, group, actual = %record.group, "Neighbour left the group");
                Ok(None)
            }
            Err(e) if e.is_not_found() => {
                debug!(neighbor = %neighbor, group, "Neighbour vanished");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Rebalance `group` if it needs it. Returns whether it was rebalanced.
    ///
    /// Failures are logged and never reported to the caller.
    async fn maintain(&self, group: &str) -> bool {
        if !self.config.rebalance_on_move {
            return false;
        }
        match self.rebalancer.needs_rebalancing(group).await {
            Ok(false) => false,
            Ok(true) => match self.rebalancer.rebalance_column(group).await {
                Ok(_) => true,
                Err(e) => {
                    warn!(group, error = %e, "Post-move rebalance failed");
                    false
                }
            },
            Err(e) => {
                warn!(group, error = %e, "Post-move gap check failed");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Up,
    Down,
}

/// Position failures a fresh layout of the group can cure.
fn heals_by_rebalancing(err: &PositionError) -> bool {
    err.is_precision_exhausted() || err.is_overflow()
}

fn position_failure(err: PositionError, group: &str) -> crate::Error {
    match MoveError::from_position(&err, group) {
        Some(move_err) => move_err.into(),
        None => err.into(),
    }
}

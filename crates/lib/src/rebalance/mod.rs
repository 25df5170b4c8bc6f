//! Gap maintenance for groups.
//!
//! Repeated splits at the same point halve the local gap every time, so
//! after a few dozen insertions two neighbours end up closer than
//! `min_gap`. The [`GapRebalancer`] finds such groups and rewrites them
//! with the fresh layout `default_gap, 2 * default_gap, ...` in their
//! current display order. Order is never changed, only spacing.

pub mod errors;

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

pub use errors::RebalanceError;

use crate::Result;
use crate::backend::BackendImpl;
use crate::position::{Position, PositionAlgebra};
use crate::record::RecordId;

/// Summary of the adjacent gaps in a group.
///
/// Gap fields are `None` when the group has fewer than two positioned
/// records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GapStatistics {
    /// Number of positioned records.
    pub count: usize,
    /// Smallest adjacent gap.
    pub min_gap: Option<Decimal>,
    /// Largest adjacent gap.
    pub max_gap: Option<Decimal>,
    /// Mean adjacent gap.
    pub avg_gap: Option<Decimal>,
    /// Number of adjacent gaps below the minimum gap.
    pub small_gaps: usize,
}

impl GapStatistics {
    /// Compute statistics over ascending `positions`.
    pub fn from_positions(algebra: &PositionAlgebra, positions: &[Position]) -> Self {
        let gaps: Vec<Decimal> = adjacent_gaps(algebra, positions).collect();
        let small_gaps = positions
            .windows(2)
            .filter(|w| algebra.needs_rebalancing(w[0], w[1]))
            .count();
        let avg_gap = if gaps.is_empty() {
            None
        } else {
            let sum = gaps.iter().try_fold(Decimal::ZERO, |acc, g| acc.checked_add(*g));
            sum.and_then(|s| s.checked_div(Decimal::from(gaps.len())))
        };
        Self {
            count: positions.len(),
            min_gap: gaps.iter().min().copied(),
            max_gap: gaps.iter().max().copied(),
            avg_gap,
            small_gaps,
        }
    }
}

fn adjacent_gaps<'a>(
    algebra: &'a PositionAlgebra,
    positions: &'a [Position],
) -> impl Iterator<Item = Decimal> + 'a {
    positions
        .windows(2)
        .map(|w| algebra.gap(w[0], w[1]).value())
}

/// Detects and repairs groups whose gaps became too small to split.
///
/// Holds no state beyond its configuration; every call reads the group
/// afresh from the backend.
#[derive(Clone)]
pub struct GapRebalancer {
    backend: Arc<dyn BackendImpl>,
    algebra: PositionAlgebra,
    max_retries: u32,
}

impl std::fmt::Debug for GapRebalancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GapRebalancer")
            .field("algebra", &self.algebra)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl GapRebalancer {
    /// Create a rebalancer over `backend`.
    ///
    /// A rewrite that hits a uniqueness conflict is re-read and retried up
    /// to `max_retries` times.
    pub fn new(backend: Arc<dyn BackendImpl>, algebra: PositionAlgebra, max_retries: u32) -> Self {
        Self {
            backend,
            algebra,
            max_retries,
        }
    }

    /// The algebra used to lay out groups.
    pub fn algebra(&self) -> &PositionAlgebra {
        &self.algebra
    }

    /// True if the group should be re-spaced.
    ///
    /// That is the case when any adjacent pair is closer than the minimum
    /// gap, or when the outermost position uses more than half of the
    /// magnitude the backend can store and a fresh layout would be smaller.
    ///
    /// Records without a position always flag their group, even a group
    /// holding just one record: rebalancing is how imported records get a
    /// position.
    pub async fn needs_rebalancing(&self, group: &str) -> Result<bool> {
        let records = self.backend.list_group(group).await?;
        if records.iter().any(|r| r.position.is_none()) {
            return Ok(true);
        }
        let positions: Vec<Position> = records.iter().filter_map(|r| r.position).collect();
        if positions
            .windows(2)
            .any(|w| self.algebra.needs_rebalancing(w[0], w[1]))
        {
            return Ok(true);
        }
        Ok(self.near_storage_limit(&positions))
    }

    /// Whether ascending `positions` drifted towards the edge of the
    /// backend's storable range.
    fn near_storage_limit(&self, positions: &[Position]) -> bool {
        let Some(limit) = self.backend.limits().max_magnitude else {
            return false;
        };
        let (Some(first), Some(last)) = (positions.first(), positions.last()) else {
            return false;
        };
        let extent = first.value().abs().max(last.value().abs());
        let fresh = Decimal::from(positions.len() as u64)
            .checked_mul(self.algebra.config().default_gap);
        extent > limit / Decimal::from(2) && fresh.is_some_and(|fresh| fresh < extent)
    }

    /// Rewrite the group as `default_gap, 2 * default_gap, ...` in its
    /// current display order. Returns the number of records rewritten.
    ///
    /// Unpositioned records keep their place at the end of the order and
    /// receive positions too.
    pub async fn rebalance_column(&self, group: &str) -> Result<usize> {
        let attempts = self.max_retries.saturating_add(1);
        for attempt in 1..=attempts {
            let records = self.backend.list_group(group).await?;
            if records.is_empty() {
                return Ok(0);
            }

            let layout = self.algebra.generate_sequence(records.len())?;
            let updates: Vec<(RecordId, Position)> = records
                .into_iter()
                .map(|r| r.id)
                .zip(layout)
                .collect();

            match self.backend.rewrite_positions(group, &updates).await {
                Ok(rewritten) => {
                    info!(group, rewritten, attempt, "Rebalanced group");
                    return Ok(rewritten);
                }
                Err(e) if e.is_conflict() => {
                    warn!(group, attempt, error = %e, "Rebalance conflicted, re-reading group");
                }
                Err(e) => return Err(e),
            }
        }

        Err(RebalanceError::PersistenceConflict {
            group: group.to_string(),
            attempts,
        }
        .into())
    }

    /// Groups present in storage that need rebalancing, sorted.
    pub async fn find_groups_needing_rebalancing(&self) -> Result<Vec<String>> {
        let mut flagged = Vec::new();
        for group in self.backend.groups().await? {
            if self.needs_rebalancing(&group).await? {
                flagged.push(group);
            }
        }
        debug!(count = flagged.len(), "Scanned groups for rebalancing");
        Ok(flagged)
    }

    /// Rebalance every flagged group.
    ///
    /// Returns the number of records rewritten per group.
    pub async fn rebalance_all(&self) -> Result<BTreeMap<String, usize>> {
        let mut rewritten = BTreeMap::new();
        for group in self.find_groups_needing_rebalancing().await? {
            let count = self.rebalance_column(&group).await?;
            rewritten.insert(group, count);
        }
        Ok(rewritten)
    }

    /// Gap statistics over the positioned records of `group`.
    pub async fn gap_statistics(&self, group: &str) -> Result<GapStatistics> {
        let positions = self.backend.group_positions(group).await?;
        Ok(GapStatistics::from_positions(&self.algebra, &positions))
    }
}

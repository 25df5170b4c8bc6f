//! Read-only health reports for operational tooling.
//!
//! Nothing here is needed for correctness; the report only describes what
//! is stored: positions per group and anything that would block or
//! degrade future splits.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::position::{Position, PositionAlgebra};
use crate::rebalance::GapStatistics;
use crate::record::{Record, RecordId, sort_for_display};

/// A problem found in a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    /// A record without a position, e.g. from an import.
    Unpositioned {
        /// The record
        id: RecordId,
    },
    /// Several records share one position.
    DuplicatePosition {
        /// The shared position
        position: Position,
        /// Records holding it, in display order
        ids: Vec<RecordId>,
    },
    /// Adjacent records closer than the minimum gap.
    NarrowGap {
        /// The earlier record
        lower: RecordId,
        /// The later record
        upper: RecordId,
        /// Distance between them
        gap: Decimal,
    },
}

/// One record as it appears in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionRow {
    /// Record id
    pub id: RecordId,
    /// Stored position, if any
    pub position: Option<Position>,
}

/// Report for a single group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupDiagnostics {
    /// Group key
    pub group: String,
    /// Records in display order
    pub rows: Vec<PositionRow>,
    /// Adjacent gap summary
    pub stats: GapStatistics,
    /// Problems found
    pub anomalies: Vec<Anomaly>,
}

impl GroupDiagnostics {
    /// True when no anomaly was found.
    pub fn is_healthy(&self) -> bool {
        self.anomalies.is_empty()
    }
}

/// Report over one or more groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticReport {
    /// RFC3339 time the report was produced
    pub generated_at: String,
    /// Per-group reports, sorted by group key
    pub groups: Vec<GroupDiagnostics>,
}

impl DiagnosticReport {
    /// True when every group is healthy.
    pub fn is_healthy(&self) -> bool {
        self.groups.iter().all(GroupDiagnostics::is_healthy)
    }

    /// Total anomalies across all groups.
    pub fn anomaly_count(&self) -> usize {
        self.groups.iter().map(|g| g.anomalies.len()).sum()
    }
}

/// Inspect the records of one group.
///
/// `records` may be in any order and should all belong to `group`.
pub fn diagnose_group(algebra: &PositionAlgebra, group: &str, records: &[Record]) -> GroupDiagnostics {
    let mut records = records.to_vec();
    sort_for_display(&mut records);

    let mut anomalies = Vec::new();
    let positioned: Vec<(&RecordId, Position)> = records
        .iter()
        .filter_map(|r| r.position.map(|p| (&r.id, p)))
        .collect();

    // Records sharing a position are adjacent in display order.
    for run in positioned.chunk_by(|a, b| a.1 == b.1) {
        if run.len() > 1 {
            anomalies.push(Anomaly::DuplicatePosition {
                position: run[0].1,
                ids: run.iter().map(|(id, _)| (*id).clone()).collect(),
            });
        }
    }

    for pair in positioned.windows(2) {
        let (lower, upper) = (pair[0], pair[1]);
        if lower.1 != upper.1 && algebra.needs_rebalancing(lower.1, upper.1) {
            anomalies.push(Anomaly::NarrowGap {
                lower: lower.0.clone(),
                upper: upper.0.clone(),
                gap: algebra.gap(lower.1, upper.1).value(),
            });
        }
    }

    anomalies.extend(
        records
            .iter()
            .filter(|r| r.position.is_none())
            .map(|r| Anomaly::Unpositioned { id: r.id.clone() }),
    );

    let positions: Vec<Position> = positioned.iter().map(|(_, p)| *p).collect();
    GroupDiagnostics {
        group: group.to_string(),
        rows: records
            .iter()
            .map(|r| PositionRow {
                id: r.id.clone(),
                position: r.position,
            })
            .collect(),
        stats: GapStatistics::from_positions(algebra, &positions),
        anomalies,
    }
}

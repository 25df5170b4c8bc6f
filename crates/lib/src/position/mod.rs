//! Decimal positions and the arithmetic that generates them.
//!
//! A [`Position`] is a fixed-point decimal. Within one group every record
//! holds a distinct position and the group is displayed in ascending
//! position order. Positions carry no meaning across groups and are
//! recomputed from neighbour state on every write, never reused.
//!
//! All arithmetic is exact decimal arithmetic (via `rust_decimal`); binary
//! floating point would accumulate rounding error under repeated bisection
//! and eventually produce two positions that compare equal.

mod algebra;
mod errors;

pub use algebra::PositionAlgebra;
pub use errors::PositionError;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An ordinal position within a group.
///
/// Serialized as a decimal string, e.g. `"65535.0000000000"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position(Decimal);

impl Position {
    /// Wrap a decimal without normalizing it.
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// The underlying decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Value expressed as an integer count of `10^-scale` units.
    ///
    /// Returns `None` when the value has more fractional digits than `scale`
    /// or the scaled value does not fit.
    pub fn to_units(&self, scale: u32) -> Option<i128> {
        let mut scaled = self.0;
        scaled.rescale(scale);
        if scaled.scale() != scale || scaled != self.0 {
            return None;
        }
        Some(scaled.mantissa())
    }

    /// Inverse of [`Position::to_units`].
    pub fn from_units(units: i128, scale: u32) -> Option<Self> {
        Decimal::try_from_i128_with_scale(units, scale)
            .ok()
            .map(Self)
    }

    /// Three-way comparison by numeric value.
    pub fn compare(&self, other: &Position) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Position {
    type Err = PositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim())
            .map(Self)
            .map_err(|e| PositionError::Parse {
                input: s.to_string(),
                reason: e.to_string(),
            })
    }
}

impl From<Decimal> for Position {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<Position> for Decimal {
    fn from(position: Position) -> Self {
        position.0
    }
}

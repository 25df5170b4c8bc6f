//! Pure arithmetic over positions.
//!
//! Every result is normalized to the configured scale. Internally the
//! algebra works on integer "units" of `10^-scale`, which makes the strict
//! bounds checks exact: a split between `lower` and `upper` is only possible
//! while at least one unit lies strictly inside the interval.

use std::cmp::Ordering;

use rand::Rng;
use rust_decimal::{Decimal, RoundingStrategy};

use super::{Position, PositionError};
use crate::config::PositionConfig;

/// Stateless position generator parameterized by a [`PositionConfig`].
#[derive(Debug, Clone, Default)]
pub struct PositionAlgebra {
    config: PositionConfig,
}

impl PositionAlgebra {
    /// Create an algebra using the given constants.
    ///
    /// The configuration is expected to have passed
    /// [`PositionConfig::validate`].
    pub fn new(config: PositionConfig) -> Self {
        Self { config }
    }

    /// The constants in use.
    pub fn config(&self) -> &PositionConfig {
        &self.config
    }

    /// Step used for appends, prepends and fresh layouts.
    pub fn default_gap(&self) -> Position {
        self.normalize(self.config.default_gap)
    }

    /// Gaps below this value need rebalancing.
    pub fn min_gap(&self) -> Position {
        self.normalize(self.config.min_gap)
    }

    /// Canonicalize any decimal-convertible value to the configured scale.
    ///
    /// Excess fractional digits are rounded toward negative infinity.
    pub fn normalize(&self, value: impl Into<Decimal>) -> Position {
        let scale = self.config.scale;
        let mut value = value
            .into()
            .round_dp_with_strategy(scale, RoundingStrategy::ToNegativeInfinity);
        value.rescale(scale);
        Position::new(value)
    }

    /// Parse decimal text and normalize it.
    pub fn parse(&self, input: &str) -> Result<Position, PositionError> {
        let position: Position = input.parse()?;
        Ok(self.normalize(position))
    }

    /// Position of the first record in an empty group.
    pub fn for_empty_group(&self) -> Position {
        self.default_gap()
    }

    /// Position one default gap after `pos`.
    pub fn after(&self, pos: Position) -> Result<Position, PositionError> {
        pos.value()
            .checked_add(self.config.default_gap)
            .map(|v| self.normalize(v))
            .ok_or(PositionError::Overflow { operation: "after" })
    }

    /// Position one default gap before `pos`. May be negative.
    pub fn before(&self, pos: Position) -> Result<Position, PositionError> {
        pos.value()
            .checked_sub(self.config.default_gap)
            .map(|v| self.normalize(v))
            .ok_or(PositionError::Overflow {
                operation: "before",
            })
    }

    /// The exact midpoint of `(lower, upper)`, deterministic.
    ///
    /// Fails with [`PositionError::InvalidBounds`] unless `lower < upper`,
    /// and with [`PositionError::PrecisionExhausted`] when the midpoint is
    /// not representable strictly inside the interval at the configured
    /// scale.
    pub fn between_exact(
        &self,
        lower: Position,
        upper: Position,
    ) -> Result<Position, PositionError> {
        let (lo, hi) = self.strict_units(lower, upper)?;
        self.position_at(lo + (hi - lo) / 2)
    }

    /// Production split operator: a jittered midpoint of `(lower, upper)`.
    ///
    /// See [`PositionAlgebra::between_with_rng`].
    pub fn between(&self, lower: Position, upper: Position) -> Result<Position, PositionError> {
        self.between_with_rng(lower, upper, &mut rand::thread_rng())
    }

    /// Split `(lower, upper)` at a random point of its central half.
    ///
    /// The displacement from the exact midpoint is at most a quarter of the
    /// gap, so the result is always strictly inside the bounds and keeps at
    /// least a quarter of the gap on either side for later splits.
    /// Concurrent callers splitting the same pair draw independently and
    /// almost never collide.
    ///
    /// Equal bounds are not an error: the result is `after(lower)`. Bounds
    /// with `lower > upper` fail with [`PositionError::InvalidBounds`].
    pub fn between_with_rng<R: Rng>(
        &self,
        lower: Position,
        upper: Position,
        rng: &mut R,
    ) -> Result<Position, PositionError> {
        let lower = self.normalize(lower);
        let upper = self.normalize(upper);
        match lower.compare(&upper) {
            Ordering::Greater => return Err(PositionError::InvalidBounds { lower, upper }),
            Ordering::Equal => return self.after(lower),
            Ordering::Less => {}
        }

        let (lo, hi) = self.strict_units(lower, upper)?;
        let margin = ((hi - lo) / 4).max(1);
        let units = rng.gen_range((lo + margin)..=(hi - margin));
        self.position_at(units)
    }

    /// Dispatch on which neighbours exist.
    ///
    /// | lower | upper | result |
    /// |-------|-------|--------|
    /// | none  | none  | [`for_empty_group`](Self::for_empty_group) |
    /// | some  | none  | [`after`](Self::after) |
    /// | none  | some  | [`before`](Self::before) |
    /// | some  | some  | [`between`](Self::between) |
    pub fn calculate(
        &self,
        lower: Option<Position>,
        upper: Option<Position>,
    ) -> Result<Position, PositionError> {
        match (lower, upper) {
            (None, None) => Ok(self.for_empty_group()),
            (Some(lower), None) => self.after(lower),
            (None, Some(upper)) => self.before(upper),
            (Some(lower), Some(upper)) => self.between(lower, upper),
        }
    }

    /// True iff `upper - lower` is strictly smaller than the minimum gap.
    pub fn needs_rebalancing(&self, lower: Position, upper: Position) -> bool {
        upper.value() - lower.value() < self.config.min_gap
    }

    /// The canonical layout of a fresh group:
    /// `default_gap, 2 * default_gap, ..., n * default_gap`.
    pub fn generate_sequence(&self, n: usize) -> Result<Vec<Position>, PositionError> {
        (1..=n)
            .map(|i| {
                Decimal::from(i as u64)
                    .checked_mul(self.config.default_gap)
                    .map(|v| self.normalize(v))
                    .ok_or(PositionError::Overflow {
                        operation: "generate_sequence",
                    })
            })
            .collect()
    }

    /// `n` distinct ascending positions strictly inside `(lower, upper)`.
    ///
    /// See [`PositionAlgebra::generate_between_with_rng`].
    pub fn generate_between(
        &self,
        lower: Position,
        upper: Position,
        n: usize,
    ) -> Result<Vec<Position>, PositionError> {
        self.generate_between_with_rng(lower, upper, n, &mut rand::thread_rng())
    }

    /// `n` distinct ascending positions strictly inside `(lower, upper)`,
    /// evenly spaced with a small per-slot jitter.
    ///
    /// The interval is cut into `n + 1` equal steps; each position sits on a
    /// step boundary displaced by less than a quarter step, so order between
    /// the generated positions is preserved.
    pub fn generate_between_with_rng<R: Rng>(
        &self,
        lower: Position,
        upper: Position,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<Position>, PositionError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let (lo, hi) = self.strict_units(lower, upper)?;
        let step = (hi - lo) / (n as i128 + 1);
        if step < 1 {
            return Err(PositionError::PrecisionExhausted {
                lower: self.normalize(lower),
                upper: self.normalize(upper),
            });
        }

        let jitter = (step - 1) / 4;
        (1..=n as i128)
            .map(|i| {
                let offset = if jitter > 0 {
                    rng.gen_range(-jitter..=jitter)
                } else {
                    0
                };
                self.position_at(lo + step * i + offset)
            })
            .collect()
    }

    /// Three-way numeric comparison.
    pub fn compare(&self, a: Position, b: Position) -> Ordering {
        a.compare(&b)
    }

    /// `a < b` numerically.
    pub fn less_than(&self, a: Position, b: Position) -> bool {
        a.compare(&b) == Ordering::Less
    }

    /// `a > b` numerically.
    pub fn greater_than(&self, a: Position, b: Position) -> bool {
        a.compare(&b) == Ordering::Greater
    }

    /// `upper - lower`, normalized.
    pub fn gap(&self, lower: Position, upper: Position) -> Position {
        self.normalize(upper.value() - lower.value())
    }

    /// Unit representation of a pair that admits a strict split.
    fn strict_units(&self, lower: Position, upper: Position) -> Result<(i128, i128), PositionError> {
        let lower = self.normalize(lower);
        let upper = self.normalize(upper);
        if lower >= upper {
            return Err(PositionError::InvalidBounds { lower, upper });
        }
        let (lo, hi) = match (self.units_of(lower), self.units_of(upper)) {
            (Some(lo), Some(hi)) => (lo, hi),
            _ => {
                return Err(PositionError::Overflow {
                    operation: "split",
                });
            }
        };
        if hi - lo < 2 {
            return Err(PositionError::PrecisionExhausted { lower, upper });
        }
        Ok((lo, hi))
    }

    fn units_of(&self, pos: Position) -> Option<i128> {
        pos.to_units(self.config.scale)
    }

    fn position_at(&self, units: i128) -> Result<Position, PositionError> {
        Position::from_units(units, self.config.scale).ok_or(PositionError::Overflow {
            operation: "from_units",
        })
    }
}

//! Tuning for position generation and the move protocol.
//!
//! Nothing here is process-wide state: a [`Config`] is handed to
//! [`Board`](crate::Board) at open time and threaded into the
//! [`PositionAlgebra`](crate::position::PositionAlgebra),
//! [`GapRebalancer`](crate::rebalance::GapRebalancer) and
//! [`Mover`](crate::mover::Mover) it builds. Two boards over the same storage
//! may use different tunings.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest supported number of fractional digits.
///
/// Backends may store fewer; [`Board`](crate::Board) checks the scale
/// against [`StorageLimits`](crate::backend::StorageLimits) when opening.
pub const MAX_SCALE: u32 = 18;

/// Errors produced while validating a configuration.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A gap setting is zero, negative, or inconsistent with the other gap.
    #[error("Invalid gap configuration: {reason}")]
    InvalidGap {
        /// Description of the problem
        reason: String,
    },

    /// The configured scale is out of range.
    #[error("Invalid scale {scale}: must be between 1 and {MAX_SCALE}")]
    InvalidScale {
        /// The rejected scale
        scale: u32,
    },

    /// The storage backend keeps fewer fractional digits than configured.
    #[error("Scale {scale} exceeds the {supported} fractional digits the backend can store")]
    UnsupportedScale {
        /// The configured scale
        scale: u32,
        /// Digits the backend supports
        supported: u32,
    },

    /// The configuration document could not be parsed.
    #[error("Failed to parse configuration")]
    Parse {
        /// The underlying JSON error
        #[source]
        source: serde_json::Error,
    },
}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Config(err)
    }
}

/// Spacing constants used by the position algebra.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    /// Distance between consecutive positions in a fresh layout, and the
    /// step used when appending or prepending.
    pub default_gap: Decimal,
    /// Adjacent positions closer than this are considered too tight to split.
    pub min_gap: Decimal,
    /// Number of fractional digits every position is normalized to.
    pub scale: u32,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            default_gap: Decimal::from(65535),
            min_gap: Decimal::new(1, 4),
            scale: 10,
        }
    }
}

impl PositionConfig {
    /// Check that the constants describe a usable layout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scale == 0 || self.scale > MAX_SCALE {
            return Err(ConfigError::InvalidScale { scale: self.scale });
        }
        if self.default_gap <= Decimal::ZERO {
            return Err(ConfigError::InvalidGap {
                reason: format!("default_gap must be positive, got {}", self.default_gap),
            });
        }
        if self.min_gap <= Decimal::ZERO {
            return Err(ConfigError::InvalidGap {
                reason: format!("min_gap must be positive, got {}", self.min_gap),
            });
        }
        if self.min_gap >= self.default_gap {
            return Err(ConfigError::InvalidGap {
                reason: format!(
                    "min_gap ({}) must be smaller than default_gap ({})",
                    self.min_gap, self.default_gap
                ),
            });
        }
        if self.min_gap.normalize().scale() > self.scale
            || self.default_gap.normalize().scale() > self.scale
        {
            return Err(ConfigError::InvalidGap {
                reason: format!("gaps must be representable with {} fractional digits", self.scale),
            });
        }
        Ok(())
    }
}

/// Retry and maintenance behaviour of the move protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoveConfig {
    /// How many times a write is retried after a uniqueness conflict.
    /// A move makes at most `1 + max_retries` write attempts.
    pub max_retries: u32,
    /// Check the target group after every successful move and rebalance
    /// it when adjacent positions became too close.
    pub rebalance_on_move: bool,
}

impl Default for MoveConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            rebalance_on_move: true,
        }
    }
}

/// Complete configuration for a [`Board`](crate::Board).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Position spacing constants.
    pub position: PositionConfig,
    /// Move protocol behaviour.
    pub moves: MoveConfig,
}

impl Config {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_json::from_str(json).map_err(|source| ConfigError::Parse { source })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.position.validate()
    }
}

//! Fixed-point math utilities for deterministic simulation.
//!
//! Enemy path progress, movement speed and tower range all use fixed-point
//! arithmetic so that two runs of the same command stream produce
//! bit-identical state on any CPU.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
pub type Fixed = I32F32;

/// Fixed-point 2D vector, measured in grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Serde support for fixed-point values written as decimal milli-units.
///
/// Used by human-edited RON data: `speed: 250` means 0.250 cells per tick.
/// Raw bit patterns are unreadable in config files.
pub mod milli_serde {
    use super::Fixed;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize as thousandths, rounded to nearest.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let milli: i64 = value
            .saturating_mul(Fixed::from_num(1000))
            .saturating_round()
            .to_num();
        milli.serialize(serializer)
    }

    /// Deserialize from thousandths.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let milli = i64::deserialize(deserializer)?;
        super::checked_from_milli(milli)
            .ok_or_else(|| D::Error::custom(format!("{milli} thousandths is out of range")))
    }
}

/// Build a fixed-point value from thousandths, `None` when `milli` does not
/// fit the integer part.
#[must_use]
pub fn checked_from_milli(milli: i64) -> Option<Fixed> {
    Fixed::checked_from_num(milli).map(|value| value / Fixed::from_num(1000))
}

/// Build a fixed-point value from thousandths (`from_milli(1500)` is 1.5).
///
/// Saturates when `milli` is out of range.
#[must_use]
pub fn from_milli(milli: i64) -> Fixed {
    Fixed::saturating_from_num(milli) / Fixed::from_num(1000)
}

/// Scale a value by an integer percentage, e.g. `percent_of(x, 40)` is 40% of `x`.
#[must_use]
pub fn percent_of(value: Fixed, percent: u32) -> Fixed {
    value.saturating_mul(Fixed::saturating_from_num(percent)) / Fixed::from_num(100)
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Calculate squared distance (avoids sqrt for range comparisons).
    ///
    /// Saturates at [`Fixed::MAX`] for points too far apart to square.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x.saturating_sub(other.x);
        let dy = self.y.saturating_sub(other.y);
        dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy))
    }

    /// Linearly interpolate between two vectors.
    #[must_use]
    pub fn lerp(self, other: Self, t: Fixed) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

//! Error types for the game simulation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entities::{AssetId, EntityId, GridPos};

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Why a cell cannot take a tower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlacementError {
    /// Outside the map.
    OutOfBounds,
    /// Another tower already stands there.
    Occupied,
    /// The cell is part of the enemy path.
    OnPath,
    /// Impassable, unbuildable terrain.
    Blocked,
    /// The asset is already bound to a live tower.
    AssetInUse,
}

impl std::fmt::Display for PlacementError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::OutOfBounds => "out of bounds",
            Self::Occupied => "cell occupied",
            Self::OnPath => "cell is on the enemy path",
            Self::Blocked => "terrain is blocked",
            Self::AssetInUse => "asset already bound to a tower",
        };
        f.write_str(text)
    }
}

/// Why ownership of an asset could not be confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OwnershipFailure {
    /// The provider answered: the player does not own the asset.
    NotOwned,
    /// The provider could not be reached.
    Unreachable,
}

/// Coarse error classification reported to command producers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Map failed validation or has no path.
    InvalidMap,
    /// Cell cannot take a tower.
    InvalidPlacement,
    /// Not enough currency.
    InsufficientFunds,
    /// Asset ownership could not be confirmed.
    OwnershipUnverified,
    /// Operation illegal for the current run status.
    InvalidState,
    /// Command references an unknown entity.
    InvalidTarget,
    /// Internal consistency check failed; the run is aborted.
    InvariantViolation,
    /// Encoding, decoding, config or storage failure.
    Data,
}

/// Top-level error type for all game simulation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum GameError {
    /// Map failed validation or no spawn-to-base path exists.
    #[error("Invalid map: {0}")]
    InvalidMap(String),

    /// Tower placement rejected.
    #[error("Cannot place tower at {position}: {reason}")]
    InvalidPlacement {
        /// Requested cell.
        position: GridPos,
        /// Rejection reason.
        reason: PlacementError,
    },

    /// Insufficient currency for a debit.
    #[error("Insufficient funds: need {required}, have {available}")]
    InsufficientFunds {
        /// Amount required.
        required: u32,
        /// Amount available.
        available: u32,
    },

    /// Asset ownership could not be confirmed.
    #[error("Ownership of asset '{asset}' unverified: {reason:?}")]
    OwnershipUnverified {
        /// Asset that was checked.
        asset: AssetId,
        /// Why verification failed.
        reason: OwnershipFailure,
    },

    /// Invalid game state for the requested operation.
    #[error("Invalid game state: {0}")]
    InvalidState(String),

    /// Unknown entity id.
    #[error("Entity not found: {0}")]
    InvalidTarget(EntityId),

    /// A tick produced an impossible state.
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    /// Snapshot or replay encoding failure.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Ruleset or map data could not be parsed.
    #[error("Failed to parse ruleset: {0}")]
    RulesetParse(String),

    /// Snapshot store failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl GameError {
    /// Coarse classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidMap(_) => ErrorKind::InvalidMap,
            Self::InvalidPlacement { .. } => ErrorKind::InvalidPlacement,
            Self::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Self::OwnershipUnverified { .. } => ErrorKind::OwnershipUnverified,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::InvalidTarget(_) => ErrorKind::InvalidTarget,
            Self::InvariantViolation(_) => ErrorKind::InvariantViolation,
            Self::Serialization(_) | Self::RulesetParse(_) | Self::Storage(_) => ErrorKind::Data,
        }
    }
}

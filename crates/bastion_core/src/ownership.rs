//! Asset ownership oracle.
//!
//! Towers may be bound to an externally-owned asset. The simulation does not
//! talk to the asset layer itself; it asks an [`AssetOwnership`]
//! implementation supplied by the embedding application. The check is
//! synchronous and happens while a command is applied, so implementations
//! must answer from a local cache or fail fast.

use std::collections::HashSet;

use thiserror::Error;

use crate::entities::{AssetId, PlayerId};

/// The ownership provider could not answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OwnershipError {
    /// Provider unreachable or not configured.
    #[error("ownership provider unavailable: {0}")]
    Unavailable(String),
}

/// Answers whether a player owns an asset.
pub trait AssetOwnership: Send {
    /// `Ok(true)` if owned, `Ok(false)` if definitely not owned, `Err` if the
    /// answer is unknown.
    fn is_owned(&self, player: &PlayerId, asset: &AssetId) -> Result<bool, OwnershipError>;
}

/// Provider for runs without an asset layer. Every check fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAssets;

impl AssetOwnership for NoAssets {
    fn is_owned(&self, _player: &PlayerId, _asset: &AssetId) -> Result<bool, OwnershipError> {
        Err(OwnershipError::Unavailable("no asset provider configured".into()))
    }
}

/// Fixed ownership table.
#[derive(Debug, Clone, Default)]
pub struct StaticOwnership {
    owned: HashSet<(PlayerId, AssetId)>,
}

impl StaticOwnership {
    /// Empty table: nobody owns anything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `player` owns `asset`.
    #[must_use]
    pub fn with(mut self, player: PlayerId, asset: AssetId) -> Self {
        self.grant(player, asset);
        self
    }

    /// Record that `player` owns `asset`.
    pub fn grant(&mut self, player: PlayerId, asset: AssetId) {
        self.owned.insert((player, asset));
    }

    /// Remove a grant, e.g. after a transfer.
    pub fn revoke(&mut self, player: &PlayerId, asset: &AssetId) {
        self.owned.remove(&(player.clone(), asset.clone()));
    }
}

impl AssetOwnership for StaticOwnership {
    fn is_owned(&self, player: &PlayerId, asset: &AssetId) -> Result<bool, OwnershipError> {
        Ok(self.owned.contains(&(player.clone(), asset.clone())))
    }
}

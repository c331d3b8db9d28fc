//! # Bastion Core
//!
//! Deterministic simulation state engine for a tower-defense game.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No file or network IO
//! - No system randomness
//! - No floating-point math (uses fixed-point)
//!
//! This separation enables:
//! - Replays verified by state hash
//! - Headless runners and bots
//! - Save/restore at any tick boundary
//! - Determinism testing
//!
//! ## Crate Structure
//!
//! - [`entities`] - Towers, enemies, projectiles and ids
//! - [`map`] / [`pathfinding`] - Static grid, placement rules, enemy path
//! - [`ruleset`] - Data-driven stats and wave schedules
//! - [`combat`] / [`waves`] / [`economy`] - Per-tick game rules
//! - [`commands`] / [`clock`] - Command inbox and the tick driver
//! - [`snapshot`] / [`replay`] - Persistence, undo and replays
//! - [`ownership`] / [`advisor`] - Interfaces to the asset and AI layers

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod advisor;
pub mod clock;
pub mod combat;
pub mod commands;
pub mod economy;
pub mod entities;
pub mod error;
pub mod events;
pub mod map;
pub mod math;
mod movement;
pub mod ownership;
pub mod pathfinding;
pub mod replay;
pub mod ruleset;
pub mod snapshot;
pub mod state;
pub mod waves;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::advisor::{Advisor, AdvisorView, Candidate, TowerSummary};
    pub use crate::clock::{ClockConfig, SimulationClock};
    pub use crate::commands::{
        Command, CommandEffect, CommandEnvelope, CommandOutcome, CommandResult, CommandSender,
        CommandSource, CommandTicket,
    };
    pub use crate::economy::{Economy, EconomyEvent, LedgerReason};
    pub use crate::entities::{
        AssetId, EffectKind, Enemy, EnemyKind, EntityId, GridPos, PlayerId, Projectile,
        StatusEffect, Tower, TowerKind,
    };
    pub use crate::error::{ErrorKind, GameError, OwnershipFailure, PlacementError, Result};
    pub use crate::events::{DamageSource, GameEvent, TickReport};
    pub use crate::map::{GameMap, MapDef};
    pub use crate::math::Fixed;
    pub use crate::ownership::{AssetOwnership, NoAssets, OwnershipError, StaticOwnership};
    pub use crate::replay::Replay;
    pub use crate::ruleset::Ruleset;
    pub use crate::snapshot::{GameSnapshot, MemoryStore, SlotId, SnapshotStore};
    pub use crate::state::{GameState, RunStatus};
    pub use crate::waves::WavePhase;
}

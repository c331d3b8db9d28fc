//! Events emitted while a tick boundary is processed.
//!
//! Events are informational: the authoritative result of a tick is the new
//! state. Renderers use them for animation, tests use them to observe the
//! order of combat resolution.

use serde::{Deserialize, Serialize};

use crate::commands::CommandOutcome;
use crate::economy::EconomyEvent;
use crate::entities::{EffectKind, EnemyKind, EntityId, GridPos, TowerKind};
use crate::state::RunStatus;

/// What dealt a point of damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DamageSource {
    /// Instant hit from a tower.
    Tower(EntityId),
    /// Projectile arrival.
    Projectile {
        /// Projectile id.
        projectile: EntityId,
        /// Tower that launched it (may be gone).
        tower: EntityId,
    },
    /// Poison tick.
    Poison,
}

/// Something that happened during a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEvent {
    /// A tower was built.
    TowerPlaced {
        /// New tower.
        tower: EntityId,
        /// Its kind.
        kind: TowerKind,
        /// Its cell.
        position: GridPos,
    },
    /// A tower was sold.
    TowerSold {
        /// Removed tower.
        tower: EntityId,
        /// Currency returned.
        refund: u32,
    },
    /// A tower gained a level.
    TowerUpgraded {
        /// Upgraded tower.
        tower: EntityId,
        /// New level.
        level: u32,
    },
    /// A wave began.
    WaveStarted {
        /// Wave number, 1-based.
        wave: u32,
    },
    /// An enemy entered the map.
    EnemySpawned {
        /// New enemy.
        enemy: EntityId,
        /// Its kind.
        kind: EnemyKind,
        /// Owning wave.
        wave: u32,
    },
    /// An enemy reached the base.
    EnemyEscaped {
        /// Removed enemy.
        enemy: EntityId,
        /// Base health removed.
        base_damage: u32,
    },
    /// A tower fired at a target.
    TowerFired {
        /// Firing tower.
        tower: EntityId,
        /// Chosen target.
        target: EntityId,
    },
    /// A projectile was launched.
    ProjectileLaunched {
        /// New projectile.
        projectile: EntityId,
        /// Launching tower.
        tower: EntityId,
        /// Target enemy.
        target: EntityId,
    },
    /// A projectile arrived after its target was gone.
    ProjectileDissipated {
        /// Removed projectile.
        projectile: EntityId,
        /// Missing target.
        target: EntityId,
    },
    /// Damage applied to an enemy.
    EnemyDamaged {
        /// Damaged enemy.
        enemy: EntityId,
        /// Health actually removed.
        amount: u32,
        /// Cause.
        source: DamageSource,
    },
    /// An enemy died.
    EnemyKilled {
        /// Removed enemy.
        enemy: EntityId,
        /// Reward credited.
        reward: u32,
        /// Killing blow.
        source: DamageSource,
    },
    /// A status effect ran out.
    EffectExpired {
        /// Affected enemy.
        enemy: EntityId,
        /// Expired kind.
        kind: EffectKind,
    },
    /// Every spawn fired and no enemy of the wave remains.
    WaveCleared {
        /// Wave number, 1-based.
        wave: u32,
        /// Bonus credited.
        bonus: u32,
    },
    /// Run status transition.
    StatusChanged {
        /// Previous status.
        from: RunStatus,
        /// New status.
        to: RunStatus,
    },
}

/// Collector passed to systems while a boundary is processed.
#[derive(Debug, Clone, Default)]
pub struct TickEvents {
    /// Gameplay events in emission order.
    pub events: Vec<GameEvent>,
    /// Ledger entries in emission order.
    pub economy: Vec<EconomyEvent>,
}

impl TickEvents {
    /// Record a gameplay event.
    pub fn push(&mut self, event: GameEvent) {
        self.events.push(event);
    }
}

/// Everything a tick boundary produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    /// Tick counter after the boundary.
    pub tick: u64,
    /// Whether the simulation phases ran (false while paused or idle).
    pub advanced: bool,
    /// Status after the boundary.
    pub status: RunStatus,
    /// One outcome per drained command, in arrival order.
    pub outcomes: Vec<CommandOutcome>,
    /// Gameplay events.
    pub events: Vec<GameEvent>,
    /// Ledger entries.
    pub economy: Vec<EconomyEvent>,
}

impl TickReport {
    /// Number of enemies killed this boundary.
    #[must_use]
    pub fn kills(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, GameEvent::EnemyKilled { .. }))
            .count()
    }

    /// Commands that were rejected.
    pub fn rejections(&self) -> impl Iterator<Item = &CommandOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }
}

//! The root aggregate: everything a run owns.
//!
//! [`GameState`] is mutated only by the [`SimulationClock`](crate::clock::SimulationClock)
//! and the systems it drives. Every other reader sees it through an immutable
//! [`GameSnapshot`](crate::snapshot::GameSnapshot).

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::economy::{Economy, EconomyEvent, LedgerReason};
use crate::entities::{
    AssetId, Enemy, EntityId, EntityStorage, GridPos, PlayerId, Projectile, Tower, TowerKind,
};
use crate::error::{GameError, PlacementError, Result};
use crate::events::{DamageSource, GameEvent, TickEvents};
use crate::map::GameMap;
use crate::math::Vec2Fixed;
use crate::ruleset::Ruleset;
use crate::waves::WaveDirector;

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Set up; no wave started yet.
    #[default]
    Idle,
    /// Ticks advance.
    Running,
    /// Ticks frozen until resumed.
    Paused,
    /// Final wave cleared.
    Won,
    /// Base destroyed.
    Lost,
    /// An invariant check failed; only restore can recover.
    Aborted,
}

impl RunStatus {
    /// The run has ended and accepts no further gameplay commands.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Won | Self::Lost | Self::Aborted)
    }
}

/// Running totals for a run, used by advisors and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Enemies killed.
    pub kills: u32,
    /// Enemies that reached the base.
    pub escapes: u32,
    /// Shots fired by towers.
    pub shots: u64,
    /// Towers placed.
    pub towers_built: u32,
    /// Towers sold.
    pub towers_sold: u32,
    /// Waves cleared.
    pub waves_cleared: u32,
}

/// Outcome of a single damage application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageResult {
    /// Damage actually removed from health.
    pub dealt: u32,
    /// The enemy died and was removed.
    pub killed: bool,
}

/// Complete state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub(crate) player: PlayerId,
    pub(crate) map: Arc<GameMap>,
    pub(crate) ruleset_fingerprint: u64,
    pub(crate) tick: u64,
    pub(crate) status: RunStatus,
    /// Status to return to on resume.
    pub(crate) paused_from: Option<RunStatus>,
    pub(crate) base_health: u32,
    pub(crate) economy: Economy,
    pub(crate) towers: EntityStorage<Tower>,
    pub(crate) enemies: EntityStorage<Enemy>,
    pub(crate) projectiles: EntityStorage<Projectile>,
    pub(crate) waves: WaveDirector,
    pub(crate) stats: RunStats,
    pub(crate) next_id: EntityId,
}

impl GameState {
    /// Fresh state for a run of `ruleset` on `map`.
    #[must_use]
    pub fn new(player: PlayerId, ruleset: &Ruleset, map: Arc<GameMap>) -> Self {
        Self {
            player,
            map,
            ruleset_fingerprint: ruleset.fingerprint(),
            tick: 0,
            status: RunStatus::Idle,
            paused_from: None,
            base_health: ruleset.base_health,
            economy: Economy::new(ruleset.starting_balance),
            towers: EntityStorage::new(),
            enemies: EntityStorage::new(),
            projectiles: EntityStorage::new(),
            waves: WaveDirector::new(),
            stats: RunStats::default(),
            next_id: 1,
        }
    }

    /// Owning player.
    #[must_use]
    pub const fn player(&self) -> &PlayerId {
        &self.player
    }

    /// The static map.
    #[must_use]
    pub fn map(&self) -> &GameMap {
        &self.map
    }

    /// Fingerprint of the ruleset this state was created under.
    #[must_use]
    pub const fn ruleset_fingerprint(&self) -> u64 {
        self.ruleset_fingerprint
    }

    /// Completed ticks.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Run status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Remaining base health.
    #[must_use]
    pub const fn base_health(&self) -> u32 {
        self.base_health
    }

    /// Currency ledger.
    #[must_use]
    pub const fn economy(&self) -> &Economy {
        &self.economy
    }

    /// Live towers.
    #[must_use]
    pub const fn towers(&self) -> &EntityStorage<Tower> {
        &self.towers
    }

    /// Live enemies.
    #[must_use]
    pub const fn enemies(&self) -> &EntityStorage<Enemy> {
        &self.enemies
    }

    /// Projectiles in flight.
    #[must_use]
    pub const fn projectiles(&self) -> &EntityStorage<Projectile> {
        &self.projectiles
    }

    /// Wave director state.
    #[must_use]
    pub const fn waves(&self) -> &WaveDirector {
        &self.waves
    }

    /// Run totals.
    #[must_use]
    pub const fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Next id the allocator will hand out.
    #[must_use]
    pub const fn next_id(&self) -> EntityId {
        self.next_id
    }

    /// Tower standing on a cell, if any.
    #[must_use]
    pub fn tower_at(&self, position: GridPos) -> Option<&Tower> {
        self.towers.values().find(|t| t.position == position)
    }

    /// Live tower bound to an asset, if any.
    #[must_use]
    pub fn tower_with_asset(&self, asset: &AssetId) -> Option<&Tower> {
        self.towers
            .values()
            .find(|t| t.asset.as_ref() == Some(asset))
    }

    /// Current world position of an enemy.
    #[must_use]
    pub fn enemy_position(&self, enemy: &Enemy) -> Vec2Fixed {
        self.map
            .position_at(enemy.progress.index, enemy.progress.offset)
    }

    /// Check whether a tower of `kind` could be placed at `position` now.
    ///
    /// # Errors
    ///
    /// `InvalidPlacement` for terrain, path or occupancy problems (checked in
    /// that order), then `InsufficientFunds`.
    pub fn check_placement(
        &self,
        ruleset: &Ruleset,
        position: GridPos,
        kind: TowerKind,
    ) -> Result<()> {
        let spec = ruleset.tower(kind)?;
        self.map
            .check_buildable(position)
            .map_err(|reason| GameError::InvalidPlacement { position, reason })?;
        if self.tower_at(position).is_some() {
            return Err(GameError::InvalidPlacement {
                position,
                reason: PlacementError::Occupied,
            });
        }
        if !self.economy.can_afford(spec.cost) {
            return Err(GameError::InsufficientFunds {
                required: spec.cost,
                available: self.economy.balance(),
            });
        }
        Ok(())
    }

    /// Boolean form of [`check_placement`](Self::check_placement).
    #[must_use]
    pub fn can_place(&self, ruleset: &Ruleset, position: GridPos, kind: TowerKind) -> bool {
        self.check_placement(ruleset, position, kind).is_ok()
    }

    /// Deterministic hash of all mutable state.
    ///
    /// Entities are hashed in id order so two states with equal contents
    /// hash equal regardless of `HashMap` layout.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.ruleset_fingerprint.hash(&mut hasher);
        self.tick.hash(&mut hasher);
        self.status.hash(&mut hasher);
        self.paused_from.hash(&mut hasher);
        self.base_health.hash(&mut hasher);
        self.economy.hash(&mut hasher);
        self.waves.hash(&mut hasher);
        self.stats.hash(&mut hasher);
        self.next_id.hash(&mut hasher);

        for tower in self.towers.sorted() {
            tower.hash(&mut hasher);
        }
        for enemy in self.enemies.sorted() {
            enemy.hash(&mut hasher);
        }
        for projectile in self.projectiles.sorted() {
            projectile.hash(&mut hasher);
        }

        hasher.finish()
    }

    /// Validate structural invariants.
    ///
    /// # Errors
    ///
    /// `InvariantViolation` describing the first broken rule.
    pub fn check_invariants(&self) -> Result<()> {
        let violation = |msg: String| Err(GameError::InvariantViolation(msg));

        let mut cells = HashSet::with_capacity(self.towers.len());
        let mut assets = HashSet::new();
        for tower in self.towers.sorted() {
            if !cells.insert(tower.position) {
                return violation(format!("two towers occupy {}", tower.position));
            }
            if let Some(asset) = &tower.asset {
                if !assets.insert(asset) {
                    return violation(format!("asset '{asset}' bound to two towers"));
                }
            }
            if tower.level == 0 {
                return violation(format!("tower {} has level 0", tower.id));
            }
        }

        let last_index = self.map.path().len().saturating_sub(1);
        for enemy in self.enemies.sorted() {
            if enemy.health.current > enemy.health.max {
                return violation(format!(
                    "enemy {} health {} above max {}",
                    enemy.id, enemy.health.current, enemy.health.max
                ));
            }
            if enemy.health.is_dead() {
                return violation(format!("dead enemy {} still live", enemy.id));
            }
            if enemy.progress.index as usize >= last_index {
                return violation(format!("enemy {} past the base", enemy.id));
            }
        }

        let max_id = self
            .towers
            .sorted_ids()
            .into_iter()
            .chain(self.enemies.sorted_ids())
            .chain(self.projectiles.sorted_ids())
            .max();
        if let Some(max_id) = max_id {
            if max_id >= self.next_id {
                return violation(format!(
                    "entity id {max_id} not below allocator {}",
                    self.next_id
                ));
            }
        }

        let mut seen: HashMap<EntityId, &'static str> = HashMap::new();
        let groups: [(&'static str, Vec<EntityId>); 3] = [
            ("tower", self.towers.sorted_ids()),
            ("enemy", self.enemies.sorted_ids()),
            ("projectile", self.projectiles.sorted_ids()),
        ];
        for (label, ids) in groups {
            for id in ids {
                if let Some(other) = seen.insert(id, label) {
                    return violation(format!("id {id} shared by {other} and {label}"));
                }
            }
        }

        Ok(())
    }

    pub(crate) fn allocate_id(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub(crate) fn credit(
        &mut self,
        amount: u32,
        reason: LedgerReason,
        entity: Option<EntityId>,
        out: &mut TickEvents,
    ) {
        self.economy.credit(amount);
        out.economy.push(EconomyEvent::Credited {
            amount,
            reason,
            entity,
        });
    }

    pub(crate) fn debit(
        &mut self,
        amount: u32,
        reason: LedgerReason,
        entity: Option<EntityId>,
        out: &mut TickEvents,
    ) -> Result<()> {
        self.economy.debit(amount)?;
        out.economy.push(EconomyEvent::Debited {
            amount,
            reason,
            entity,
        });
        Ok(())
    }

    /// Damage an enemy; on death pay the reward and remove it.
    ///
    /// Returns `None` if the enemy is already gone.
    pub(crate) fn damage_enemy(
        &mut self,
        enemy_id: EntityId,
        amount: u32,
        source: DamageSource,
        out: &mut TickEvents,
    ) -> Option<DamageResult> {
        let enemy = self.enemies.get_mut(enemy_id)?;
        let dealt = enemy.health.apply_damage(amount);
        let killed = enemy.health.is_dead();
        let reward = enemy.reward;
        out.push(GameEvent::EnemyDamaged {
            enemy: enemy_id,
            amount: dealt,
            source,
        });

        if killed {
            self.enemies.remove(enemy_id);
            self.stats.kills += 1;
            self.credit(reward, LedgerReason::KillReward, Some(enemy_id), out);
            out.push(GameEvent::EnemyKilled {
                enemy: enemy_id,
                reward,
                source,
            });
        }

        Some(DamageResult { dealt, killed })
    }

    pub(crate) fn set_status(&mut self, status: RunStatus, out: &mut TickEvents) {
        if self.status != status {
            tracing::info!(
                tick = self.tick,
                from = ?self.status,
                to = ?status,
                "Run status changed"
            );
            out.push(GameEvent::StatusChanged {
                from: self.status,
                to: status,
            });
            self.status = status;
        }
    }
}

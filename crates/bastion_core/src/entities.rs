//! Entity model: towers, enemies, projectiles and the ids that link them.
//!
//! Entities are plain data. Cross-entity links (projectile to tower,
//! projectile to enemy) are stored as [`EntityId`]s and resolved against the
//! owning collection at use time; a missing id means the referenced entity
//! has already left the simulation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Unique identifier for entities. Never reused within a run.
pub type EntityId = u64;

/// Opaque player identity supplied by the session layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Create a player id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an externally-owned asset (an NFT id on the asset layer).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub String);

impl AssetId {
    /// Create an asset id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cell on the map grid.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct GridPos {
    /// Column.
    pub x: u32,
    /// Row.
    pub y: u32,
}

impl GridPos {
    /// Create a grid position.
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// The cell's center in cell units.
    #[must_use]
    pub fn center(self) -> Vec2Fixed {
        Vec2Fixed::new(Fixed::from_num(self.x), Fixed::from_num(self.y))
    }

    /// Manhattan distance to another cell.
    #[must_use]
    pub const fn manhattan(self, other: Self) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

impl std::fmt::Display for GridPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Tower archetypes. Stats live in the [`Ruleset`](crate::ruleset::Ruleset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TowerKind {
    /// Cheap projectile tower.
    Arrow,
    /// Slow, heavy projectile tower.
    Cannon,
    /// Instant-hit tower that slows its target.
    Frost,
    /// Instant-hit tower that poisons its target.
    Venom,
}

impl TowerKind {
    /// All tower kinds in declaration order.
    pub const ALL: [Self; 4] = [Self::Arrow, Self::Cannon, Self::Frost, Self::Venom];
}

impl std::fmt::Display for TowerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Arrow => "arrow",
            Self::Cannon => "cannon",
            Self::Frost => "frost",
            Self::Venom => "venom",
        };
        f.write_str(name)
    }
}

/// Enemy archetypes. Stats live in the [`Ruleset`](crate::ruleset::Ruleset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnemyKind {
    /// Baseline walker.
    Grunt,
    /// Fast and fragile.
    Runner,
    /// Slow and tough.
    Brute,
}

impl std::fmt::Display for EnemyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Grunt => "grunt",
            Self::Runner => "runner",
            Self::Brute => "brute",
        };
        f.write_str(name)
    }
}

/// A placed tower.
#[derive(Debug, Clone, PartialEq, Hash, Eq, Serialize, Deserialize)]
pub struct Tower {
    /// Entity id.
    pub id: EntityId,
    /// Archetype.
    pub kind: TowerKind,
    /// Cell the tower occupies. Unique across live towers.
    pub position: GridPos,
    /// Upgrade level, starting at 1.
    pub level: u32,
    /// Ticks until the tower may fire again.
    pub cooldown: u32,
    /// External asset bound to this tower, if any.
    pub asset: Option<AssetId>,
    /// Total currency spent on placement and upgrades.
    pub invested: u32,
}

/// Health component for enemies.
#[derive(Debug, Clone, Copy, PartialEq, Hash, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Current health points.
    pub current: u32,
    /// Maximum health points.
    pub max: u32,
}

impl Health {
    /// Create new health at full.
    #[must_use]
    pub const fn new(max: u32) -> Self {
        Self { current: max, max }
    }

    /// Check if dead (health == 0).
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.current == 0
    }

    /// Apply damage, returning actual damage dealt.
    /// Saturates at zero; health never goes negative.
    pub fn apply_damage(&mut self, amount: u32) -> u32 {
        let actual = amount.min(self.current);
        self.current -= actual;
        actual
    }
}

/// Position along the precomputed path: a cell index plus a fractional offset
/// toward the next cell. Ordering is "further along the path is greater".
#[derive(Debug, Clone, Copy, PartialEq, Hash, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct PathProgress {
    /// Index of the last path cell reached.
    pub index: u32,
    /// Fraction of the way to `index + 1`, in `[0, 1)`.
    #[serde(with = "fixed_serde")]
    pub offset: Fixed,
}

impl PathProgress {
    /// Advance by `amount` cells along a path of `path_len` cells.
    ///
    /// Returns `true` once the terminal cell is reached; progress is then
    /// pinned to the terminal cell.
    pub fn advance(&mut self, amount: Fixed, path_len: usize) -> bool {
        let last = u32::try_from(path_len.saturating_sub(1)).unwrap_or(u32::MAX);
        if self.index >= last {
            self.index = last;
            self.offset = Fixed::ZERO;
            return true;
        }

        self.offset += amount.max(Fixed::ZERO);
        while self.offset >= Fixed::ONE {
            self.offset -= Fixed::ONE;
            self.index += 1;
        }

        if self.index >= last {
            self.index = last;
            self.offset = Fixed::ZERO;
            true
        } else {
            false
        }
    }
}

/// Status effect types. At most one effect of each kind is active on an enemy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    /// Movement reduced by `magnitude` percent.
    Slow,
    /// `magnitude` damage per tick.
    Poison,
}

/// Largest slow percentage; enemies always keep moving.
pub const MAX_SLOW_PERCENT: u32 = 90;

/// An active or to-be-applied status effect.
#[derive(Debug, Clone, Copy, PartialEq, Hash, Eq, Serialize, Deserialize)]
pub struct StatusEffect {
    /// Effect type.
    pub kind: EffectKind,
    /// Slow percentage or poison damage per tick.
    pub magnitude: u32,
    /// Ticks left.
    pub remaining: u32,
}

/// A live enemy walking the path.
#[derive(Debug, Clone, PartialEq, Hash, Eq, Serialize, Deserialize)]
pub struct Enemy {
    /// Entity id.
    pub id: EntityId,
    /// Archetype.
    pub kind: EnemyKind,
    /// Health.
    pub health: Health,
    /// Progress along the map path.
    pub progress: PathProgress,
    /// Base movement in cells per tick.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Active effects, sorted by kind, one per kind.
    pub effects: Vec<StatusEffect>,
    /// Currency paid on kill.
    pub reward: u32,
    /// Base health removed if this enemy escapes.
    pub base_damage: u32,
    /// Wave number (1-based) that spawned this enemy.
    pub wave: u32,
}

impl Enemy {
    /// Apply or refresh a status effect.
    ///
    /// Reapplying a kind keeps the longer duration and the stronger magnitude.
    pub fn apply_effect(&mut self, effect: StatusEffect) {
        match self.effects.binary_search_by_key(&effect.kind, |e| e.kind) {
            Ok(index) => {
                let existing = &mut self.effects[index];
                existing.remaining = existing.remaining.max(effect.remaining);
                existing.magnitude = existing.magnitude.max(effect.magnitude);
            }
            Err(index) => self.effects.insert(index, effect),
        }
    }

    /// Look up the active effect of a kind.
    #[must_use]
    pub fn effect(&self, kind: EffectKind) -> Option<&StatusEffect> {
        self.effects.iter().find(|e| e.kind == kind)
    }

    /// Movement this tick after slows.
    #[must_use]
    pub fn effective_speed(&self) -> Fixed {
        let slow = self
            .effect(EffectKind::Slow)
            .map_or(0, |e| e.magnitude.min(MAX_SLOW_PERCENT));
        crate::math::percent_of(self.speed, 100 - slow)
    }
}

/// A shot in flight. Damage and effect are captured at launch.
#[derive(Debug, Clone, PartialEq, Hash, Eq, Serialize, Deserialize)]
pub struct Projectile {
    /// Entity id.
    pub id: EntityId,
    /// Tower that fired (may no longer exist).
    pub source: EntityId,
    /// Enemy targeted (may no longer exist).
    pub target: EntityId,
    /// Ticks until arrival.
    pub remaining: u32,
    /// Damage dealt on arrival.
    pub damage: u32,
    /// Effect applied on arrival.
    pub effect: Option<StatusEffect>,
}

/// Storage for one entity type.
///
/// Uses a `HashMap` for O(1) lookup by id, with deterministic
/// iteration via sorted keys when running systems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStorage<T> {
    entities: HashMap<EntityId, T>,
}

impl<T> EntityStorage<T> {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
        }
    }

    /// Insert an entity under an id allocated by the caller.
    pub fn insert(&mut self, id: EntityId, entity: T) {
        self.entities.insert(id, entity);
    }

    /// Remove an entity by id.
    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        self.entities.remove(&id)
    }

    /// Get an entity by id.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.entities.get(&id)
    }

    /// Get a mutable reference to an entity by id.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        self.entities.get_mut(&id)
    }

    /// Check if an entity exists.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if storage is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Sorted entity ids for deterministic iteration.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<_> = self.entities.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Entities in ascending id order.
    #[must_use]
    pub fn sorted(&self) -> Vec<&T> {
        self.sorted_ids()
            .into_iter()
            .filter_map(|id| self.entities.get(&id))
            .collect()
    }

    /// Iterate over all entities (not in deterministic order).
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entities.values()
    }
}

impl<T> Default for EntityStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}

//! Data-driven rules: tower and enemy stats, wave schedules, run constants.
//!
//! A [`Ruleset`] is immutable for the lifetime of a run. It is shared
//! between the clock and replays via `Arc` and identified by a
//! [`fingerprint`](Ruleset::fingerprint) so snapshots taken under one
//! ruleset cannot be restored under another.
//!
//! # Example RON
//!
//! ```ron
//! (
//!     name: "tiny",
//!     starting_balance: 100,
//!     base_health: 5,
//!     sell_refund_percent: 50,
//!     towers: [
//!         (kind: arrow, cost: 60, damage: 6, range: 3000, fire_interval: 1,
//!          delivery: Instant, upgrade_cost: 40, damage_per_level: 2),
//!     ],
//!     enemies: [(kind: grunt, health: 10, speed: 100, reward: 5, base_damage: 1)],
//!     waves: [(spawns: [(enemy: grunt, offset: 0, count: 1)], clear_bonus: 10)],
//! )
//! ```
//!
//! Fractional values (`range`, `speed`, `range_per_level`) are written in
//! thousandths.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;

use serde::{Deserialize, Serialize};

use crate::entities::{EffectKind, EnemyKind, StatusEffect, TowerKind};
use crate::error::{GameError, Result};
use crate::math::{from_milli, milli_serde, Fixed};

/// How a tower's shot reaches its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delivery {
    /// Damage resolves in the firing tick.
    Instant,
    /// A projectile travels for `travel_ticks` before resolving.
    Projectile {
        /// Ticks in flight (at least 1).
        travel_ticks: u32,
    },
}

/// Status effect a tower applies on hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectSpec {
    /// Effect type.
    pub kind: EffectKind,
    /// Slow percent or poison damage per tick.
    pub magnitude: u32,
    /// Duration in ticks.
    pub duration: u32,
}

impl EffectSpec {
    /// Fresh effect instance.
    ///
    /// Poison bites in the status phase of the hit tick. A slow first
    /// applies to the next tick's movement, so it starts one tick longer to
    /// survive the countdown of the tick it lands in.
    #[must_use]
    pub const fn instance(&self) -> StatusEffect {
        let remaining = match self.kind {
            EffectKind::Slow => self.duration.saturating_add(1),
            EffectKind::Poison => self.duration,
        };
        StatusEffect {
            kind: self.kind,
            magnitude: self.magnitude,
            remaining,
        }
    }
}

/// Stats of one tower kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TowerSpec {
    /// Kind these stats describe.
    pub kind: TowerKind,
    /// Placement cost.
    pub cost: u32,
    /// Damage per hit at level 1.
    pub damage: u32,
    /// Range in cells at level 1.
    #[serde(with = "milli_serde")]
    pub range: Fixed,
    /// Ticks between shots.
    pub fire_interval: u32,
    /// Hit delivery.
    pub delivery: Delivery,
    /// Effect applied on hit.
    #[serde(default)]
    pub effect: Option<EffectSpec>,
    /// Upgrade cost per current level (level 1 -> 2 costs `upgrade_cost`).
    pub upgrade_cost: u32,
    /// Damage added per level above 1.
    #[serde(default)]
    pub damage_per_level: u32,
    /// Range added per level above 1.
    #[serde(default, with = "milli_serde")]
    pub range_per_level: Fixed,
    /// Highest reachable level.
    #[serde(default = "default_max_level")]
    pub max_level: u32,
}

const fn default_max_level() -> u32 {
    3
}

/// Highest `max_level` a tower kind may declare.
pub const MAX_TOWER_LEVEL: u32 = 100;

/// Longest tower range in cells, at any level.
pub const MAX_TOWER_RANGE: i32 = 1024;

/// Fastest enemy speed in cells per tick.
pub const MAX_ENEMY_SPEED: i32 = 16;

/// Effective tower stats at a given level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TowerStats {
    /// Damage per hit.
    pub damage: u32,
    /// Range in cells.
    pub range: Fixed,
    /// Ticks between shots.
    pub fire_interval: u32,
    /// Hit delivery.
    pub delivery: Delivery,
    /// Effect applied on hit.
    pub effect: Option<StatusEffect>,
}

impl TowerSpec {
    /// Stats at `level` (1-based).
    #[must_use]
    pub fn stats_at(&self, level: u32) -> TowerStats {
        let bonus_levels = level.saturating_sub(1);
        TowerStats {
            damage: self
                .damage
                .saturating_add(self.damage_per_level.saturating_mul(bonus_levels)),
            range: self.range.saturating_add(
                self.range_per_level
                    .saturating_mul(Fixed::saturating_from_num(bonus_levels)),
            ),
            fire_interval: self.fire_interval,
            delivery: self.delivery,
            effect: self.effect.map(|e| e.instance()),
        }
    }

    /// Cost to go from `level` to `level + 1`.
    #[must_use]
    pub const fn upgrade_cost_from(&self, level: u32) -> u32 {
        self.upgrade_cost.saturating_mul(level)
    }
}

/// Stats of one enemy kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnemySpec {
    /// Kind these stats describe.
    pub kind: EnemyKind,
    /// Starting health.
    pub health: u32,
    /// Cells per tick.
    #[serde(with = "milli_serde")]
    pub speed: Fixed,
    /// Currency paid on kill.
    pub reward: u32,
    /// Base health removed on escape.
    pub base_damage: u32,
}

/// One group of spawns inside a wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnDescriptor {
    /// Enemy kind to spawn.
    pub enemy: EnemyKind,
    /// Tick offset of the first spawn, relative to wave start.
    pub offset: u64,
    /// Number of enemies in the group.
    pub count: u32,
    /// Ticks between successive spawns of the group (0 = same tick).
    #[serde(default)]
    pub interval: u32,
}

impl SpawnDescriptor {
    /// Offset (relative to wave start) of the `k`-th spawn of this group.
    #[must_use]
    pub const fn offset_of(&self, k: u32) -> u64 {
        self.offset
            .saturating_add((k as u64).saturating_mul(self.interval as u64))
    }
}

/// A scheduled wave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveSpec {
    /// Spawn groups in declaration order.
    pub spawns: Vec<SpawnDescriptor>,
    /// Currency credited when the wave clears.
    #[serde(default)]
    pub clear_bonus: u32,
}

impl WaveSpec {
    /// Total enemies this wave spawns.
    #[must_use]
    pub fn total_spawns(&self) -> u32 {
        self.spawns
            .iter()
            .fold(0, |total: u32, s| total.saturating_add(s.count))
    }
}

/// Complete rules for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ruleset {
    /// Display name.
    pub name: String,
    /// Currency at run start.
    pub starting_balance: u32,
    /// Base health at run start.
    pub base_health: u32,
    /// Percent of invested currency returned on sale.
    pub sell_refund_percent: u32,
    /// Tower catalog.
    pub towers: Vec<TowerSpec>,
    /// Enemy catalog.
    pub enemies: Vec<EnemySpec>,
    /// Waves in play order.
    pub waves: Vec<WaveSpec>,
}

impl Ruleset {
    /// Parse and validate a RON ruleset.
    pub fn from_ron_str(ron: &str) -> Result<Self> {
        let ruleset: Self =
            ron::from_str(ron).map_err(|e| GameError::RulesetParse(e.to_string()))?;
        ruleset.validate()?;
        Ok(ruleset)
    }

    /// Serialize to pretty RON.
    pub fn to_ron_string(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| GameError::Serialization(e.to_string()))
    }

    /// Stats for a tower kind.
    pub fn tower(&self, kind: TowerKind) -> Result<&TowerSpec> {
        self.towers
            .iter()
            .find(|t| t.kind == kind)
            .ok_or_else(|| GameError::InvalidState(format!("Tower kind '{kind}' not in ruleset")))
    }

    /// Stats for an enemy kind.
    pub fn enemy(&self, kind: EnemyKind) -> Result<&EnemySpec> {
        self.enemies
            .iter()
            .find(|e| e.kind == kind)
            .ok_or_else(|| GameError::InvalidState(format!("Enemy kind '{kind}' not in ruleset")))
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(GameError::RulesetParse(msg));

        if self.waves.is_empty() {
            return fail("ruleset has no waves".into());
        }
        if self.sell_refund_percent > 100 {
            return fail(format!(
                "sell_refund_percent {} exceeds 100",
                self.sell_refund_percent
            ));
        }
        if self.base_health == 0 {
            return fail("base_health must be positive".into());
        }

        for (i, tower) in self.towers.iter().enumerate() {
            if self.towers[..i].iter().any(|t| t.kind == tower.kind) {
                return fail(format!("tower kind '{}' defined twice", tower.kind));
            }
            if tower.fire_interval == 0 {
                return fail(format!("tower '{}' has zero fire_interval", tower.kind));
            }
            if tower.max_level == 0 {
                return fail(format!("tower '{}' has zero max_level", tower.kind));
            }
            if tower.max_level > MAX_TOWER_LEVEL {
                return fail(format!(
                    "tower '{}' max_level {} exceeds {MAX_TOWER_LEVEL}",
                    tower.kind, tower.max_level
                ));
            }
            if let Delivery::Projectile { travel_ticks: 0 } = tower.delivery {
                return fail(format!("tower '{}' has zero travel_ticks", tower.kind));
            }
            if tower.effect.is_some_and(|e| e.duration == 0) {
                return fail(format!("tower '{}' has a zero-duration effect", tower.kind));
            }
            if tower.range < Fixed::ZERO || tower.range_per_level < Fixed::ZERO {
                return fail(format!("tower '{}' has negative range", tower.kind));
            }
            let top_range = tower.stats_at(tower.max_level).range;
            if top_range > Fixed::from_num(MAX_TOWER_RANGE) {
                return fail(format!(
                    "tower '{}' range {top_range} exceeds {MAX_TOWER_RANGE}",
                    tower.kind
                ));
            }
        }

        for (i, enemy) in self.enemies.iter().enumerate() {
            if self.enemies[..i].iter().any(|e| e.kind == enemy.kind) {
                return fail(format!("enemy kind '{}' defined twice", enemy.kind));
            }
            if enemy.health == 0 {
                return fail(format!("enemy '{}' has zero health", enemy.kind));
            }
            if enemy.speed <= Fixed::ZERO {
                return fail(format!("enemy '{}' never moves", enemy.kind));
            }
            if enemy.speed > Fixed::from_num(MAX_ENEMY_SPEED) {
                return fail(format!(
                    "enemy '{}' speed {} exceeds {MAX_ENEMY_SPEED} cells per tick",
                    enemy.kind, enemy.speed
                ));
            }
        }

        for (number, wave) in self.waves.iter().enumerate() {
            if wave.total_spawns() == 0 {
                return fail(format!("wave {} spawns nothing", number + 1));
            }
            for spawn in &wave.spawns {
                if self.enemy(spawn.enemy).is_err() {
                    return fail(format!(
                        "wave {} spawns unknown enemy '{}'",
                        number + 1,
                        spawn.enemy
                    ));
                }
            }
        }

        Ok(())
    }

    /// Stable 64-bit identity of these rules.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        // bincode output is canonical for a given value
        let bytes = bincode::serialize(self).unwrap_or_default();
        hasher.write(&bytes);
        hasher.finish()
    }

    /// The built-in five-wave ruleset.
    #[must_use]
    pub fn standard() -> Self {
        let spawn = |enemy, offset, count, interval| SpawnDescriptor {
            enemy,
            offset,
            count,
            interval,
        };

        Self {
            name: "standard".to_string(),
            starting_balance: 150,
            base_health: 20,
            sell_refund_percent: 70,
            towers: vec![
                TowerSpec {
                    kind: TowerKind::Arrow,
                    cost: 50,
                    damage: 4,
                    range: from_milli(3000),
                    fire_interval: 5,
                    delivery: Delivery::Projectile { travel_ticks: 2 },
                    effect: None,
                    upgrade_cost: 40,
                    damage_per_level: 2,
                    range_per_level: from_milli(500),
                    max_level: 3,
                },
                TowerSpec {
                    kind: TowerKind::Cannon,
                    cost: 120,
                    damage: 15,
                    range: from_milli(2500),
                    fire_interval: 15,
                    delivery: Delivery::Projectile { travel_ticks: 4 },
                    effect: None,
                    upgrade_cost: 90,
                    damage_per_level: 8,
                    range_per_level: Fixed::ZERO,
                    max_level: 3,
                },
                TowerSpec {
                    kind: TowerKind::Frost,
                    cost: 80,
                    damage: 1,
                    range: from_milli(2500),
                    fire_interval: 8,
                    delivery: Delivery::Instant,
                    effect: Some(EffectSpec {
                        kind: EffectKind::Slow,
                        magnitude: 40,
                        duration: 20,
                    }),
                    upgrade_cost: 60,
                    damage_per_level: 1,
                    range_per_level: from_milli(500),
                    max_level: 3,
                },
                TowerSpec {
                    kind: TowerKind::Venom,
                    cost: 90,
                    damage: 2,
                    range: from_milli(3000),
                    fire_interval: 10,
                    delivery: Delivery::Instant,
                    effect: Some(EffectSpec {
                        kind: EffectKind::Poison,
                        magnitude: 1,
                        duration: 30,
                    }),
                    upgrade_cost: 70,
                    damage_per_level: 1,
                    range_per_level: from_milli(500),
                    max_level: 3,
                },
            ],
            enemies: vec![
                EnemySpec {
                    kind: EnemyKind::Grunt,
                    health: 20,
                    speed: from_milli(100),
                    reward: 5,
                    base_damage: 1,
                },
                EnemySpec {
                    kind: EnemyKind::Runner,
                    health: 12,
                    speed: from_milli(200),
                    reward: 4,
                    base_damage: 1,
                },
                EnemySpec {
                    kind: EnemyKind::Brute,
                    health: 80,
                    speed: from_milli(50),
                    reward: 15,
                    base_damage: 3,
                },
            ],
            waves: vec![
                WaveSpec {
                    spawns: vec![spawn(EnemyKind::Grunt, 0, 6, 20)],
                    clear_bonus: 20,
                },
                WaveSpec {
                    spawns: vec![
                        spawn(EnemyKind::Grunt, 0, 6, 15),
                        spawn(EnemyKind::Runner, 40, 4, 10),
                    ],
                    clear_bonus: 25,
                },
                WaveSpec {
                    spawns: vec![
                        spawn(EnemyKind::Runner, 0, 8, 8),
                        spawn(EnemyKind::Brute, 60, 1, 0),
                    ],
                    clear_bonus: 30,
                },
                WaveSpec {
                    spawns: vec![
                        spawn(EnemyKind::Grunt, 0, 10, 10),
                        spawn(EnemyKind::Brute, 30, 3, 30),
                    ],
                    clear_bonus: 40,
                },
                WaveSpec {
                    spawns: vec![
                        spawn(EnemyKind::Brute, 0, 4, 25),
                        spawn(EnemyKind::Runner, 10, 12, 6),
                        spawn(EnemyKind::Grunt, 50, 8, 8),
                    ],
                    clear_bonus: 60,
                },
            ],
        }
    }
}

impl Default for Ruleset {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TINY: &str = r#"(
        name: "tiny",
        starting_balance: 100,
        base_health: 5,
        sell_refund_percent: 50,
        towers: [
            (kind: arrow, cost: 60, damage: 6, range: 3000, fire_interval: 1,
             delivery: Projectile(travel_ticks: 2), upgrade_cost: 40, damage_per_level: 2),
            (kind: frost, cost: 30, damage: 1, range: 2500, fire_interval: 4,
             delivery: Instant, effect: Some((kind: slow, magnitude: 50, duration: 5)),
             upgrade_cost: 20),
        ],
        enemies: [(kind: grunt, health: 10, speed: 250, reward: 5, base_damage: 1)],
        waves: [(spawns: [(enemy: grunt, offset: 0, count: 2, interval: 3)], clear_bonus: 10)],
    )"#;

    #[test]
    fn test_standard_ruleset_is_valid() {
        let rules = Ruleset::standard();
        assert!(rules.validate().is_ok());
        for kind in TowerKind::ALL {
            assert!(rules.tower(kind).is_ok());
        }
    }

    #[test]
    fn test_parse_ron_ruleset() {
        let rules = Ruleset::from_ron_str(TINY).unwrap();
        assert_eq!(rules.name, "tiny");
        let arrow = rules.tower(TowerKind::Arrow).unwrap();
        assert_eq!(arrow.range, Fixed::from_num(3));
        assert_eq!(arrow.max_level, 3);
        assert_eq!(
            arrow.delivery,
            Delivery::Projectile { travel_ticks: 2 }
        );
        let grunt = rules.enemy(EnemyKind::Grunt).unwrap();
        assert_eq!(grunt.speed, Fixed::from_num(0.25));
        assert_eq!(rules.waves[0].spawns[0].interval, 3);
        assert!(rules.tower(TowerKind::Cannon).is_err());
    }

    #[test]
    fn test_ron_roundtrip_preserves_fingerprint() {
        let rules = Ruleset::standard();
        let text = rules.to_ron_string().unwrap();
        let parsed = Ruleset::from_ron_str(&text).unwrap();
        assert_eq!(parsed, rules);
        assert_eq!(parsed.fingerprint(), rules.fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_with_rules() {
        let a = Ruleset::standard();
        let mut b = Ruleset::standard();
        b.starting_balance += 1;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_validate_rejects_unknown_enemy() {
        let mut rules = Ruleset::from_ron_str(TINY).unwrap();
        rules.waves[0].spawns[0].enemy = EnemyKind::Brute;
        assert!(matches!(rules.validate(), Err(GameError::RulesetParse(_))));
    }

    #[test]
    fn test_validate_rejects_oversized_range() {
        let huge = TINY.replace("range: 3000", "range: 100000000");
        assert!(matches!(Ruleset::from_ron_str(&huge), Err(GameError::RulesetParse(_))));

        let mut rules = Ruleset::from_ron_str(TINY).unwrap();
        rules.towers[0].range_per_level = Fixed::from_num(600);
        assert!(matches!(rules.validate(), Err(GameError::RulesetParse(_))));
    }

    #[test]
    fn test_unrepresentable_value_is_parse_error() {
        let broken = TINY.replace("range: 3000", "range: 9000000000000");
        assert!(matches!(Ruleset::from_ron_str(&broken), Err(GameError::RulesetParse(_))));
    }

    #[test]
    fn test_validate_rejects_stalled_enemies() {
        let mut rules = Ruleset::from_ron_str(TINY).unwrap();
        rules.enemies[0].speed = Fixed::ZERO;
        assert!(matches!(rules.validate(), Err(GameError::RulesetParse(_))));

        rules.enemies[0].speed = Fixed::from_num(-1);
        assert!(matches!(rules.validate(), Err(GameError::RulesetParse(_))));

        rules.enemies[0].speed = Fixed::from_num(MAX_ENEMY_SPEED + 1);
        assert!(matches!(rules.validate(), Err(GameError::RulesetParse(_))));
    }

    #[test]
    fn test_effects_last_their_duration() {
        let slow = EffectSpec {
            kind: EffectKind::Slow,
            magnitude: 50,
            duration: 5,
        };
        let poison = EffectSpec {
            kind: EffectKind::Poison,
            ..slow
        };
        assert_eq!(slow.instance().remaining, 6);
        assert_eq!(poison.instance().remaining, 5);

        let mut rules = Ruleset::from_ron_str(TINY).unwrap();
        rules.towers[1].effect = Some(EffectSpec { duration: 0, ..slow });
        assert!(matches!(rules.validate(), Err(GameError::RulesetParse(_))));
    }

    #[test]
    fn test_validate_rejects_excessive_max_level() {
        let mut rules = Ruleset::from_ron_str(TINY).unwrap();
        rules.towers[1].max_level = MAX_TOWER_LEVEL + 1;
        assert!(matches!(rules.validate(), Err(GameError::RulesetParse(_))));
    }

    #[test]
    fn test_extreme_spawn_schedule_saturates() {
        let spawn = SpawnDescriptor {
            enemy: EnemyKind::Grunt,
            offset: u64::MAX - 5,
            count: u32::MAX,
            interval: u32::MAX,
        };
        assert_eq!(spawn.offset_of(u32::MAX), u64::MAX);
        let wave = WaveSpec {
            spawns: vec![spawn, spawn],
            clear_bonus: 0,
        };
        assert_eq!(wave.total_spawns(), u32::MAX);
    }

    #[test]
    fn test_stats_scale_with_level() {
        let rules = Ruleset::standard();
        let arrow = rules.tower(TowerKind::Arrow).unwrap();
        let l1 = arrow.stats_at(1);
        let l3 = arrow.stats_at(3);
        assert_eq!(l1.damage, 4);
        assert_eq!(l3.damage, 8);
        assert_eq!(l3.range, Fixed::from_num(4));
        assert_eq!(arrow.upgrade_cost_from(1), 40);
        assert_eq!(arrow.upgrade_cost_from(2), 80);
    }
}

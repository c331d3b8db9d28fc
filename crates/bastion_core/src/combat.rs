//! Combat resolution: targeting, projectiles, damage and status effects.
//!
//! # Order within a tick
//!
//! 1. [`projectile_system`]: projectiles in ascending id advance one tick;
//!    arrivals hit a live target or dissipate.
//! 2. [`tower_system`]: towers in ascending id cool down and fire.
//! 3. [`status_system`]: poison damage, then duration countdown.
//!
//! Targets are chosen by [`select_target`]: the in-range enemy furthest
//! along the path, lowest id on ties. Because towers resolve one at a time,
//! a tower never targets an enemy killed earlier in the same tick.

use std::cmp::Reverse;

use crate::entities::{EffectKind, Enemy, EntityId, Projectile, StatusEffect};
use crate::error::Result;
use crate::events::{DamageSource, GameEvent, TickEvents};
use crate::math::{Fixed, Vec2Fixed};
use crate::ruleset::{Delivery, Ruleset};
use crate::state::GameState;

/// Pick the enemy a tower at `origin` with `range` should shoot.
///
/// `distance² <= range²` in cell units; greatest path progress wins, then
/// lowest id.
#[must_use]
pub fn select_target(state: &GameState, origin: Vec2Fixed, range: Fixed) -> Option<EntityId> {
    let range_sq = range.saturating_mul(range);
    state
        .enemies
        .values()
        .filter(|enemy| state.enemy_position(enemy).distance_squared(origin) <= range_sq)
        .max_by_key(|enemy| (enemy.progress, Reverse(enemy.id)))
        .map(|enemy| enemy.id)
}

/// Land a hit: damage first, then the effect if the enemy survived.
fn apply_hit(
    state: &mut GameState,
    target: EntityId,
    damage: u32,
    effect: Option<StatusEffect>,
    source: DamageSource,
    out: &mut TickEvents,
) {
    let Some(result) = state.damage_enemy(target, damage, source, out) else {
        return;
    };
    if result.killed {
        return;
    }
    if let (Some(effect), Some(enemy)) = (effect, state.enemies.get_mut(target)) {
        enemy.apply_effect(effect);
    }
}

/// Advance projectiles and resolve arrivals.
pub(crate) fn projectile_system(state: &mut GameState, out: &mut TickEvents) {
    for id in state.projectiles.sorted_ids() {
        let Some(projectile) = state.projectiles.get_mut(id) else {
            continue;
        };
        projectile.remaining = projectile.remaining.saturating_sub(1);
        if projectile.remaining > 0 {
            continue;
        }

        let Some(Projectile {
            source,
            target,
            damage,
            effect,
            ..
        }) = state.projectiles.remove(id)
        else {
            continue;
        };

        if state.enemies.contains(target) {
            let source = DamageSource::Projectile {
                projectile: id,
                tower: source,
            };
            apply_hit(state, target, damage, effect, source, out);
        } else {
            tracing::trace!(projectile = id, target, "Projectile dissipated");
            out.push(GameEvent::ProjectileDissipated { projectile: id, target });
        }
    }
}

/// Cool towers down and fire those that are ready.
pub(crate) fn tower_system(
    state: &mut GameState,
    ruleset: &Ruleset,
    out: &mut TickEvents,
) -> Result<()> {
    for id in state.towers.sorted_ids() {
        let Some(tower) = state.towers.get_mut(id) else {
            continue;
        };
        if tower.cooldown > 0 {
            tower.cooldown -= 1;
            if tower.cooldown > 0 {
                continue;
            }
        }

        let stats = ruleset.tower(tower.kind)?.stats_at(tower.level);
        let origin = tower.position.center();
        let Some(target) = select_target(state, origin, stats.range) else {
            continue;
        };

        if let Some(tower) = state.towers.get_mut(id) {
            tower.cooldown = stats.fire_interval;
        }
        state.stats.shots += 1;
        out.push(GameEvent::TowerFired { tower: id, target });

        match stats.delivery {
            Delivery::Instant => {
                apply_hit(
                    state,
                    target,
                    stats.damage,
                    stats.effect,
                    DamageSource::Tower(id),
                    out,
                );
            }
            Delivery::Projectile { travel_ticks } => {
                let projectile = state.allocate_id();
                state.projectiles.insert(
                    projectile,
                    Projectile {
                        id: projectile,
                        source: id,
                        target,
                        remaining: travel_ticks.max(1),
                        damage: stats.damage,
                        effect: stats.effect,
                    },
                );
                out.push(GameEvent::ProjectileLaunched {
                    projectile,
                    tower: id,
                    target,
                });
            }
        }
    }
    Ok(())
}

/// Apply poison, count down durations and drop expired effects.
pub(crate) fn status_system(state: &mut GameState, out: &mut TickEvents) {
    for id in state.enemies.sorted_ids() {
        let poison = state
            .enemies
            .get(id)
            .and_then(|enemy| enemy.effect(EffectKind::Poison))
            .map(|effect| effect.magnitude);

        if let Some(damage) = poison {
            let killed = state
                .damage_enemy(id, damage, DamageSource::Poison, out)
                .map_or(true, |r| r.killed);
            if killed {
                continue;
            }
        }

        let Some(enemy) = state.enemies.get_mut(id) else {
            continue;
        };
        tick_effects(enemy, out);
    }
}

fn tick_effects(enemy: &mut Enemy, out: &mut TickEvents) {
    for effect in &mut enemy.effects {
        effect.remaining = effect.remaining.saturating_sub(1);
    }
    let id = enemy.id;
    enemy.effects.retain(|effect| {
        let keep = effect.remaining > 0;
        if !keep {
            out.push(GameEvent::EffectExpired {
                enemy: id,
                kind: effect.kind,
            });
        }
        keep
    });
}

//! Enemy movement along the precomputed path.

use crate::events::{GameEvent, TickEvents};
use crate::state::GameState;

/// Advance every enemy by its effective speed.
///
/// Enemies reaching the base cell damage the base and leave without paying
/// a reward.
pub(crate) fn movement_system(state: &mut GameState, out: &mut TickEvents) {
    let path_len = state.map.path().len();

    for id in state.enemies.sorted_ids() {
        let Some(enemy) = state.enemies.get_mut(id) else {
            continue;
        };
        let speed = enemy.effective_speed();
        if !enemy.progress.advance(speed, path_len) {
            continue;
        }

        let base_damage = enemy.base_damage;
        state.enemies.remove(id);
        state.base_health = state.base_health.saturating_sub(base_damage);
        state.stats.escapes += 1;
        tracing::debug!(enemy = id, base_damage, base_health = state.base_health, "Enemy escaped");
        out.push(GameEvent::EnemyEscaped {
            enemy: id,
            base_damage,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::entities::{
        EffectKind, Enemy, EnemyKind, Health, PathProgress, PlayerId, StatusEffect,
    };
    use crate::map::{GameMap, MapDef};
    use crate::math::{from_milli, Fixed};
    use crate::ruleset::Ruleset;

    fn state_with(speed: Fixed) -> GameState {
        let rules = Ruleset::standard();
        let map = GameMap::parse(&MapDef::new("c", &["S===B"])).unwrap();
        let mut state = GameState::new(PlayerId::new("p"), &rules, Arc::new(map));
        let id = state.allocate_id();
        state.enemies.insert(
            id,
            Enemy {
                id,
                kind: EnemyKind::Grunt,
                health: Health::new(10),
                progress: PathProgress::default(),
                speed,
                effects: Vec::new(),
                reward: 5,
                base_damage: 3,
                wave: 1,
            },
        );
        state
    }

    #[test]
    fn test_enemy_walks_and_escapes() {
        let mut state = state_with(Fixed::from_num(1.5));
        let mut out = TickEvents::default();

        movement_system(&mut state, &mut out);
        movement_system(&mut state, &mut out);
        assert_eq!(state.enemies.get(1).unwrap().progress.index, 3);
        assert_eq!(state.base_health, 20);

        movement_system(&mut state, &mut out);
        assert!(state.enemies.is_empty());
        assert_eq!(state.base_health, 17);
        assert_eq!(state.stats.escapes, 1);
        assert!(out.economy.is_empty());
    }

    #[test]
    fn test_slow_reduces_movement() {
        let mut state = state_with(from_milli(500));
        state.enemies.get_mut(1).unwrap().apply_effect(StatusEffect {
            kind: EffectKind::Slow,
            magnitude: 50,
            remaining: 10,
        });
        let mut out = TickEvents::default();
        movement_system(&mut state, &mut out);
        let progress = state.enemies.get(1).unwrap().progress;
        assert_eq!(progress.index, 0);
        assert_eq!(progress.offset, Fixed::from_num(0.25));
    }
}

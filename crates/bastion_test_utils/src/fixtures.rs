//! Test fixtures and helpers.
//!
//! Small rulesets and maps with hand-checkable numbers, plus pre-built
//! clocks for consistent testing.

use std::sync::Arc;

use bastion_core::prelude::*;
use fixed::types::I32F32;

/// A one-wave ruleset with round numbers.
///
/// - balance 100, base health 5, 50% refund
/// - arrow: cost 60, 6 damage, range 3, fires every tick, 2-tick projectile
/// - frost: cost 30, 1 damage, range 2.5, instant, 50% slow for 5 ticks
/// - venom: cost 40, instant, 2 poison per tick for 3 ticks
/// - grunt: 10 health, 0.25 cells per tick, reward 5
/// - one wave of two grunts 3 ticks apart, clear bonus 10
pub const TINY_RULESET: &str = r#"(
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
        (kind: venom, cost: 40, damage: 0, range: 3000, fire_interval: 10,
         delivery: Instant, effect: Some((kind: poison, magnitude: 2, duration: 3)),
         upgrade_cost: 30, max_level: 2),
    ],
    enemies: [(kind: grunt, health: 10, speed: 250, reward: 5, base_damage: 1)],
    waves: [(spawns: [(enemy: grunt, offset: 0, count: 2, interval: 3)], clear_bonus: 10)],
)"#;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from thousandths (`milli(250)` is 0.25).
#[must_use]
pub fn milli(n: i64) -> I32F32 {
    bastion_core::math::from_milli(n)
}

/// The tiny ruleset, parsed.
///
/// # Panics
///
/// Panics if [`TINY_RULESET`] stops parsing.
#[must_use]
pub fn tiny_ruleset() -> Ruleset {
    Ruleset::from_ron_str(TINY_RULESET).expect("tiny ruleset parses")
}

/// A straight three-row map: spawn on the left, base on the right, a road of
/// `length` cells between them (spawn and base included) and buildable
/// ground above and below.
///
/// # Panics
///
/// Panics if `length < 2`.
#[must_use]
pub fn corridor_map(length: usize) -> MapDef {
    assert!(length >= 2, "corridor needs room for spawn and base");
    let ground = ".".repeat(length);
    let road = format!("S{}B", "=".repeat(length - 2));
    MapDef::new("corridor", &[ground.as_str(), road.as_str(), ground.as_str()])
}

/// Clock config without undo or recording, for a named player.
#[must_use]
pub fn quiet_config(player: &str) -> ClockConfig {
    ClockConfig {
        player: PlayerId::new(player),
        undo_depth: 0,
        record_replay: false,
    }
}

/// Clock over arbitrary rules and map with default settings.
///
/// # Panics
///
/// Panics if the ruleset or map is invalid.
#[must_use]
pub fn clock_with(ruleset: Ruleset, map: &MapDef) -> SimulationClock {
    SimulationClock::new(Arc::new(ruleset), map, ClockConfig::default())
        .expect("fixture clock builds")
}

/// Standard rules on the standard map.
#[must_use]
pub fn standard_clock() -> SimulationClock {
    clock_with(Ruleset::standard(), &MapDef::standard())
}

/// Tiny rules on a ten-cell corridor.
#[must_use]
pub fn tiny_clock() -> SimulationClock {
    clock_with(tiny_ruleset(), &corridor_map(10))
}

/// Place command without an asset binding.
#[must_use]
pub fn place(kind: TowerKind, x: u32, y: u32) -> Command {
    Command::PlaceTower {
        kind,
        position: GridPos::new(x, y),
        asset: None,
    }
}

/// Submit a player command and process one boundary, returning the result.
///
/// # Panics
///
/// Panics if the boundary itself fails.
pub fn apply(clock: &mut SimulationClock, command: Command) -> CommandResult {
    let ticket = clock.submit(command).expect("clock inbox open");
    clock.tick().expect("boundary succeeds");
    ticket.blocking_outcome()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corridor_path_length() {
        let map = GameMap::parse(&corridor_map(6)).unwrap();
        assert_eq!(map.path().len(), 6);
        assert_eq!(map.spawn(), GridPos::new(0, 1));
        assert_eq!(map.base(), GridPos::new(5, 1));
    }

    #[test]
    fn test_tiny_clock_starts_idle() {
        let clock = tiny_clock();
        assert_eq!(clock.state().status(), RunStatus::Idle);
        assert_eq!(clock.state().economy().balance(), 100);
        assert_eq!(clock.state().base_health(), 5);
    }

    #[test]
    fn test_apply_returns_outcome() {
        let mut clock = tiny_clock();
        let effect = apply(&mut clock, place(TowerKind::Frost, 2, 0)).unwrap();
        assert!(matches!(effect, CommandEffect::TowerPlaced { .. }));
        assert_eq!(clock.state().economy().balance(), 70);
    }
}

//! Wave director: spawn scheduling and wave completion.
//!
//! Phases run `Idle -> Active -> Cleared -> (Active | Victory)`. Spawns are
//! keyed to the tick the wave started on, so the schedule is a pure function
//! of the tick counter and survives snapshot/restore unchanged.

use serde::{Deserialize, Serialize};

use crate::economy::LedgerReason;
use crate::entities::{Enemy, Health, PathProgress};
use crate::error::{GameError, Result};
use crate::events::{GameEvent, TickEvents};
use crate::ruleset::{Ruleset, WaveSpec};
use crate::state::{GameState, RunStatus};

/// Director phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WavePhase {
    /// No wave started yet.
    #[default]
    Idle,
    /// A wave is spawning or has enemies alive.
    Active,
    /// The last started wave is done; more remain.
    Cleared,
    /// Every wave is done.
    Victory,
}

/// Schedule state for the current wave.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct WaveDirector {
    phase: WavePhase,
    /// Number of waves started so far; the current wave when active.
    current: u32,
    /// Tick the current wave started on.
    started_at: u64,
    /// Spawns fired so far, per descriptor of the current wave.
    fired: Vec<u32>,
}

impl WaveDirector {
    /// Director before the first wave.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: WavePhase::Idle,
            current: 0,
            started_at: 0,
            fired: Vec::new(),
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> WavePhase {
        self.phase
    }

    /// Current (or last started) wave number, 1-based; 0 before the first.
    #[must_use]
    pub const fn current_wave(&self) -> u32 {
        self.current
    }

    /// Tick the current wave started on.
    #[must_use]
    pub const fn started_at(&self) -> u64 {
        self.started_at
    }

    /// A wave is in progress.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.phase, WavePhase::Active)
    }

    /// Waves not yet started.
    #[must_use]
    pub fn waves_remaining(&self, ruleset: &Ruleset) -> u32 {
        u32::try_from(ruleset.waves.len())
            .unwrap_or(u32::MAX)
            .saturating_sub(self.current)
    }

    /// Every scheduled spawn of the current wave has fired.
    #[must_use]
    pub fn all_spawns_fired(&self, ruleset: &Ruleset) -> bool {
        self.spec(ruleset).map_or(true, |wave| {
            wave.spawns
                .iter()
                .zip(self.fired.iter().chain(std::iter::repeat(&0)))
                .all(|(desc, fired)| *fired >= desc.count)
        })
    }

    /// Spawns of the current wave still to come.
    #[must_use]
    pub fn pending_spawns(&self, ruleset: &Ruleset) -> u32 {
        self.spec(ruleset).map_or(0, |wave| {
            wave.spawns
                .iter()
                .enumerate()
                .map(|(i, desc)| desc.count.saturating_sub(self.fired.get(i).copied().unwrap_or(0)))
                .sum()
        })
    }

    fn spec<'r>(&self, ruleset: &'r Ruleset) -> Option<&'r WaveSpec> {
        let index = usize::try_from(self.current.checked_sub(1)?).ok()?;
        ruleset.waves.get(index)
    }
}

/// Begin the next wave.
///
/// # Errors
///
/// `InvalidState` if the run is over, a wave is already active, or no waves
/// remain.
pub(crate) fn start_wave(
    state: &mut GameState,
    ruleset: &Ruleset,
    out: &mut TickEvents,
) -> Result<u32> {
    if state.status.is_finished() {
        return Err(GameError::InvalidState(format!(
            "cannot start a wave: run is {:?}",
            state.status
        )));
    }
    if state.waves.is_active() {
        return Err(GameError::InvalidState(format!(
            "wave {} is still active",
            state.waves.current
        )));
    }
    if state.waves.waves_remaining(ruleset) == 0 {
        return Err(GameError::InvalidState("no waves remain".into()));
    }

    let director = &mut state.waves;
    director.current += 1;
    director.started_at = state.tick;
    director.phase = WavePhase::Active;
    let descriptors = director.spec(ruleset).map_or(0, |w| w.spawns.len());
    director.fired = vec![0; descriptors];
    let wave = director.current;

    tracing::info!(wave, tick = state.tick, "Wave started");
    out.push(GameEvent::WaveStarted { wave });

    match state.status {
        RunStatus::Idle => state.set_status(RunStatus::Running, out),
        // Starting a wave while paused from idle resumes into a live run.
        RunStatus::Paused if state.paused_from == Some(RunStatus::Idle) => {
            state.paused_from = Some(RunStatus::Running);
        }
        _ => {}
    }

    Ok(wave)
}

/// Spawn every enemy whose scheduled tick has come.
pub(crate) fn spawn_system(
    state: &mut GameState,
    ruleset: &Ruleset,
    out: &mut TickEvents,
) -> Result<()> {
    if !state.waves.is_active() {
        return Ok(());
    }
    let Some(wave) = state.waves.spec(ruleset) else {
        return Err(GameError::InvariantViolation(format!(
            "active wave {} not in ruleset",
            state.waves.current
        )));
    };

    let elapsed = state.tick.saturating_sub(state.waves.started_at);
    let wave_number = state.waves.current;

    for (index, desc) in wave.spawns.iter().enumerate() {
        let spec = ruleset.enemy(desc.enemy)?;
        loop {
            let fired = state.waves.fired.get(index).copied().unwrap_or(0);
            if fired >= desc.count || desc.offset_of(fired) > elapsed {
                break;
            }

            let id = state.allocate_id();
            state.enemies.insert(
                id,
                Enemy {
                    id,
                    kind: spec.kind,
                    health: Health::new(spec.health),
                    progress: PathProgress::default(),
                    speed: spec.speed,
                    effects: Vec::new(),
                    reward: spec.reward,
                    base_damage: spec.base_damage,
                    wave: wave_number,
                },
            );
            if let Some(slot) = state.waves.fired.get_mut(index) {
                *slot += 1;
            }
            out.push(GameEvent::EnemySpawned {
                enemy: id,
                kind: spec.kind,
                wave: wave_number,
            });
        }
    }

    Ok(())
}

/// Clear the active wave once it is exhausted, then settle victory or defeat.
pub(crate) fn outcome_system(state: &mut GameState, ruleset: &Ruleset, out: &mut TickEvents) {
    if state.base_health == 0 {
        state.set_status(RunStatus::Lost, out);
        return;
    }

    if !state.waves.is_active() || !state.waves.all_spawns_fired(ruleset) {
        return;
    }
    let wave = state.waves.current;
    if state.enemies.values().any(|e| e.wave == wave) {
        return;
    }

    let bonus = state.waves.spec(ruleset).map_or(0, |w| w.clear_bonus);
    state.credit(bonus, LedgerReason::WaveBonus, None, out);
    state.stats.waves_cleared += 1;
    out.push(GameEvent::WaveCleared { wave, bonus });
    tracing::info!(wave, bonus, tick = state.tick, "Wave cleared");

    if state.waves.waves_remaining(ruleset) == 0 {
        state.waves.phase = WavePhase::Victory;
        state.set_status(RunStatus::Won, out);
    } else {
        state.waves.phase = WavePhase::Cleared;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::entities::{EnemyKind, PlayerId};
    use crate::map::{GameMap, MapDef};
    use crate::ruleset::SpawnDescriptor;

    fn two_wave_rules() -> Ruleset {
        let mut rules = Ruleset::standard();
        rules.waves = vec![
            WaveSpec {
                spawns: vec![
                    SpawnDescriptor {
                        enemy: EnemyKind::Grunt,
                        offset: 0,
                        count: 2,
                        interval: 2,
                    },
                    SpawnDescriptor {
                        enemy: EnemyKind::Runner,
                        offset: 0,
                        count: 1,
                        interval: 0,
                    },
                ],
                clear_bonus: 7,
            },
            WaveSpec {
                spawns: vec![SpawnDescriptor {
                    enemy: EnemyKind::Brute,
                    offset: 1,
                    count: 1,
                    interval: 0,
                }],
                clear_bonus: 9,
            },
        ];
        rules
    }

    fn fresh(rules: &Ruleset) -> GameState {
        let map = GameMap::parse(&MapDef::standard()).unwrap();
        GameState::new(PlayerId::new("p"), rules, Arc::new(map))
    }

    #[test]
    fn test_start_wave_moves_idle_to_running() {
        let rules = two_wave_rules();
        let mut state = fresh(&rules);
        let mut out = TickEvents::default();
        assert_eq!(start_wave(&mut state, &rules, &mut out).unwrap(), 1);
        assert_eq!(state.status, RunStatus::Running);
        assert!(state.waves.is_active());
        assert!(matches!(
            start_wave(&mut state, &rules, &mut out),
            Err(GameError::InvalidState(_))
        ));
    }

    #[test]
    fn test_spawn_order_follows_declaration() {
        let rules = two_wave_rules();
        let mut state = fresh(&rules);
        let mut out = TickEvents::default();
        start_wave(&mut state, &rules, &mut out).unwrap();
        out.events.clear();

        spawn_system(&mut state, &rules, &mut out).unwrap();
        let kinds: Vec<_> = out
            .events
            .iter()
            .filter_map(|e| match e {
                GameEvent::EnemySpawned { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec![EnemyKind::Grunt, EnemyKind::Runner]);
        assert_eq!(state.waves.pending_spawns(&rules), 1);

        state.tick += 1;
        spawn_system(&mut state, &rules, &mut out).unwrap();
        assert_eq!(state.enemies.len(), 2);

        state.tick += 1;
        spawn_system(&mut state, &rules, &mut out).unwrap();
        assert_eq!(state.enemies.len(), 3);
        assert!(state.waves.all_spawns_fired(&rules));
    }

    #[test]
    fn test_not_cleared_while_spawns_pending() {
        let rules = two_wave_rules();
        let mut state = fresh(&rules);
        let mut out = TickEvents::default();
        start_wave(&mut state, &rules, &mut out).unwrap();
        spawn_system(&mut state, &rules, &mut out).unwrap();

        // Kill everything spawned so far; one grunt is still scheduled.
        for id in state.enemies.sorted_ids() {
            state.enemies.remove(id);
        }
        outcome_system(&mut state, &rules, &mut out);
        assert_eq!(state.waves.phase(), WavePhase::Active);
    }

    #[test]
    fn test_clear_then_victory() {
        let rules = two_wave_rules();
        let mut state = fresh(&rules);
        let mut out = TickEvents::default();

        for _ in 0..2 {
            start_wave(&mut state, &rules, &mut out).unwrap();
            while !state.waves.all_spawns_fired(&rules) {
                spawn_system(&mut state, &rules, &mut out).unwrap();
                state.tick += 1;
            }
            for id in state.enemies.sorted_ids() {
                state.enemies.remove(id);
            }
            outcome_system(&mut state, &rules, &mut out);
        }

        assert_eq!(state.waves.phase(), WavePhase::Victory);
        assert_eq!(state.status, RunStatus::Won);
        assert_eq!(state.economy.balance(), rules.starting_balance + 7 + 9);
        assert!(start_wave(&mut state, &rules, &mut out).is_err());
    }

    #[test]
    fn test_loss_when_base_destroyed() {
        let rules = two_wave_rules();
        let mut state = fresh(&rules);
        let mut out = TickEvents::default();
        start_wave(&mut state, &rules, &mut out).unwrap();
        state.base_health = 0;
        outcome_system(&mut state, &rules, &mut out);
        assert_eq!(state.status, RunStatus::Lost);
        assert!(out
            .events
            .contains(&GameEvent::StatusChanged {
                from: RunStatus::Running,
                to: RunStatus::Lost
            }));
    }
}

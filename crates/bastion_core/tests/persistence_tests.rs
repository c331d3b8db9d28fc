//! Snapshot, undo, save slot and replay tests.

use std::sync::Arc;

use bastion_core::prelude::*;
use bastion_core::snapshot::{load_snapshot, save_snapshot};
use bastion_test_utils::determinism::{
    find_first_divergence, run_parallel_scripts, run_script, verify_clock_determinism,
    verify_snapshot_determinism, ScriptedCommand,
};
use bastion_test_utils::fixtures::{apply, place, quiet_config, standard_clock};

fn opening() -> Vec<ScriptedCommand> {
    vec![
        ScriptedCommand::player(0, place(TowerKind::Arrow, 2, 1)),
        ScriptedCommand::player(0, place(TowerKind::Arrow, 4, 3)),
        ScriptedCommand::player(1, Command::StartWave),
    ]
}

#[test]
fn restore_of_capture_changes_nothing() {
    let mut clock = standard_clock();
    run_script(&mut clock, &opening(), 30).unwrap();
    apply(&mut clock, Command::Pause).unwrap();

    let snapshot = clock.capture();
    let hash = clock.state().state_hash();
    clock.restore(&snapshot).unwrap();
    assert_eq!(clock.state().state_hash(), hash);
    assert_eq!(clock.state(), snapshot.state());
}

#[test]
fn restored_running_snapshot_waits_for_resume() {
    let mut clock = standard_clock();
    run_script(&mut clock, &opening(), 30).unwrap();
    let running = clock.capture();
    assert_eq!(running.state().status(), RunStatus::Running);

    run_script(&mut clock, &[], 10).unwrap();
    apply(&mut clock, Command::Pause).unwrap();
    clock.restore(&running).unwrap();

    assert_eq!(clock.state().status(), RunStatus::Paused);
    assert_eq!(clock.state().tick(), running.tick());
    clock.run_ticks(5).unwrap();
    assert_eq!(clock.state().tick(), running.tick());

    apply(&mut clock, Command::Resume).unwrap();
    assert_eq!(clock.state().tick(), running.tick() + 1);
}

#[test]
fn saved_slot_resumes_identically() {
    let mut clock = standard_clock();
    run_script(&mut clock, &opening(), 45).unwrap();
    let mut store = MemoryStore::new();
    let slot = SlotId::new("mid-wave");
    save_snapshot(&mut store, &slot, &clock.capture()).unwrap();

    let loaded = load_snapshot(&store, &PlayerId::new("local"), &slot).unwrap();
    let mut resumed = SimulationClock::from_snapshot(
        clock.ruleset().clone(),
        loaded,
        quiet_config("local"),
    )
    .unwrap();

    let expected = run_script(&mut clock, &[], 80).unwrap();
    let actual = run_script(&mut resumed, &[], 80).unwrap();
    assert_eq!(expected, actual);
}

#[test]
fn slots_are_scoped_per_player() {
    let mut store = MemoryStore::new();
    let slot = SlotId::new("one");
    save_snapshot(&mut store, &slot, &standard_clock().capture()).unwrap();
    assert!(matches!(
        load_snapshot(&store, &PlayerId::new("someone-else"), &slot),
        Err(GameError::Storage(_))
    ));
}

#[test]
fn snapshot_split_matches_uninterrupted_run() {
    assert!(verify_snapshot_determinism(standard_clock, &opening(), 25, 150));
}

#[test]
fn independent_runs_never_diverge() {
    assert!(find_first_divergence(standard_clock, &opening(), 250).is_none());
}

#[test]
fn repeated_scripted_runs_agree() {
    assert!(verify_clock_determinism(standard_clock, &opening(), 300));
}

#[test]
fn clocks_on_separate_threads_agree() {
    let result = run_parallel_scripts(standard_clock, &opening(), 4, 300);
    assert_eq!(result.hashes.len(), 4);
    result.assert_deterministic();
}

#[test]
fn undo_skips_pause_only_batches() {
    let mut clock = standard_clock();
    apply(&mut clock, place(TowerKind::Arrow, 2, 1)).unwrap();
    apply(&mut clock, Command::Pause).unwrap();
    assert_eq!(clock.undo_len(), 1);

    clock.undo().unwrap();
    assert!(clock.state().towers().is_empty());
    assert_eq!(clock.state().economy().balance(), 150);
}

#[test]
fn undo_refused_while_running() {
    let mut clock = standard_clock();
    apply(&mut clock, Command::StartWave).unwrap();
    assert!(matches!(clock.undo(), Err(GameError::InvalidState(_))));
}

#[test]
fn full_recorded_run_verifies() {
    let config = ClockConfig {
        record_replay: true,
        ..ClockConfig::default()
    };
    let rules = Arc::new(Ruleset::standard());
    let mut clock = SimulationClock::new(rules.clone(), &MapDef::standard(), config).unwrap();
    let sender = clock.sender();
    for (x, y) in [(2, 1), (4, 3), (5, 2), (9, 4)] {
        sender
            .send(CommandSource::Advisor, place(TowerKind::Arrow, x, y))
            .unwrap();
    }

    for _ in 0..5_000 {
        if clock.state().waves().phase() != WavePhase::Active
            && clock.state().status() != RunStatus::Won
        {
            sender.send(CommandSource::Timer, Command::StartWave).unwrap();
        }
        clock.tick().unwrap();
        if clock.state().status().is_finished() {
            break;
        }
    }
    assert!(clock.state().status().is_finished());

    let replay = clock.finish_replay().unwrap();
    let decoded = Replay::from_bytes(&replay.to_bytes().unwrap()).unwrap();
    let verification = decoded.verify(rules).unwrap();
    assert!(verification.is_match());
    assert_eq!(verification.final_tick, clock.state().tick());
}

//! Property tests: random command scripts never break state invariants.

use std::collections::HashSet;

use bastion_core::prelude::*;
use bastion_test_utils::determinism::strategies::{arb_command_sequence, arb_script};
use bastion_test_utils::determinism::ScriptedCommand;
use bastion_test_utils::fixtures::{tiny_clock, tiny_ruleset};
use proptest::prelude::*;

const BOUNDARIES: u64 = 80;

/// Drive the script, checking invariants after every boundary. Returns the
/// reports so ledger totals can be compared.
fn drive(script: &[ScriptedCommand]) -> (SimulationClock, Vec<TickReport>) {
    let mut clock = tiny_clock();
    let sender = clock.sender();
    let mut reports = Vec::new();
    for boundary in 0..BOUNDARIES {
        for scripted in script.iter().filter(|c| c.boundary == boundary) {
            sender.send(scripted.source, scripted.command.clone()).unwrap();
        }
        let report = clock.tick().unwrap();
        check_state(clock.state());
        reports.push(report);
    }
    (clock, reports)
}

fn check_state(state: &GameState) {
    state.check_invariants().unwrap();

    let cells: HashSet<_> = state.towers().values().map(|t| t.position).collect();
    assert_eq!(cells.len(), state.towers().len());
    for tower in state.towers().values() {
        assert!(!state.map().is_on_path(tower.position));
    }
    for enemy in state.enemies().values() {
        assert!(enemy.health.current > 0);
        assert!(enemy.health.current <= enemy.health.max);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn ledger_matches_reported_entries(script in arb_script(10, 3, BOUNDARIES, 24)) {
        let (clock, reports) = drive(&script);
        let mut credited: u64 = 0;
        let mut debited: u64 = 0;
        for entry in reports.iter().flat_map(|r| r.economy.iter()) {
            match entry {
                EconomyEvent::Credited { amount, .. } => credited += u64::from(*amount),
                EconomyEvent::Debited { amount, .. } => debited += u64::from(*amount),
            }
        }
        let start = u64::from(tiny_ruleset().starting_balance);
        let economy = clock.state().economy();
        prop_assert_eq!(u64::from(economy.balance()), start + credited - debited);
        prop_assert_eq!(economy.lifetime_earned(), credited);
    }

    #[test]
    fn every_command_gets_exactly_one_outcome(script in arb_script(10, 3, BOUNDARIES, 24)) {
        let (_, reports) = drive(&script);
        let outcomes: Vec<u64> = reports
            .iter()
            .flat_map(|r| r.outcomes.iter().map(|o| o.seq))
            .collect();
        prop_assert_eq!(outcomes.len(), script.len());
        prop_assert!(outcomes.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn one_burst_applies_in_submission_order(commands in arb_command_sequence(10, 3, 32)) {
        let mut clock = tiny_clock();
        let sender = clock.sender();
        let seqs: Vec<u64> = commands
            .iter()
            .map(|command| sender.send(CommandSource::Player, command.clone()).unwrap())
            .collect();

        let first = clock.tick().unwrap();
        check_state(clock.state());
        let applied: Vec<u64> = first.outcomes.iter().map(|o| o.seq).collect();
        prop_assert_eq!(applied, seqs);

        for _ in 0..40 {
            let report = clock.tick().unwrap();
            prop_assert!(report.outcomes.is_empty());
            check_state(clock.state());
        }
    }

    #[test]
    fn tick_only_moves_while_running(script in arb_script(10, 3, BOUNDARIES, 24)) {
        let (_, reports) = drive(&script);
        let mut previous = 0;
        for report in &reports {
            if report.advanced {
                prop_assert_eq!(report.tick, previous + 1);
            } else {
                prop_assert_eq!(report.tick, previous);
            }
            previous = report.tick;
        }
    }
}

//! Headless game runner implementation.
//!
//! [`HeadlessRunner`] serves the JSON-lines protocol over any reader and
//! writer pair. [`run_scenario`] plays a scenario to completion without a
//! controller, for autoplay, replay recording and determinism checks.

use std::io::{self, BufRead, Write};

use bastion_core::prelude::*;
use bastion_core::snapshot::{load_snapshot, save_snapshot};
use bastion_core::state::RunStats;
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::advisor::{GreedyAdvisor, GreedyConfig};
use crate::protocol::{OutcomeOutput, Request, Response, StateOutput};
use crate::scenario::{Scenario, ScenarioError};

/// Error type for runner operations.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Reading requests or writing responses failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Scenario could not be loaded.
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    /// The simulation failed.
    #[error(transparent)]
    Game(#[from] GameError),
}

/// Headless runner configuration.
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    /// Output state after every tick request (vs only on query).
    pub auto_state_output: bool,
    /// Upper bound on boundaries processed by a single tick request.
    pub max_tick_batch: u32,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            auto_state_output: false,
            max_tick_batch: 10_000,
        }
    }
}

/// Headless runner for controller-driven gameplay.
pub struct HeadlessRunner {
    clock: SimulationClock,
    sender: CommandSender,
    store: Box<dyn SnapshotStore>,
    advisor: Option<Box<dyn Advisor>>,
    config: HeadlessConfig,
    game_over_sent: bool,
}

impl HeadlessRunner {
    /// Create a runner around an existing clock.
    pub fn new(clock: SimulationClock, store: Box<dyn SnapshotStore>) -> Self {
        let sender = clock.sender();
        Self {
            clock,
            sender,
            store,
            advisor: None,
            config: HeadlessConfig::default(),
            game_over_sent: false,
        }
    }

    /// Create a runner for a scenario. The scenario script is not played;
    /// the controller drives the run. Its autoplay settings configure the
    /// advisor behind `advise` requests.
    pub fn from_scenario(
        scenario: &Scenario,
        store: Box<dyn SnapshotStore>,
    ) -> std::result::Result<Self, RunnerError> {
        let clock = scenario.build_clock(false)?;
        let advisor = GreedyAdvisor::new(
            clock.ruleset().clone(),
            scenario.autoplay.clone().unwrap_or_default(),
        );
        Ok(Self::new(clock, store).with_advisor(advisor))
    }

    /// Use custom configuration.
    #[must_use]
    pub fn with_config(mut self, config: HeadlessConfig) -> Self {
        self.config = config;
        self
    }

    /// Answer `advise` requests with this advisor.
    #[must_use]
    pub fn with_advisor(mut self, advisor: impl Advisor + 'static) -> Self {
        self.advisor = Some(Box::new(advisor));
        self
    }

    /// The simulation clock.
    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    /// Run the request loop until `quit` or end of input.
    ///
    /// Emits `ready` first. Malformed lines produce an `error` response and
    /// the session continues.
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        input: R,
        mut output: W,
    ) -> std::result::Result<(), RunnerError> {
        write_response(&mut output, &Response::ready(self.clock.state().tick()))?;

        for line in input.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let request = match Request::from_json(line) {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!(error = %e, "Malformed request");
                    let response = Response::error(format!("Invalid request: {e}"), None);
                    write_response(&mut output, &response)?;
                    continue;
                }
            };

            let quit = request == Request::Quit;
            for response in self.handle(request) {
                write_response(&mut output, &response)?;
            }
            output.flush()?;
            if quit {
                break;
            }
        }

        tracing::info!(tick = self.clock.state().tick(), "Session ended");
        Ok(())
    }

    /// Handle one request.
    pub fn handle(&mut self, request: Request) -> Vec<Response> {
        let name = request.name();
        tracing::debug!(cmd = name, "Request");

        if let Some(command) = request.to_command() {
            return vec![match self.sender.send(CommandSource::Player, command) {
                Ok(seq) => Response::ack(name, Some(seq)),
                Err(e) => Response::game_error(&e, name),
            }];
        }

        let result = match request {
            Request::Tick { count } => Ok(self.tick(count)),
            Request::Query => Ok(vec![Response::State(StateOutput::from_snapshot(
                &self.clock.capture(),
            ))]),
            Request::Hash => Ok(vec![Response::StateHash {
                tick: self.clock.state().tick(),
                hash: self.clock.state().state_hash(),
            }]),
            Request::Save { slot } => self.save(slot),
            Request::Load { slot } => self.load(slot),
            Request::Slots => self.slots(),
            Request::Undo => self.undo(),
            Request::Advise { apply } => self.advise(apply),
            Request::Quit => Ok(vec![Response::Bye]),
            _ => Ok(vec![Response::error("unhandled request", Some(name))]),
        };
        result.unwrap_or_else(|e| vec![Response::game_error(&e, name)])
    }

    fn tick(&mut self, count: u32) -> Vec<Response> {
        let count = count.min(self.config.max_tick_batch);
        let mut outcomes = Vec::new();
        let mut kills = 0;
        let mut responses = Vec::new();

        for _ in 0..count {
            match self.clock.tick() {
                Ok(report) => {
                    outcomes.extend(report.outcomes.iter().map(OutcomeOutput::from));
                    kills += report.kills();
                }
                Err(e) => {
                    responses.push(Response::game_error(&e, "tick"));
                    break;
                }
            }
            if self.clock.state().status().is_finished() {
                break;
            }
        }

        let state = self.clock.state();
        responses.insert(
            0,
            Response::Ticked {
                tick: state.tick(),
                status: state.status(),
                outcomes,
                kills,
            },
        );
        if self.config.auto_state_output {
            responses.push(Response::State(StateOutput::from_snapshot(
                &self.clock.capture(),
            )));
        }
        if state.status().is_finished() && !self.game_over_sent {
            self.game_over_sent = true;
            tracing::info!(result = ?state.status(), tick = state.tick(), "Game over");
            responses.push(Response::GameOver {
                result: state.status(),
                ticks: state.tick(),
                stats: *state.stats(),
            });
        }
        responses
    }

    fn save(&mut self, slot: String) -> Result<Vec<Response>> {
        let snapshot = self.clock.capture();
        save_snapshot(self.store.as_mut(), &SlotId::new(slot.clone()), &snapshot)?;
        Ok(vec![Response::Saved {
            slot,
            tick: snapshot.tick(),
        }])
    }

    fn load(&mut self, slot: String) -> Result<Vec<Response>> {
        let player = self.clock.state().player().clone();
        let snapshot = load_snapshot(self.store.as_ref(), &player, &SlotId::new(slot.clone()))?;
        self.clock.restore(&snapshot)?;
        Ok(vec![self.restored(slot)])
    }

    fn undo(&mut self) -> Result<Vec<Response>> {
        self.clock.undo()?;
        Ok(vec![self.restored("undo".to_string())])
    }

    fn restored(&mut self, slot: String) -> Response {
        let state = self.clock.state();
        self.game_over_sent = state.status().is_finished();
        Response::Restored {
            slot,
            tick: state.tick(),
            status: state.status(),
        }
    }

    fn slots(&self) -> Result<Vec<Response>> {
        let slots = self.store.list(self.clock.state().player())?;
        Ok(vec![Response::Slots {
            slots: slots.into_iter().map(|s| s.0).collect(),
        }])
    }

    fn advise(&mut self, apply: bool) -> Result<Vec<Response>> {
        let Some(advisor) = self.advisor.as_mut() else {
            return Err(GameError::InvalidState("no advisor configured".into()));
        };
        let commands = advisor.advise(&AdvisorView::from_snapshot(&self.clock.capture()));
        if apply {
            for command in &commands {
                self.sender.send(CommandSource::Advisor, command.clone())?;
            }
        }
        Ok(vec![Response::Advice { commands, applied: apply }])
    }
}

fn write_response<W: Write>(output: &mut W, response: &Response) -> io::Result<()> {
    output.write_all(response.to_json_line().as_bytes())
}

// ============================================================================
// Unattended runs
// ============================================================================

/// Outcome of an unattended scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Scenario name.
    pub scenario: String,
    /// Final status.
    pub status: RunStatus,
    /// Final tick.
    pub ticks: u64,
    /// Boundaries processed.
    pub boundaries: u64,
    /// Base health left.
    pub base_health: u32,
    /// Currency left.
    pub balance: u32,
    /// Run totals.
    pub stats: RunStats,
    /// Commands the engine rejected.
    pub rejected: usize,
    /// Final state hash.
    pub final_hash: u64,
    /// Recording of the run, if requested.
    #[serde(skip)]
    pub replay: Option<Replay>,
}

/// Play a scenario: script steps and advisor suggestions are queued before
/// each boundary until the run ends or `max_boundaries` is reached.
pub fn run_scenario(scenario: &Scenario, record_replay: bool) -> std::result::Result<RunSummary, RunnerError> {
    let mut clock = scenario.build_clock(record_replay)?;
    let sender = clock.sender();
    let mut advisor = scenario
        .autoplay
        .clone()
        .map(|config| GreedyAdvisor::new(clock.ruleset().clone(), config));
    let advise_every = scenario.advise_every.max(1);
    let mut rejected = 0;

    tracing::info!(
        scenario = %scenario.name,
        max_boundaries = scenario.max_boundaries,
        "Scenario started"
    );

    for boundary in 0..scenario.max_boundaries {
        for step in scenario.steps_at(boundary) {
            sender.send(CommandSource::Script, step.command.clone())?;
        }
        if let Some(advisor) = advisor.as_mut() {
            if boundary % advise_every == 0 {
                let view = AdvisorView::from_snapshot(&clock.capture());
                for command in advisor.advise(&view) {
                    sender.send(CommandSource::Advisor, command)?;
                }
            }
        }

        let report = clock.tick()?;
        rejected += report.rejections().count();
        if report.status.is_finished() {
            break;
        }
    }

    let state = clock.state();
    let summary = RunSummary {
        scenario: scenario.name.clone(),
        status: state.status(),
        ticks: state.tick(),
        boundaries: clock.boundaries(),
        base_health: state.base_health(),
        balance: state.economy().balance(),
        stats: *state.stats(),
        rejected,
        final_hash: state.state_hash(),
        replay: clock.finish_replay(),
    };
    tracing::info!(
        scenario = %summary.scenario,
        status = ?summary.status,
        ticks = summary.ticks,
        kills = summary.stats.kills,
        hash = summary.final_hash,
        "Scenario finished"
    );
    Ok(summary)
}

/// Final hashes of repeated runs of one scenario.
#[derive(Debug, Clone, Serialize)]
pub struct DeterminismReport {
    /// Hash of each run, in order.
    pub hashes: Vec<u64>,
}

impl DeterminismReport {
    /// All runs ended in the same state.
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|pair| pair[0] == pair[1])
    }
}

/// Play a scenario `runs` times in parallel and collect the final hashes.
pub fn check_determinism(
    scenario: &Scenario,
    runs: usize,
) -> std::result::Result<DeterminismReport, RunnerError> {
    let hashes = (0..runs)
        .into_par_iter()
        .map(|_| run_scenario(scenario, false).map(|summary| summary.final_hash))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(DeterminismReport { hashes })
}

/// Re-run a recorded replay under the scenario's rules and ownership.
pub fn verify_replay(
    scenario: &Scenario,
    replay: &Replay,
) -> std::result::Result<bastion_core::replay::ReplayVerification, RunnerError> {
    let ruleset = std::sync::Arc::new(scenario.ruleset()?);
    Ok(replay.verify_with(ruleset, scenario.ownership())?)
}

/// Default advisor settings for interactive sessions without a scenario.
pub fn default_advisor(clock: &SimulationClock) -> GreedyAdvisor {
    GreedyAdvisor::new(clock.ruleset().clone(), GreedyConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_test_utils::fixtures::{corridor_map, tiny_ruleset};
    use std::io::Cursor;

    fn tiny_runner() -> HeadlessRunner {
        let clock = bastion_test_utils::fixtures::clock_with(tiny_ruleset(), &corridor_map(10));
        let advisor = default_advisor(&clock);
        HeadlessRunner::new(clock, Box::new(MemoryStore::new())).with_advisor(advisor)
    }

    fn session(runner: &mut HeadlessRunner, lines: &[&str]) -> Vec<Response> {
        let input = lines.join("\n");
        let mut output = Vec::new();
        runner.run(Cursor::new(input), &mut output).unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn state_of(runner: &mut HeadlessRunner) -> StateOutput {
        match runner.handle(Request::Query).remove(0) {
            Response::State(state) => state,
            other => panic!("expected state, got {other:?}"),
        }
    }

    #[test]
    fn test_session_place_tick_query() {
        let mut runner = tiny_runner();
        let responses = session(
            &mut runner,
            &[
                r#"{"cmd":"place","kind":"frost","x":2,"y":0}"#,
                r#"{"cmd":"tick"}"#,
                r#"{"cmd":"query"}"#,
                r#"{"cmd":"quit"}"#,
                r#"{"cmd":"hash"}"#,
            ],
        );

        assert_eq!(responses[0], Response::ready(0));
        assert_eq!(responses[1], Response::ack("place", Some(0)));
        let Response::Ticked { outcomes, tick, .. } = &responses[2] else {
            panic!("expected ticked, got {:?}", responses[2]);
        };
        // Idle runs apply commands without advancing.
        assert_eq!(*tick, 0);
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].ok);

        let Response::State(state) = &responses[3] else {
            panic!("expected state, got {:?}", responses[3]);
        };
        assert_eq!(state.balance, 70);
        assert_eq!(state.towers.len(), 1);
        assert_eq!(responses[4], Response::Bye);
        // Nothing after quit is processed.
        assert_eq!(responses.len(), 5);
    }

    #[test]
    fn test_malformed_line_keeps_session_alive() {
        let mut runner = tiny_runner();
        let responses = session(&mut runner, &["not json", "", r#"{"cmd":"hash"}"#]);
        assert!(matches!(responses[1], Response::Error { cmd: None, .. }));
        assert!(matches!(responses[2], Response::StateHash { tick: 0, .. }));
    }

    #[test]
    fn test_rejected_command_reported_in_tick() {
        let mut runner = tiny_runner();
        runner.handle(Request::Place {
            kind: TowerKind::Arrow,
            x: 3,
            y: 1,
            asset: None,
        });
        let responses = runner.handle(Request::Tick { count: 1 });
        let Response::Ticked { outcomes, .. } = &responses[0] else {
            panic!("expected ticked");
        };
        assert!(!outcomes[0].ok);
        assert_eq!(outcomes[0].kind, Some(ErrorKind::InvalidPlacement));
    }

    #[test]
    fn test_run_to_game_over_reports_once() {
        let mut runner = tiny_runner().with_config(HeadlessConfig {
            auto_state_output: true,
            ..HeadlessConfig::default()
        });
        runner.handle(Request::StartWave);
        let responses = runner.handle(Request::Tick { count: 500 });

        let Response::Ticked { status, .. } = &responses[0] else {
            panic!("expected ticked");
        };
        assert_eq!(*status, RunStatus::Won);
        assert!(matches!(responses[1], Response::State(_)));
        let Response::GameOver { result, stats, .. } = &responses[2] else {
            panic!("expected game over, got {:?}", responses[2]);
        };
        assert_eq!(*result, RunStatus::Won);
        assert_eq!(stats.escapes, 2);

        let again = runner.handle(Request::Tick { count: 5 });
        assert!(!again.iter().any(|r| matches!(r, Response::GameOver { .. })));
    }

    #[test]
    fn test_save_load_and_slots() {
        let mut runner = tiny_runner();
        runner.handle(Request::Place {
            kind: TowerKind::Frost,
            x: 2,
            y: 0,
            asset: None,
        });
        runner.handle(Request::Tick { count: 1 });
        let saved = runner.handle(Request::Save { slot: "early".into() });
        assert_eq!(
            saved,
            vec![Response::Saved {
                slot: "early".into(),
                tick: 0
            }]
        );

        runner.handle(Request::Place {
            kind: TowerKind::Frost,
            x: 4,
            y: 2,
            asset: None,
        });
        runner.handle(Request::Tick { count: 1 });
        assert_eq!(state_of(&mut runner).towers.len(), 2);

        let loaded = runner.handle(Request::Load { slot: "early".into() });
        assert!(matches!(&loaded[0], Response::Restored { slot, .. } if slot == "early"));
        let state = state_of(&mut runner);
        assert_eq!(state.towers.len(), 1);
        assert_eq!(state.balance, 70);

        assert_eq!(
            runner.handle(Request::Slots),
            vec![Response::Slots {
                slots: vec!["early".into()]
            }]
        );
        let missing = runner.handle(Request::Load { slot: "nope".into() });
        assert!(matches!(
            missing[0],
            Response::Error {
                kind: Some(ErrorKind::Data),
                ..
            }
        ));
    }

    #[test]
    fn test_undo_reverts_last_batch() {
        let mut runner = tiny_runner();
        runner.handle(Request::Place {
            kind: TowerKind::Frost,
            x: 2,
            y: 0,
            asset: None,
        });
        runner.handle(Request::Tick { count: 1 });
        let undone = runner.handle(Request::Undo);
        assert!(matches!(&undone[0], Response::Restored { slot, .. } if slot == "undo"));
        let state = state_of(&mut runner);
        assert!(state.towers.is_empty());
        assert_eq!(state.balance, 100);

        let nothing = runner.handle(Request::Undo);
        assert!(matches!(nothing[0], Response::Error { .. }));
    }

    #[test]
    fn test_advise_and_apply() {
        let mut runner = tiny_runner();
        let advice = runner.handle(Request::Advise { apply: true });
        let Response::Advice { commands, applied } = &advice[0] else {
            panic!("expected advice");
        };
        assert!(*applied);
        assert!(commands.contains(&Command::StartWave));

        let responses = runner.handle(Request::Tick { count: 1 });
        let Response::Ticked { outcomes, .. } = &responses[0] else {
            panic!("expected ticked");
        };
        assert_eq!(outcomes.len(), commands.len());
        assert!(outcomes.iter().all(|o| o.ok));

        let clock = bastion_test_utils::fixtures::tiny_clock();
        let mut bare = HeadlessRunner::new(clock, Box::new(MemoryStore::new()));
        assert!(matches!(
            bare.handle(Request::Advise { apply: false })[0],
            Response::Error { .. }
        ));
    }

    fn tiny_scenario(dir: &tempfile::TempDir) -> Scenario {
        std::fs::write(
            dir.path().join("tiny.ron"),
            bastion_test_utils::fixtures::TINY_RULESET,
        )
        .unwrap();
        Scenario {
            name: "tiny".into(),
            ruleset_file: Some("tiny.ron".into()),
            map: Some(corridor_map(10)),
            max_boundaries: 400,
            advise_every: 5,
            base_dir: dir.path().to_path_buf(),
            ..Scenario::standard()
        }
    }

    #[test]
    fn test_scenario_runs_reproducibly() {
        let dir = tempfile::tempdir().unwrap();
        let scenario = tiny_scenario(&dir);
        assert_eq!(scenario.ruleset().unwrap(), tiny_ruleset());
        let first = run_scenario(&scenario, true).unwrap();
        let second = run_scenario(&scenario, false).unwrap();
        assert_eq!(first.final_hash, second.final_hash);
        assert_eq!(first.ticks, second.ticks);
        assert!(first.status.is_finished());

        let replay = first.replay.unwrap();
        let verification = verify_replay(&scenario, &replay).unwrap();
        assert!(verification.is_match());

        assert!(check_determinism(&scenario, 3).unwrap().is_deterministic());
    }
}

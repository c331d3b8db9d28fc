//! The tick driver.
//!
//! [`SimulationClock`] exclusively owns the [`GameState`]. Each call to
//! [`tick`](SimulationClock::tick) processes one boundary:
//!
//! 1. Drain the inbox and apply every queued command in arrival order.
//! 2. Spawn due enemies, then move enemies (escapes damage the base).
//! 3. Combat: projectiles, then towers.
//! 4. Status effects.
//! 5. Wave clear, victory and defeat checks.
//! 6. Increment the tick counter.
//!
//! Steps 2 to 6 run only while the run is [`RunStatus::Running`]. After the
//! boundary the invariants are checked and a fresh [`GameSnapshot`] is
//! published to every subscriber.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use bastion_core::prelude::*;
//!
//! let mut clock = SimulationClock::new(
//!     Arc::new(Ruleset::standard()),
//!     &MapDef::standard(),
//!     ClockConfig::default(),
//! )
//! .unwrap();
//!
//! let sender = clock.sender();
//! sender.send(CommandSource::Player, Command::StartWave).unwrap();
//! let report = clock.tick().unwrap();
//! assert!(report.advanced);
//! assert_eq!(clock.state().tick(), 1);
//! ```

use std::sync::Arc;

use tokio::sync::watch;

use crate::combat;
use crate::commands::{
    self, Command, CommandEnvelope, CommandInbox, CommandOutcome, CommandSender, CommandSource,
    CommandTicket,
};
use crate::entities::PlayerId;
use crate::error::{GameError, Result};
use crate::events::{TickEvents, TickReport};
use crate::map::{GameMap, MapDef};
use crate::movement;
use crate::ownership::{AssetOwnership, NoAssets};
use crate::replay::Replay;
use crate::ruleset::Ruleset;
use crate::snapshot::{GameSnapshot, UndoBuffer};
use crate::state::{GameState, RunStatus};
use crate::waves;

/// Default number of undo checkpoints kept.
pub const DEFAULT_UNDO_DEPTH: usize = 16;

/// Clock settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockConfig {
    /// Player owning the run.
    pub player: PlayerId,
    /// Undo checkpoints kept; 0 disables undo.
    pub undo_depth: usize,
    /// Record every applied command into a [`Replay`].
    pub record_replay: bool,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            player: PlayerId::new("local"),
            undo_depth: DEFAULT_UNDO_DEPTH,
            record_replay: false,
        }
    }
}

/// Owner of the game state and driver of ticks.
pub struct SimulationClock {
    ruleset: Arc<Ruleset>,
    state: GameState,
    oracle: Box<dyn AssetOwnership>,
    sender: CommandSender,
    inbox: CommandInbox,
    feed: watch::Sender<GameSnapshot>,
    undo: UndoBuffer,
    replay: Option<Replay>,
    boundaries: u64,
}

impl std::fmt::Debug for SimulationClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationClock")
            .field("tick", &self.state.tick())
            .field("status", &self.state.status())
            .field("boundaries", &self.boundaries)
            .field("undo_depth", &self.undo.len())
            .field("recording", &self.replay.is_some())
            .finish_non_exhaustive()
    }
}

impl SimulationClock {
    /// Start a fresh run.
    ///
    /// # Errors
    ///
    /// `RulesetParse` for an inconsistent ruleset, `InvalidMap` if the map
    /// is malformed or has no spawn-to-base path.
    pub fn new(ruleset: Arc<Ruleset>, map: &MapDef, config: ClockConfig) -> Result<Self> {
        ruleset.validate()?;
        let map = GameMap::parse(map)?;
        let state = GameState::new(config.player.clone(), &ruleset, Arc::new(map));
        tracing::info!(
            ruleset = %ruleset.name,
            map = %state.map().name(),
            player = %state.player(),
            "Simulation clock created"
        );
        Self::with_state(ruleset, state, &config)
    }

    /// Resume a run from a snapshot.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the snapshot was taken under a different ruleset.
    pub fn from_snapshot(
        ruleset: Arc<Ruleset>,
        snapshot: GameSnapshot,
        config: ClockConfig,
    ) -> Result<Self> {
        check_fingerprint(&ruleset, &snapshot)?;
        let state = snapshot.state().clone();
        Self::with_state(ruleset, state, &config)
    }

    fn with_state(ruleset: Arc<Ruleset>, state: GameState, config: &ClockConfig) -> Result<Self> {
        let (sender, inbox) = commands::channel();
        let snapshot = GameSnapshot::new(state.clone());
        let replay = if config.record_replay {
            Some(Replay::new(&snapshot)?)
        } else {
            None
        };
        let (feed, _) = watch::channel(snapshot);
        Ok(Self {
            ruleset,
            state,
            oracle: Box::new(NoAssets),
            sender,
            inbox,
            feed,
            undo: UndoBuffer::new(config.undo_depth),
            replay,
            boundaries: 0,
        })
    }

    /// Replace the asset ownership provider.
    #[must_use]
    pub fn with_oracle(mut self, oracle: impl AssetOwnership + 'static) -> Self {
        self.oracle = Box::new(oracle);
        self
    }

    /// A new handle for submitting commands.
    #[must_use]
    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    /// Queue a player command.
    ///
    /// # Errors
    ///
    /// Never fails while the clock is alive; see [`CommandSender::submit`].
    pub fn submit(&self, command: Command) -> Result<CommandTicket> {
        self.sender.submit(CommandSource::Player, command)
    }

    /// Receive a snapshot after every boundary.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<GameSnapshot> {
        self.feed.subscribe()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &GameState {
        &self.state
    }

    /// Rules of this run.
    #[must_use]
    pub fn ruleset(&self) -> &Arc<Ruleset> {
        &self.ruleset
    }

    /// Boundaries processed since creation or the last restore.
    #[must_use]
    pub const fn boundaries(&self) -> u64 {
        self.boundaries
    }

    /// Undo checkpoints available.
    #[must_use]
    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    /// Immutable copy of the current state.
    #[must_use]
    pub fn capture(&self) -> GameSnapshot {
        GameSnapshot::new(self.state.clone())
    }

    /// Replace the state with a snapshot.
    ///
    /// A snapshot captured while running is restored paused, so the run only
    /// continues after an explicit resume. Entity ids handed out afterwards
    /// stay above every id either state has used. Restoring restarts replay
    /// recording from the restored state.
    ///
    /// # Errors
    ///
    /// `InvalidState` while the run is `Running` or if the snapshot comes
    /// from a different ruleset.
    pub fn restore(&mut self, snapshot: &GameSnapshot) -> Result<()> {
        if self.state.status() == RunStatus::Running {
            return Err(GameError::InvalidState(
                "cannot restore while running; pause first".into(),
            ));
        }
        check_fingerprint(&self.ruleset, snapshot)?;

        let mut state = snapshot.state().clone();
        state.next_id = state.next_id.max(self.state.next_id);
        if state.status == RunStatus::Running {
            state.status = RunStatus::Paused;
            state.paused_from = Some(RunStatus::Running);
        }
        self.state = state;

        if self.replay.is_some() {
            self.replay = Some(Replay::new(&self.capture())?);
            self.boundaries = 0;
        }
        tracing::info!(tick = self.state.tick(), status = ?self.state.status(), "State restored");
        self.publish();
        Ok(())
    }

    /// Restore the most recent undo checkpoint.
    ///
    /// # Errors
    ///
    /// `InvalidState` while running or when no checkpoint exists.
    pub fn undo(&mut self) -> Result<()> {
        if self.state.status() == RunStatus::Running {
            return Err(GameError::InvalidState(
                "cannot undo while running; pause first".into(),
            ));
        }
        let snapshot = self
            .undo
            .pop()
            .ok_or_else(|| GameError::InvalidState("nothing to undo".into()))?;
        self.restore(&snapshot)
    }

    /// The recording so far, finalized at the current boundary.
    #[must_use]
    pub fn finish_replay(&self) -> Option<Replay> {
        let mut replay = self.replay.clone()?;
        replay.finalize(self.boundaries, self.state.tick(), self.state.state_hash());
        Some(replay)
    }

    /// Process one tick boundary.
    ///
    /// # Errors
    ///
    /// `InvariantViolation` if the resulting state is inconsistent. The run
    /// is then `Aborted` and the last published snapshot stays current.
    pub fn tick(&mut self) -> Result<TickReport> {
        let boundary = self.boundaries;
        self.boundaries += 1;
        let mut out = TickEvents::default();

        let batch = self.inbox.drain();
        if batch.iter().any(|q| is_gameplay(&q.envelope.command)) {
            let checkpoint = self.capture();
            self.undo.push(checkpoint);
        }

        let mut outcomes = Vec::with_capacity(batch.len());
        for queued in batch {
            let CommandEnvelope {
                seq,
                source,
                command,
            } = queued.envelope;
            let result = commands::apply_command(
                &mut self.state,
                &self.ruleset,
                self.oracle.as_ref(),
                &command,
                &mut out,
            );
            if let Err(err) = &result {
                tracing::warn!(seq, ?source, ?command, error = %err, "Command rejected");
            }
            if let Some(replay) = &mut self.replay {
                replay.record(boundary, source, command.clone());
            }
            if let Some(reply) = queued.reply {
                // The producer may have dropped its ticket.
                let _ = reply.send(result.clone());
            }
            outcomes.push(CommandOutcome {
                seq,
                source,
                command,
                result,
            });
        }

        let advanced = self.state.status() == RunStatus::Running;
        let checked = if advanced {
            self.advance(&mut out).and_then(|()| self.state.check_invariants())
        } else {
            self.state.check_invariants()
        };
        if let Err(err) = checked {
            return Err(self.abort(err));
        }

        tracing::debug!(
            tick = self.state.tick(),
            hash = self.state.state_hash(),
            enemies = self.state.enemies().len(),
            "Tick boundary complete"
        );
        self.publish();

        Ok(TickReport {
            tick: self.state.tick(),
            advanced,
            status: self.state.status(),
            outcomes,
            events: out.events,
            economy: out.economy,
        })
    }

    /// Process `count` boundaries, stopping early once the run is over.
    ///
    /// # Errors
    ///
    /// Propagates the first [`tick`](Self::tick) error.
    pub fn run_ticks(&mut self, count: u64) -> Result<Vec<TickReport>> {
        let mut reports = Vec::new();
        for _ in 0..count {
            reports.push(self.tick()?);
            if self.state.status().is_finished() {
                break;
            }
        }
        Ok(reports)
    }

    fn advance(&mut self, out: &mut TickEvents) -> Result<()> {
        let state = &mut self.state;
        waves::spawn_system(state, &self.ruleset, out)?;
        movement::movement_system(state, out);
        combat::projectile_system(state, out);
        combat::tower_system(state, &self.ruleset, out)?;
        combat::status_system(state, out);
        waves::outcome_system(state, &self.ruleset, out);
        state.tick += 1;
        Ok(())
    }

    fn abort(&mut self, err: GameError) -> GameError {
        let detail = match err {
            GameError::InvariantViolation(detail) => detail,
            other => other.to_string(),
        };
        tracing::error!(tick = self.state.tick(), %detail, "Invariant violated; run aborted");
        self.state.set_status(RunStatus::Aborted, &mut TickEvents::default());
        GameError::InvariantViolation(detail)
    }

    fn publish(&self) {
        self.feed.send_replace(self.capture());
    }
}

fn is_gameplay(command: &Command) -> bool {
    !matches!(command, Command::Pause | Command::Resume)
}

fn check_fingerprint(ruleset: &Ruleset, snapshot: &GameSnapshot) -> Result<()> {
    if snapshot.state().ruleset_fingerprint() != ruleset.fingerprint() {
        return Err(GameError::InvalidState(
            "snapshot was taken under a different ruleset".into(),
        ));
    }
    Ok(())
}

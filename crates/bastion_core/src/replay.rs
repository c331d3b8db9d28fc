//! Replay recording and verification.
//!
//! A replay stores the encoded starting snapshot and every command drained
//! by the clock, tagged with the boundary it was applied at. Boundaries
//! (calls to [`SimulationClock::tick`](crate::clock::SimulationClock::tick))
//! are used instead of tick numbers because commands are also applied while
//! paused, when the tick counter does not move.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::{ClockConfig, SimulationClock};
use crate::commands::{Command, CommandSource};
use crate::error::{GameError, Result};
use crate::ownership::{AssetOwnership, NoAssets};
use crate::ruleset::Ruleset;
use crate::snapshot::GameSnapshot;

/// Replay format version.
pub const REPLAY_VERSION: u32 = 1;

/// A single recorded command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayCommand {
    /// Boundary index (0-based, relative to recording start).
    pub boundary: u64,
    /// Producer.
    pub source: CommandSource,
    /// The command.
    pub command: Command,
}

/// Complete replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replay {
    /// Format version.
    pub version: u32,
    /// Fingerprint of the ruleset the replay was recorded under.
    pub ruleset_fingerprint: u64,
    /// Encoded starting snapshot.
    pub initial_state: Vec<u8>,
    /// Commands in application order.
    pub commands: Vec<ReplayCommand>,
    /// Boundaries processed while recording.
    pub boundaries: u64,
    /// Tick counter at the end.
    pub final_tick: u64,
    /// State hash at the end.
    pub final_hash: u64,
}

/// Result of replaying a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayVerification {
    /// Hash the recording ended with.
    pub expected_hash: u64,
    /// Hash the re-run ended with.
    pub actual_hash: u64,
    /// Tick the re-run ended on.
    pub final_tick: u64,
}

impl ReplayVerification {
    /// The re-run matched the recording.
    #[must_use]
    pub const fn is_match(&self) -> bool {
        self.expected_hash == self.actual_hash
    }
}

impl Replay {
    /// Start a recording from a snapshot.
    ///
    /// # Errors
    ///
    /// `Serialization` if the snapshot cannot be encoded.
    pub fn new(initial: &GameSnapshot) -> Result<Self> {
        Ok(Self {
            version: REPLAY_VERSION,
            ruleset_fingerprint: initial.state().ruleset_fingerprint(),
            initial_state: initial.encode()?,
            commands: Vec::new(),
            boundaries: 0,
            final_tick: initial.tick(),
            final_hash: initial.state_hash(),
        })
    }

    /// Append a command applied at `boundary`.
    pub fn record(&mut self, boundary: u64, source: CommandSource, command: Command) {
        self.commands.push(ReplayCommand {
            boundary,
            source,
            command,
        });
    }

    /// Record the end state.
    pub fn finalize(&mut self, boundaries: u64, final_tick: u64, final_hash: u64) {
        self.boundaries = boundaries;
        self.final_tick = final_tick;
        self.final_hash = final_hash;
    }

    /// Decode the starting snapshot.
    ///
    /// # Errors
    ///
    /// `Serialization` on malformed data.
    pub fn initial_snapshot(&self) -> Result<GameSnapshot> {
        GameSnapshot::decode(&self.initial_state)
    }

    /// Commands applied at a boundary.
    #[must_use]
    pub fn commands_at(&self, boundary: u64) -> Vec<&ReplayCommand> {
        self.commands
            .iter()
            .filter(|cmd| cmd.boundary == boundary)
            .collect()
    }

    /// Re-run the recording and compare final hashes.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the ruleset does not match, plus any error the
    /// re-run raises.
    pub fn verify(&self, ruleset: Arc<Ruleset>) -> Result<ReplayVerification> {
        self.verify_with(ruleset, NoAssets)
    }

    /// Re-run the recording with the ownership provider the run used.
    ///
    /// # Errors
    ///
    /// As [`verify`](Self::verify).
    pub fn verify_with(
        &self,
        ruleset: Arc<Ruleset>,
        oracle: impl AssetOwnership + 'static,
    ) -> Result<ReplayVerification> {
        if ruleset.fingerprint() != self.ruleset_fingerprint {
            return Err(GameError::InvalidState(
                "replay was recorded under a different ruleset".into(),
            ));
        }

        let initial = self.initial_snapshot()?;
        let config = ClockConfig {
            player: initial.player().clone(),
            undo_depth: 0,
            record_replay: false,
        };
        let mut clock =
            SimulationClock::from_snapshot(ruleset, initial, config)?.with_oracle(oracle);

        let mut pending = self.commands.iter().peekable();
        for boundary in 0..self.boundaries {
            while let Some(cmd) = pending.next_if(|cmd| cmd.boundary == boundary) {
                clock.sender().send(cmd.source, cmd.command.clone())?;
            }
            clock.tick()?;
        }

        let verification = ReplayVerification {
            expected_hash: self.final_hash,
            actual_hash: clock.state().state_hash(),
            final_tick: clock.state().tick(),
        };
        if verification.is_match() {
            tracing::info!(final_tick = verification.final_tick, "Replay verified");
        } else {
            tracing::warn!(
                expected = verification.expected_hash,
                actual = verification.actual_hash,
                "Replay diverged"
            );
        }
        Ok(verification)
    }

    /// Encode with bincode.
    ///
    /// # Errors
    ///
    /// `Serialization` if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::Serialization(format!("Failed to serialize replay: {e}")))
    }

    /// Decode bytes produced by [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    ///
    /// `Serialization` on malformed data or a version mismatch.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let replay: Self = bincode::deserialize(bytes)
            .map_err(|e| GameError::Serialization(format!("Failed to deserialize replay: {e}")))?;
        if replay.version != REPLAY_VERSION {
            return Err(GameError::Serialization(format!(
                "Replay version mismatch: expected {REPLAY_VERSION}, got {}",
                replay.version
            )));
        }
        Ok(replay)
    }
}

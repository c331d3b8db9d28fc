//! JSON protocol for headless game communication.
//!
//! The headless runner communicates via JSON lines (one JSON object per line):
//!
//! **Input (stdin):** Requests from the controller
//! **Output (stdout):** Responses and state updates
//!
//! # Protocol Flow
//!
//! 1. Runner starts, outputs `{"type":"ready","version":"1.0","tick":0}`
//! 2. Controller sends requests as JSON lines
//! 3. Gameplay requests are queued and acknowledged with their sequence
//!    number; their results arrive with the next `tick`
//! 4. When the run ends, the runner outputs `{"type":"game_over",...}`
//!
//! # Example Session
//!
//! ```text
//! <- {"type":"ready","version":"1.0","tick":0}
//! -> {"cmd":"place","kind":"arrow","x":2,"y":1}
//! <- {"type":"ack","cmd":"place","seq":0}
//! -> {"cmd":"start_wave"}
//! <- {"type":"ack","cmd":"start_wave","seq":1}
//! -> {"cmd":"tick","count":60}
//! <- {"type":"ticked","tick":60,"status":"running","outcomes":[...],"kills":0}
//! -> {"cmd":"query"}
//! <- {"type":"state","tick":60,...}
//! ```

use bastion_core::advisor::TowerSummary;
use bastion_core::prelude::*;
use std::result::Result;
use bastion_core::state::RunStats;
use serde::{Deserialize, Serialize};

/// Protocol version reported in the ready message.
pub const PROTOCOL_VERSION: &str = "1.0";

// ============================================================================
// Input Requests (Controller -> Runner)
// ============================================================================

/// Requests that can be sent to the headless runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Request {
    /// Queue a tower placement.
    Place {
        /// Tower kind.
        kind: TowerKind,
        /// Column.
        x: u32,
        /// Row.
        y: u32,
        /// Asset to bind.
        #[serde(default)]
        asset: Option<String>,
    },
    /// Queue a sale.
    Sell {
        /// Tower id.
        tower: EntityId,
    },
    /// Queue an upgrade.
    Upgrade {
        /// Tower id.
        tower: EntityId,
    },
    /// Queue the next wave.
    StartWave,
    /// Queue a pause.
    Pause,
    /// Queue a resume.
    Resume,

    /// Process N tick boundaries (default: 1).
    Tick {
        /// Boundaries to process.
        #[serde(default = "default_tick_count")]
        count: u32,
    },

    /// Query current game state without advancing time.
    Query,

    /// Save the current state into a slot.
    Save {
        /// Slot name.
        slot: String,
    },

    /// Restore a saved slot.
    Load {
        /// Slot name.
        slot: String,
    },

    /// List saved slots.
    Slots,

    /// Restore the latest undo checkpoint.
    Undo,

    /// Report the current state hash.
    Hash,

    /// Ask the configured advisor for suggestions.
    Advise {
        /// Queue the suggestions as advisor commands.
        #[serde(default)]
        apply: bool,
    },

    /// Quit the session.
    Quit,
}

fn default_tick_count() -> u32 {
    1
}

// ============================================================================
// Output Responses (Runner -> Controller)
// ============================================================================

/// Responses sent from the headless runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Runner is ready to accept requests.
    Ready {
        /// Protocol version.
        version: String,
        /// Current tick.
        tick: u64,
    },

    /// A gameplay command was queued.
    Ack {
        /// Request name.
        cmd: String,
        /// Sequence number of the queued command.
        #[serde(skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },

    /// A request failed.
    Error {
        /// Human-readable message.
        message: String,
        /// Coarse classification, when the error came from the game.
        #[serde(skip_serializing_if = "Option::is_none")]
        kind: Option<ErrorKind>,
        /// Request name, if the line parsed.
        #[serde(skip_serializing_if = "Option::is_none")]
        cmd: Option<String>,
    },

    /// Boundaries were processed.
    Ticked {
        /// Tick counter afterwards.
        tick: u64,
        /// Run status afterwards.
        status: RunStatus,
        /// Results of every command applied during these boundaries.
        outcomes: Vec<OutcomeOutput>,
        /// Enemies killed during these boundaries.
        kills: usize,
    },

    /// Current game state.
    State(StateOutput),

    /// State hash for determinism verification.
    StateHash {
        /// Tick counter.
        tick: u64,
        /// Hash.
        hash: u64,
    },

    /// Snapshot written to a slot.
    Saved {
        /// Slot name.
        slot: String,
        /// Tick the snapshot was taken at.
        tick: u64,
    },

    /// Snapshot restored.
    Restored {
        /// Slot name, or `undo`.
        slot: String,
        /// Tick after restoring.
        tick: u64,
        /// Status after restoring.
        status: RunStatus,
    },

    /// Saved slots for the session player.
    Slots {
        /// Slot names, sorted.
        slots: Vec<String>,
    },

    /// Advisor suggestions.
    Advice {
        /// Suggested commands.
        commands: Vec<Command>,
        /// Whether they were queued.
        applied: bool,
    },

    /// The run has ended.
    GameOver {
        /// Final status.
        result: RunStatus,
        /// Final tick.
        ticks: u64,
        /// Run totals.
        stats: RunStats,
    },

    /// Goodbye message before shutdown.
    Bye,
}

// ============================================================================
// State Types
// ============================================================================

/// Result of one applied command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeOutput {
    /// Sequence number from the ack.
    pub seq: u64,
    /// Whether the command applied.
    pub ok: bool,
    /// Effect on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<CommandEffect>,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error classification on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl From<&CommandOutcome> for OutcomeOutput {
    fn from(outcome: &CommandOutcome) -> Self {
        match &outcome.result {
            Ok(effect) => Self {
                seq: outcome.seq,
                ok: true,
                effect: Some(*effect),
                error: None,
                kind: None,
            },
            Err(err) => Self {
                seq: outcome.seq,
                ok: false,
                effect: None,
                error: Some(err.to_string()),
                kind: Some(err.kind()),
            },
        }
    }
}

/// An enemy on the map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnemyOutput {
    /// Entity id.
    pub id: EntityId,
    /// Kind.
    pub kind: EnemyKind,
    /// Current health.
    pub health: u32,
    /// Maximum health.
    pub max_health: u32,
    /// Path cell index.
    pub path_index: u32,
    /// Wave that spawned it.
    pub wave: u32,
}

/// Full state dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateOutput {
    /// Tick counter.
    pub tick: u64,
    /// Run status.
    pub status: RunStatus,
    /// Currency.
    pub balance: u32,
    /// Base health.
    pub base_health: u32,
    /// Last started wave.
    pub wave: u32,
    /// Wave phase.
    pub wave_phase: WavePhase,
    /// Towers in id order.
    pub towers: Vec<TowerSummary>,
    /// Enemies in id order.
    pub enemies: Vec<EnemyOutput>,
    /// Projectiles in flight.
    pub projectiles: usize,
    /// State hash.
    pub hash: u64,
}

impl StateOutput {
    /// Build from a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: &GameSnapshot) -> Self {
        let state = snapshot.state();
        Self {
            tick: state.tick(),
            status: state.status(),
            balance: state.economy().balance(),
            base_health: state.base_health(),
            wave: state.waves().current_wave(),
            wave_phase: state.waves().phase(),
            towers: state
                .towers()
                .sorted()
                .into_iter()
                .map(|t| TowerSummary {
                    id: t.id,
                    kind: t.kind,
                    position: t.position,
                    level: t.level,
                    has_asset: t.asset.is_some(),
                })
                .collect(),
            enemies: state
                .enemies()
                .sorted()
                .into_iter()
                .map(|e| EnemyOutput {
                    id: e.id,
                    kind: e.kind,
                    health: e.health.current,
                    max_health: e.health.max,
                    path_index: e.progress.index,
                    wave: e.wave,
                })
                .collect(),
            projectiles: state.projectiles().len(),
            hash: state.state_hash(),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

impl Response {
    /// Create a ready response.
    pub fn ready(tick: u64) -> Self {
        Self::Ready {
            version: PROTOCOL_VERSION.to_string(),
            tick,
        }
    }

    /// Create an acknowledgment.
    pub fn ack(cmd: &str, seq: Option<u64>) -> Self {
        Self::Ack {
            cmd: cmd.to_string(),
            seq,
        }
    }

    /// Create an error response.
    pub fn error(message: impl Into<String>, cmd: Option<&str>) -> Self {
        Self::Error {
            message: message.into(),
            kind: None,
            cmd: cmd.map(String::from),
        }
    }

    /// Create an error response from a game error.
    pub fn game_error(err: &GameError, cmd: &str) -> Self {
        Self::Error {
            message: err.to_string(),
            kind: Some(err.kind()),
            cmd: Some(cmd.to_string()),
        }
    }

    /// Serialize to JSON line (with newline).
    pub fn to_json_line(&self) -> String {
        let mut json = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","message":"Serialization failed: {e}"}}"#)
        });
        json.push('\n');
        json
    }
}

impl Request {
    /// Parse from a JSON line.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Get request name for acknowledgment.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Place { .. } => "place",
            Self::Sell { .. } => "sell",
            Self::Upgrade { .. } => "upgrade",
            Self::StartWave => "start_wave",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Tick { .. } => "tick",
            Self::Query => "query",
            Self::Save { .. } => "save",
            Self::Load { .. } => "load",
            Self::Slots => "slots",
            Self::Undo => "undo",
            Self::Hash => "hash",
            Self::Advise { .. } => "advise",
            Self::Quit => "quit",
        }
    }

    /// The game command this request queues, if it is a gameplay request.
    pub fn to_command(&self) -> Option<Command> {
        let command = match self {
            Self::Place { kind, x, y, asset } => Command::PlaceTower {
                kind: *kind,
                position: GridPos::new(*x, *y),
                asset: asset.clone().map(AssetId::new),
            },
            Self::Sell { tower } => Command::SellTower { tower: *tower },
            Self::Upgrade { tower } => Command::UpgradeTower { tower: *tower },
            Self::StartWave => Command::StartWave,
            Self::Pause => Command::Pause,
            Self::Resume => Command::Resume,
            _ => return None,
        };
        Some(command)
    }
}

//! Commands and the ordered inbox that carries them to the clock.
//!
//! Any number of producers (UI input, wave timers, advisors, scripts) hold a
//! cloned [`CommandSender`]. Sends never block and never touch game state:
//! envelopes are appended to a single unbounded channel and drained by the
//! [`SimulationClock`](crate::clock::SimulationClock) at the next tick
//! boundary, in arrival order. Each submission can return a
//! [`CommandTicket`] that later yields the command's result.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::economy::LedgerReason;
use crate::entities::{AssetId, EntityId, GridPos, Tower, TowerKind};
use crate::error::{GameError, OwnershipFailure, PlacementError, Result};
use crate::events::{GameEvent, TickEvents};
use crate::ownership::AssetOwnership;
use crate::ruleset::Ruleset;
use crate::state::{GameState, RunStatus};
use crate::waves;

/// A request to change the game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Build a tower, optionally bound to an owned asset.
    PlaceTower {
        /// Tower kind.
        kind: TowerKind,
        /// Target cell.
        position: GridPos,
        /// Asset to bind.
        asset: Option<AssetId>,
    },
    /// Sell a tower for a partial refund.
    SellTower {
        /// Tower to remove.
        tower: EntityId,
    },
    /// Raise a tower's level by one.
    UpgradeTower {
        /// Tower to upgrade.
        tower: EntityId,
    },
    /// Begin the next wave.
    StartWave,
    /// Freeze ticks.
    Pause,
    /// Unfreeze ticks.
    Resume,
}

/// Who submitted a command. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandSource {
    /// Direct player input.
    Player,
    /// Timed automation, e.g. auto-start of waves.
    Timer,
    /// AI recommendation accepted by the player.
    Advisor,
    /// Scripted scenario or replay.
    Script,
}

/// What a successfully applied command did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandEffect {
    /// New tower id.
    TowerPlaced {
        /// Allocated id.
        tower: EntityId,
    },
    /// Tower removed.
    TowerSold {
        /// Currency returned.
        refund: u32,
    },
    /// Tower upgraded.
    TowerUpgraded {
        /// New level.
        level: u32,
    },
    /// Wave started.
    WaveStarted {
        /// Wave number, 1-based.
        wave: u32,
    },
    /// Run paused.
    Paused,
    /// Run resumed.
    Resumed,
    /// Already in the requested state.
    Unchanged,
}

/// Result of applying one command.
pub type CommandResult = std::result::Result<CommandEffect, GameError>;

/// A command tagged with its arrival order and producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Arrival sequence number, unique per clock.
    pub seq: u64,
    /// Producer.
    pub source: CommandSource,
    /// The command.
    pub command: Command,
}

/// Per-command report in a [`TickReport`](crate::events::TickReport).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    /// Arrival sequence number.
    pub seq: u64,
    /// Producer.
    pub source: CommandSource,
    /// The command.
    pub command: Command,
    /// What happened.
    pub result: CommandResult,
}

#[derive(Debug)]
pub(crate) struct Queued {
    pub(crate) envelope: CommandEnvelope,
    pub(crate) reply: Option<oneshot::Sender<CommandResult>>,
}

/// Cloneable handle for submitting commands from any thread or task.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<Queued>,
    /// Next sequence number, locked across the send so inbox order is seq order.
    seq: Arc<Mutex<u64>>,
}

impl CommandSender {
    fn enqueue(
        &self,
        source: CommandSource,
        command: Command,
        reply: Option<oneshot::Sender<CommandResult>>,
    ) -> Result<u64> {
        let mut next = self.seq.lock().unwrap_or_else(PoisonError::into_inner);
        let seq = *next;
        let envelope = CommandEnvelope {
            seq,
            source,
            command,
        };
        self.tx
            .send(Queued { envelope, reply })
            .map_err(|_| GameError::InvalidState("simulation clock has shut down".into()))?;
        *next += 1;
        Ok(seq)
    }

    /// Queue a command and get a ticket for its result.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the clock has been dropped.
    pub fn submit(&self, source: CommandSource, command: Command) -> Result<CommandTicket> {
        let (reply, rx) = oneshot::channel();
        let seq = self.enqueue(source, command, Some(reply))?;
        Ok(CommandTicket { seq, rx })
    }

    /// Queue a command without waiting for its result. Returns the sequence
    /// number; the outcome still appears in the tick report.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the clock has been dropped.
    pub fn send(&self, source: CommandSource, command: Command) -> Result<u64> {
        self.enqueue(source, command, None)
    }
}

/// Receipt for a submitted command.
#[derive(Debug)]
pub struct CommandTicket {
    seq: u64,
    rx: oneshot::Receiver<CommandResult>,
}

fn clock_gone() -> GameError {
    GameError::InvalidState("simulation clock dropped the command".into())
}

impl CommandTicket {
    /// Arrival sequence number.
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }

    /// The result if the command has been applied already.
    pub fn try_outcome(&mut self) -> Option<CommandResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(clock_gone())),
        }
    }

    /// Wait for the result from an async task.
    pub async fn outcome(self) -> CommandResult {
        self.rx.await.unwrap_or_else(|_| Err(clock_gone()))
    }

    /// Block the current thread until the result arrives.
    ///
    /// Must not be called from inside an async runtime.
    pub fn blocking_outcome(self) -> CommandResult {
        self.rx.blocking_recv().unwrap_or_else(|_| Err(clock_gone()))
    }
}

/// Receiving end owned by the clock.
#[derive(Debug)]
pub(crate) struct CommandInbox {
    rx: mpsc::UnboundedReceiver<Queued>,
}

impl CommandInbox {
    /// Take everything queued so far, in arrival order.
    pub(crate) fn drain(&mut self) -> Vec<Queued> {
        let mut batch = Vec::new();
        while let Ok(queued) = self.rx.try_recv() {
            batch.push(queued);
        }
        batch
    }
}

pub(crate) fn channel() -> (CommandSender, CommandInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        CommandSender {
            tx,
            seq: Arc::new(Mutex::new(0)),
        },
        CommandInbox { rx },
    )
}

/// Apply one command to the state.
pub(crate) fn apply_command(
    state: &mut GameState,
    ruleset: &Ruleset,
    oracle: &dyn AssetOwnership,
    command: &Command,
    out: &mut TickEvents,
) -> CommandResult {
    match command {
        Command::PlaceTower {
            kind,
            position,
            asset,
        } => place_tower(state, ruleset, oracle, (*kind, *position), asset.as_ref(), out),
        Command::SellTower { tower } => sell_tower(state, ruleset, oracle, *tower, out),
        Command::UpgradeTower { tower } => upgrade_tower(state, ruleset, *tower, out),
        Command::StartWave => {
            waves::start_wave(state, ruleset, out).map(|wave| CommandEffect::WaveStarted { wave })
        }
        Command::Pause => pause(state, out),
        Command::Resume => resume(state, out),
    }
}

fn ensure_playable(state: &GameState) -> Result<()> {
    if state.status.is_finished() {
        return Err(GameError::InvalidState(format!(
            "run is {:?}",
            state.status
        )));
    }
    Ok(())
}

fn verify_ownership(state: &GameState, oracle: &dyn AssetOwnership, asset: &AssetId) -> Result<()> {
    let reason = match oracle.is_owned(&state.player, asset) {
        Ok(true) => return Ok(()),
        Ok(false) => OwnershipFailure::NotOwned,
        Err(err) => {
            tracing::warn!(asset = %asset, error = %err, "Ownership check failed");
            OwnershipFailure::Unreachable
        }
    };
    Err(GameError::OwnershipUnverified {
        asset: asset.clone(),
        reason,
    })
}

fn place_tower(
    state: &mut GameState,
    ruleset: &Ruleset,
    oracle: &dyn AssetOwnership,
    (kind, position): (TowerKind, GridPos),
    asset: Option<&AssetId>,
    out: &mut TickEvents,
) -> CommandResult {
    ensure_playable(state)?;
    state.check_placement(ruleset, position, kind)?;
    if let Some(asset) = asset {
        if state.tower_with_asset(asset).is_some() {
            return Err(GameError::InvalidPlacement {
                position,
                reason: PlacementError::AssetInUse,
            });
        }
        verify_ownership(state, oracle, asset)?;
    }

    // Affordability was checked above, so the debit cannot fail after the
    // id is allocated.
    let cost = ruleset.tower(kind)?.cost;
    let id = state.allocate_id();
    state.debit(cost, LedgerReason::Placement, Some(id), out)?;
    state.towers.insert(
        id,
        Tower {
            id,
            kind,
            position,
            level: 1,
            cooldown: 0,
            asset: asset.cloned(),
            invested: cost,
        },
    );
    state.stats.towers_built += 1;
    out.push(GameEvent::TowerPlaced {
        tower: id,
        kind,
        position,
    });
    tracing::debug!(tower = id, %kind, %position, cost, "Tower placed");
    Ok(CommandEffect::TowerPlaced { tower: id })
}

fn sell_tower(
    state: &mut GameState,
    ruleset: &Ruleset,
    oracle: &dyn AssetOwnership,
    tower_id: EntityId,
    out: &mut TickEvents,
) -> CommandResult {
    ensure_playable(state)?;
    let tower = state
        .towers
        .get(tower_id)
        .ok_or(GameError::InvalidTarget(tower_id))?;
    if let Some(asset) = &tower.asset {
        verify_ownership(state, oracle, asset)?;
    }

    let invested = tower.invested;
    state.towers.remove(tower_id);
    let refund = u32::try_from(
        u64::from(invested) * u64::from(ruleset.sell_refund_percent) / 100,
    )
    .unwrap_or(u32::MAX);
    state.credit(refund, LedgerReason::SaleRefund, Some(tower_id), out);
    state.stats.towers_sold += 1;
    out.push(GameEvent::TowerSold {
        tower: tower_id,
        refund,
    });
    tracing::debug!(tower = tower_id, refund, "Tower sold");
    Ok(CommandEffect::TowerSold { refund })
}

fn upgrade_tower(
    state: &mut GameState,
    ruleset: &Ruleset,
    tower_id: EntityId,
    out: &mut TickEvents,
) -> CommandResult {
    ensure_playable(state)?;
    let tower = state
        .towers
        .get(tower_id)
        .ok_or(GameError::InvalidTarget(tower_id))?;
    let spec = ruleset.tower(tower.kind)?;
    if tower.level >= spec.max_level {
        return Err(GameError::InvalidState(format!(
            "tower {tower_id} is already at max level {}",
            spec.max_level
        )));
    }

    let cost = spec.upgrade_cost_from(tower.level);
    state.debit(cost, LedgerReason::Upgrade, Some(tower_id), out)?;
    let Some(tower) = state.towers.get_mut(tower_id) else {
        return Err(GameError::InvalidTarget(tower_id));
    };
    tower.level += 1;
    tower.invested = tower.invested.saturating_add(cost);
    let level = tower.level;
    out.push(GameEvent::TowerUpgraded {
        tower: tower_id,
        level,
    });
    tracing::debug!(tower = tower_id, level, cost, "Tower upgraded");
    Ok(CommandEffect::TowerUpgraded { level })
}

fn pause(state: &mut GameState, out: &mut TickEvents) -> CommandResult {
    match state.status {
        RunStatus::Paused => Ok(CommandEffect::Unchanged),
        RunStatus::Idle | RunStatus::Running => {
            state.paused_from = Some(state.status);
            state.set_status(RunStatus::Paused, out);
            Ok(CommandEffect::Paused)
        }
        finished => Err(GameError::InvalidState(format!(
            "cannot pause: run is {finished:?}"
        ))),
    }
}

fn resume(state: &mut GameState, out: &mut TickEvents) -> CommandResult {
    match state.status {
        RunStatus::Paused => {
            let previous = state.paused_from.take().unwrap_or(RunStatus::Running);
            state.set_status(previous, out);
            Ok(CommandEffect::Resumed)
        }
        RunStatus::Idle | RunStatus::Running => Ok(CommandEffect::Unchanged),
        finished => Err(GameError::InvalidState(format!(
            "cannot resume: run is {finished:?}"
        ))),
    }
}

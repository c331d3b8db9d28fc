//! Read-only projection of a snapshot for recommendation engines.
//!
//! Advisors never touch game state. They receive an [`AdvisorView`] built
//! from a published snapshot and return suggested commands, which the
//! embedding application submits through a
//! [`CommandSender`](crate::commands::CommandSender) with source
//! [`CommandSource::Advisor`](crate::commands::CommandSource::Advisor).

use serde::{Deserialize, Serialize};

use crate::commands::Command;
use crate::entities::{EntityId, GridPos, TowerKind};
use crate::snapshot::GameSnapshot;
use crate::state::{RunStatus, RunStats};
use crate::waves::WavePhase;

/// Buildable cells within this Manhattan distance of the path are listed.
pub const CANDIDATE_RADIUS: u32 = 2;

/// A tower as an advisor sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TowerSummary {
    /// Tower id.
    pub id: EntityId,
    /// Kind.
    pub kind: TowerKind,
    /// Cell.
    pub position: GridPos,
    /// Level.
    pub level: u32,
    /// Bound to an external asset.
    pub has_asset: bool,
}

/// A free cell next to the path and how much of the path it sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Free buildable cell.
    pub position: GridPos,
    /// Path cells within `CANDIDATE_RADIUS`.
    pub coverage: u32,
}

/// Advisor-facing summary of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisorView {
    /// Tick counter.
    pub tick: u64,
    /// Run status.
    pub status: RunStatus,
    /// Current balance.
    pub balance: u32,
    /// Lifetime earnings.
    pub lifetime_earned: u64,
    /// Base health left.
    pub base_health: u32,
    /// Last started wave, 1-based.
    pub wave: u32,
    /// Wave director phase.
    pub wave_phase: WavePhase,
    /// Enemies alive.
    pub enemies_alive: usize,
    /// Towers in id order.
    pub towers: Vec<TowerSummary>,
    /// Free cells near the path, best coverage first.
    pub candidates: Vec<Candidate>,
    /// Run totals.
    pub stats: RunStats,
}

impl AdvisorView {
    /// Project a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: &GameSnapshot) -> Self {
        let state = snapshot.state();
        let map = state.map();
        let grid = map.grid();

        let mut candidates = Vec::new();
        for y in 0..grid.height() {
            for x in 0..grid.width() {
                let position = GridPos::new(x, y);
                if map.check_buildable(position).is_err() || state.tower_at(position).is_some() {
                    continue;
                }
                let coverage = map
                    .path()
                    .iter()
                    .filter(|cell| cell.manhattan(position) <= CANDIDATE_RADIUS)
                    .count();
                if coverage > 0 {
                    candidates.push(Candidate {
                        position,
                        coverage: u32::try_from(coverage).unwrap_or(u32::MAX),
                    });
                }
            }
        }
        candidates.sort_by(|a, b| {
            b.coverage
                .cmp(&a.coverage)
                .then_with(|| a.position.cmp(&b.position))
        });

        Self {
            tick: state.tick(),
            status: state.status(),
            balance: state.economy().balance(),
            lifetime_earned: state.economy().lifetime_earned(),
            base_health: state.base_health(),
            wave: state.waves().current_wave(),
            wave_phase: state.waves().phase(),
            enemies_alive: state.enemies().len(),
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
            candidates,
            stats: *state.stats(),
        }
    }
}

/// A recommendation engine.
pub trait Advisor {
    /// Suggest commands for the given view. May return nothing.
    fn advise(&mut self, view: &AdvisorView) -> Vec<Command>;
}

//! Scripted advisors for headless playtesting.
//!
//! [`GreedyAdvisor`] builds on the cell that sees the most path, upgrades
//! when it cannot build, and starts the next wave once the field is clear.

use std::sync::Arc;

use bastion_core::advisor::{Advisor, AdvisorView};
use bastion_core::prelude::*;
use serde::{Deserialize, Serialize};

/// Tunables for [`GreedyAdvisor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreedyConfig {
    /// Kinds to build, cycled in order.
    pub build_order: Vec<TowerKind>,
    /// Currency kept back after any purchase.
    #[serde(default)]
    pub reserve: u32,
    /// Spend spare currency on upgrades.
    #[serde(default = "default_true")]
    pub upgrade: bool,
    /// Suggest `StartWave` whenever no wave is running.
    #[serde(default = "default_true")]
    pub auto_start: bool,
    /// Stop building after this many towers.
    #[serde(default)]
    pub max_towers: Option<usize>,
}

const fn default_true() -> bool {
    true
}

impl Default for GreedyConfig {
    fn default() -> Self {
        Self {
            build_order: vec![
                TowerKind::Arrow,
                TowerKind::Frost,
                TowerKind::Arrow,
                TowerKind::Cannon,
            ],
            reserve: 0,
            upgrade: true,
            auto_start: true,
            max_towers: None,
        }
    }
}

/// Advisor maximising path coverage with whatever it can afford.
#[derive(Debug, Clone)]
pub struct GreedyAdvisor {
    ruleset: Arc<Ruleset>,
    config: GreedyConfig,
    next_build: usize,
}

impl GreedyAdvisor {
    /// Advisor for runs under `ruleset`.
    pub fn new(ruleset: Arc<Ruleset>, config: GreedyConfig) -> Self {
        Self {
            ruleset,
            config,
            next_build: 0,
        }
    }

    fn planned_kind(&self) -> Option<TowerKind> {
        if self.config.build_order.is_empty() {
            return None;
        }
        let index = self.next_build % self.config.build_order.len();
        self.config.build_order.get(index).copied()
    }

    fn suggest_build(&mut self, view: &AdvisorView, budget: u32) -> Option<Command> {
        if self
            .config
            .max_towers
            .is_some_and(|max| view.towers.len() >= max)
        {
            return None;
        }
        let kind = self.planned_kind()?;
        let cost = self.ruleset.tower(kind).ok()?.cost;
        if cost > budget {
            return None;
        }
        let candidate = view.candidates.first()?;
        self.next_build += 1;
        Some(Command::PlaceTower {
            kind,
            position: candidate.position,
            asset: None,
        })
    }

    fn suggest_upgrade(&self, view: &AdvisorView, budget: u32) -> Option<Command> {
        view.towers
            .iter()
            .filter_map(|tower| {
                let spec = self.ruleset.tower(tower.kind).ok()?;
                let cost = spec.upgrade_cost_from(tower.level);
                (tower.level < spec.max_level && cost <= budget).then_some((tower.level, tower.id))
            })
            .min()
            .map(|(_, tower)| Command::UpgradeTower { tower })
    }
}

impl Advisor for GreedyAdvisor {
    fn advise(&mut self, view: &AdvisorView) -> Vec<Command> {
        if view.status.is_finished() {
            return Vec::new();
        }

        let mut commands = Vec::new();
        let budget = view.balance.saturating_sub(self.config.reserve);
        if let Some(build) = self.suggest_build(view, budget) {
            commands.push(build);
        } else if self.config.upgrade {
            commands.extend(self.suggest_upgrade(view, budget));
        }

        let idle = matches!(view.wave_phase, WavePhase::Idle | WavePhase::Cleared);
        if self.config.auto_start && idle && view.enemies_alive == 0 {
            commands.push(Command::StartWave);
        }
        commands
    }
}

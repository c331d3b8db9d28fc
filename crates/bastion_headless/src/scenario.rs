//! Scenario loading and configuration.
//!
//! Scenarios bundle everything a headless run needs: the ruleset, the map,
//! the player and the assets they own, a command script and an optional
//! autoplay advisor.
//!
//! ```text
//! (
//!     name: "Opening",
//!     description: "Two arrows, then the first wave",
//!     ruleset_file: Some("../standard_ruleset.ron"),
//!     max_boundaries: 600,
//!     script: [
//!         (boundary: 0, command: PlaceTower(kind: arrow, position: (x: 2, y: 1), asset: None)),
//!         (boundary: 0, command: StartWave),
//!     ],
//! )
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bastion_core::prelude::*;
use std::result::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::advisor::GreedyConfig;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// Ruleset or map rejected by the engine.
    #[error(transparent)]
    Game(#[from] GameError),
}

/// A command queued before a given boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptStep {
    /// Boundary the command is submitted before.
    pub boundary: u64,
    /// The command.
    pub command: Command,
}

/// A complete scenario configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Ruleset file, relative to the scenario file. Built-in rules if unset.
    #[serde(default)]
    pub ruleset_file: Option<PathBuf>,
    /// Inline map. Takes precedence over `map_file`.
    #[serde(default)]
    pub map: Option<MapDef>,
    /// Map file, relative to the scenario file. Built-in map if unset.
    #[serde(default)]
    pub map_file: Option<PathBuf>,
    /// Player owning the run.
    #[serde(default = "default_player")]
    pub player: String,
    /// Assets the player owns.
    #[serde(default)]
    pub assets: Vec<String>,
    /// Boundaries processed before the run is cut off.
    #[serde(default = "default_max_boundaries")]
    pub max_boundaries: u64,
    /// Let the greedy advisor play alongside the script.
    #[serde(default)]
    pub autoplay: Option<GreedyConfig>,
    /// Boundaries between advisor consultations.
    #[serde(default = "default_advise_every")]
    pub advise_every: u64,
    /// Scripted commands.
    #[serde(default)]
    pub script: Vec<ScriptStep>,
    /// Directory relative paths resolve against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

fn default_player() -> String {
    "local".to_string()
}

const fn default_max_boundaries() -> u64 {
    5_000
}

const fn default_advise_every() -> u64 {
    10
}

impl Default for Scenario {
    fn default() -> Self {
        Self::standard()
    }
}

impl Scenario {
    /// The built-in ruleset and map, played by the greedy advisor.
    pub fn standard() -> Self {
        Self {
            name: "Standard".to_string(),
            description: "Built-in switchback map with the greedy advisor".to_string(),
            ruleset_file: None,
            map: None,
            map_file: None,
            player: default_player(),
            assets: Vec::new(),
            max_boundaries: default_max_boundaries(),
            autoplay: Some(GreedyConfig::default()),
            advise_every: default_advise_every(),
            script: Vec::new(),
            base_dir: PathBuf::new(),
        }
    }

    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let mut scenario = Self::from_ron_str(&contents)?;
        scenario.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        tracing::debug!(name = %scenario.name, path = %path.display(), "Scenario loaded");
        Ok(scenario)
    }

    /// Parse a scenario from RON. Relative paths resolve against the
    /// working directory.
    pub fn from_ron_str(contents: &str) -> Result<Self, ScenarioError> {
        Ok(ron::from_str(contents)?)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    fn read(&self, path: &Path) -> Result<String, ScenarioError> {
        let path = self.resolve(path);
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        Ok(std::fs::read_to_string(path)?)
    }

    /// The ruleset this scenario plays under.
    pub fn ruleset(&self) -> Result<Ruleset, ScenarioError> {
        match &self.ruleset_file {
            Some(path) => Ok(Ruleset::from_ron_str(&self.read(path)?)?),
            None => Ok(Ruleset::standard()),
        }
    }

    /// The map this scenario plays on.
    pub fn map_def(&self) -> Result<MapDef, ScenarioError> {
        if let Some(map) = &self.map {
            return Ok(map.clone());
        }
        match &self.map_file {
            Some(path) => Ok(MapDef::from_ron_str(&self.read(path)?)?),
            None => Ok(MapDef::standard()),
        }
    }

    /// Ownership table granting the scenario's assets to its player.
    pub fn ownership(&self) -> StaticOwnership {
        let player = PlayerId::new(&self.player);
        self.assets.iter().fold(StaticOwnership::new(), |table, asset| {
            table.with(player.clone(), AssetId::new(asset))
        })
    }

    /// Commands scheduled before `boundary`.
    pub fn steps_at(&self, boundary: u64) -> impl Iterator<Item = &ScriptStep> {
        self.script.iter().filter(move |step| step.boundary == boundary)
    }

    /// A fresh clock for this scenario.
    pub fn build_clock(&self, record_replay: bool) -> Result<SimulationClock, ScenarioError> {
        let config = ClockConfig {
            player: PlayerId::new(&self.player),
            record_replay,
            ..ClockConfig::default()
        };
        let clock = SimulationClock::new(Arc::new(self.ruleset()?), &self.map_def()?, config)?;
        Ok(clock.with_oracle(self.ownership()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPTED: &str = r#"(
        name: "Scripted",
        player: "alice",
        assets: ["banner"],
        max_boundaries: 40,
        map: Some((name: "line", rows: ["....", "S==B", "...."])),
        script: [
            (boundary: 0, command: PlaceTower(kind: arrow, position: (x: 1, y: 0), asset: Some(AssetId("banner")))),
            (boundary: 2, command: StartWave),
            (boundary: 2, command: Pause),
        ],
    )"#;

    #[test]
    fn test_parse_with_defaults() {
        let scenario = Scenario::from_ron_str(r#"(name: "Bare")"#).unwrap();
        assert_eq!(scenario.player, "local");
        assert_eq!(scenario.max_boundaries, 5_000);
        assert!(scenario.autoplay.is_none());
        assert!(scenario.script.is_empty());
        assert_eq!(scenario.ruleset().unwrap(), Ruleset::standard());
        assert_eq!(scenario.map_def().unwrap(), MapDef::standard());
    }

    #[test]
    fn test_scripted_scenario() {
        let scenario = Scenario::from_ron_str(SCRIPTED).unwrap();
        assert_eq!(scenario.steps_at(2).count(), 2);
        assert_eq!(scenario.steps_at(1).count(), 0);
        assert_eq!(scenario.map_def().unwrap().name, "line");

        let owned = scenario
            .ownership()
            .is_owned(&PlayerId::new("alice"), &AssetId::new("banner"))
            .unwrap();
        assert!(owned);

        let clock = scenario.build_clock(false).unwrap();
        assert_eq!(clock.state().player(), &PlayerId::new("alice"));
    }

    #[test]
    fn test_missing_files() {
        assert!(matches!(
            Scenario::load("/nonexistent/scenario.ron"),
            Err(ScenarioError::FileNotFound(_))
        ));

        let scenario = Scenario {
            ruleset_file: Some(PathBuf::from("missing.ron")),
            base_dir: PathBuf::from("/nonexistent"),
            ..Scenario::standard()
        };
        assert!(matches!(
            scenario.ruleset(),
            Err(ScenarioError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_bad_map_is_game_error() {
        let scenario = Scenario {
            map: Some(MapDef::new("broken", &["S..", "...", "..B"])),
            ..Scenario::standard()
        };
        assert!(matches!(
            scenario.build_clock(false),
            Err(ScenarioError::Game(GameError::InvalidMap(_)))
        ));
    }
}

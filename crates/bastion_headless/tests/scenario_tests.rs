//! Shipped data files and end-to-end scenario runs.

use std::path::PathBuf;
use std::sync::Arc;

use bastion_core::prelude::*;
use bastion_headless::runner::{check_determinism, run_scenario, verify_replay};
use bastion_headless::store::{load_replay, save_replay};
use bastion_headless::Scenario;

fn data_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data").join(relative)
}

fn scenario(name: &str) -> Scenario {
    Scenario::load(data_path(&format!("scenarios/{name}.ron"))).unwrap()
}

#[test]
fn shipped_ruleset_matches_builtin() {
    let parsed = Ruleset::from_ron_str(include_str!("../data/standard_ruleset.ron")).unwrap();
    assert_eq!(parsed, Ruleset::standard());
    assert_eq!(parsed.fingerprint(), Ruleset::standard().fingerprint());
}

#[test]
fn shipped_maps_parse() {
    let switchback = MapDef::from_ron_str(include_str!("../data/switchback.ron")).unwrap();
    assert_eq!(switchback, MapDef::standard());

    let gauntlet = MapDef::from_ron_str(include_str!("../data/gauntlet.ron")).unwrap();
    let map = GameMap::parse(&gauntlet).unwrap();
    assert_eq!(map.path().first(), Some(&GridPos::new(0, 1)));
    assert_eq!(map.path().last(), Some(&GridPos::new(13, 3)));
}

#[test]
fn every_scenario_builds() {
    for name in ["greedy", "opening", "heirloom"] {
        let scenario = scenario(name);
        scenario
            .build_clock(false)
            .unwrap_or_else(|e| panic!("{name}: {e}"));
    }
}

#[test]
fn scripted_opening_is_reproducible() {
    let scenario = scenario("opening");
    let first = run_scenario(&scenario, true).unwrap();
    let second = run_scenario(&scenario, false).unwrap();

    assert_eq!(first.final_hash, second.final_hash);
    assert_eq!(first.boundaries, 600);
    assert_eq!(first.rejected, 0);
    assert!(first.stats.kills > 0);

    let replay = first.replay.unwrap();
    assert!(verify_replay(&scenario, &replay).unwrap().is_match());
}

#[test]
fn greedy_scenario_is_deterministic() {
    let report = check_determinism(&scenario("greedy"), 2).unwrap();
    assert_eq!(report.hashes.len(), 2);
    assert!(report.is_deterministic());
}

#[test]
fn asset_bound_replay_needs_ownership() {
    let scenario = scenario("heirloom");
    let summary = run_scenario(&scenario, true).unwrap();
    let replay = summary.replay.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("heirloom.replay");
    save_replay(&path, &replay).unwrap();
    let loaded = load_replay(&path).unwrap();

    assert!(verify_replay(&scenario, &loaded).unwrap().is_match());

    // Without the asset layer the bound tower is never built.
    let unowned = loaded.verify(Arc::new(scenario.ruleset().unwrap())).unwrap();
    assert!(!unowned.is_match());
}

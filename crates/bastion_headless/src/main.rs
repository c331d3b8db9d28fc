//! Headless tower-defense runner.
//!
//! This binary runs the simulation without graphics, controlled via JSON on
//! stdin/stdout. Designed for bots, CI testing and replay verification.
//!
//! # Usage
//!
//! ```bash
//! # Interactive mode - read requests from stdin
//! cargo run -p bastion_headless
//!
//! # Interactive mode with a scenario and on-disk save slots
//! cargo run -p bastion_headless -- run --scenario data/scenarios/opening.ron --saves saves/
//!
//! # Let the advisor play a scenario and record a replay
//! cargo run -p bastion_headless -- autoplay --scenario data/scenarios/greedy.ron --record run.replay
//!
//! # Check a replay
//! cargo run -p bastion_headless -- verify --replay run.replay
//!
//! # Check that repeated runs end in the same state
//! cargo run -p bastion_headless -- determinism --runs 5
//! ```
//!
//! # Protocol
//!
//! Input (stdin): JSON requests, one per line
//! Output (stdout): JSON responses, one per line
//! Logs (stderr): Debug information
//!
//! See the protocol module for the request/response format.

use std::io;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bastion_core::prelude::*;
use bastion_headless::{
    runner::{check_determinism, run_scenario, verify_replay, HeadlessConfig, HeadlessRunner},
    scenario::Scenario,
    store::{load_replay, save_replay, FileStore},
};

#[derive(Parser)]
#[command(name = "bastion_headless")]
#[command(about = "Headless tower-defense runner for bots and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an interactive session over stdin/stdout
    Run {
        /// Scenario file to load
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Directory for save slots (in-memory if unset)
        #[arg(long)]
        saves: Option<PathBuf>,

        /// Output state after every tick request
        #[arg(long)]
        auto_state: bool,
    },

    /// Play a scenario unattended and print a summary
    Autoplay {
        /// Scenario file (built-in standard scenario if unset)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Write a replay of the run
        #[arg(long)]
        record: Option<PathBuf>,

        /// Override the scenario's boundary limit
        #[arg(long)]
        max_boundaries: Option<u64>,
    },

    /// Verify that a replay reproduces its recorded final state
    Verify {
        /// Replay file path
        #[arg(short, long)]
        replay: PathBuf,

        /// Scenario the replay was recorded from
        #[arg(short, long)]
        scenario: Option<PathBuf>,
    },

    /// Verify determinism by running a scenario multiple times
    Determinism {
        /// Scenario file (built-in standard scenario if unset)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Number of verification runs
        #[arg(short, long, default_value = "5")]
        runs: usize,
    },
}

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr (stdout is for protocol)
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    match cli.command {
        Some(Commands::Run {
            scenario,
            saves,
            auto_state,
        }) => cmd_run(scenario, saves, auto_state),
        Some(Commands::Autoplay {
            scenario,
            record,
            max_boundaries,
        }) => cmd_autoplay(scenario, record, max_boundaries),
        Some(Commands::Verify { replay, scenario }) => cmd_verify(&replay, scenario),
        Some(Commands::Determinism { scenario, runs }) => cmd_determinism(scenario, runs),
        None => cmd_run(None, None, false),
    }
}

fn load_scenario(path: Option<PathBuf>) -> Scenario {
    let Some(path) = path else {
        return Scenario::standard();
    };
    match Scenario::load(&path) {
        Ok(scenario) => scenario,
        Err(e) => {
            eprintln!("Failed to load scenario: {e}");
            std::process::exit(1);
        }
    }
}

/// Run an interactive session
fn cmd_run(scenario: Option<PathBuf>, saves: Option<PathBuf>, auto_state: bool) {
    tracing::info!("Starting interactive session");

    let scenario = load_scenario(scenario);
    let store: Box<dyn SnapshotStore> = match saves {
        Some(dir) => Box::new(FileStore::new(dir)),
        None => Box::new(MemoryStore::new()),
    };
    let config = HeadlessConfig {
        auto_state_output: auto_state,
        ..HeadlessConfig::default()
    };

    let mut runner = match HeadlessRunner::from_scenario(&scenario, store) {
        Ok(runner) => runner.with_config(config),
        Err(e) => {
            eprintln!("Failed to start session: {e}");
            std::process::exit(1);
        }
    };

    let stdin = io::stdin();
    if let Err(e) = runner.run(stdin.lock(), io::stdout().lock()) {
        eprintln!("Session failed: {e}");
        std::process::exit(1);
    }
}

/// Play a scenario unattended
fn cmd_autoplay(scenario: Option<PathBuf>, record: Option<PathBuf>, max_boundaries: Option<u64>) {
    let mut scenario = load_scenario(scenario);
    if let Some(limit) = max_boundaries {
        scenario.max_boundaries = limit;
    }

    let summary = match run_scenario(&scenario, record.is_some()) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Run failed: {e}");
            std::process::exit(1);
        }
    };

    if let (Some(path), Some(replay)) = (record, &summary.replay) {
        if let Err(e) = save_replay(&path, replay) {
            eprintln!("Failed to save replay: {e}");
            std::process::exit(1);
        }
    }

    match serde_json::to_string_pretty(&summary) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Failed to serialize summary: {e}");
            std::process::exit(1);
        }
    }
}

/// Verify a recorded replay
fn cmd_verify(path: &Path, scenario: Option<PathBuf>) {
    tracing::info!("Verifying replay: {}", path.display());

    let replay = match load_replay(path) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to load replay: {e}");
            std::process::exit(1);
        }
    };

    eprintln!("Loaded replay:");
    eprintln!("  Commands: {}", replay.commands.len());
    eprintln!("  Boundaries: {}", replay.boundaries);
    eprintln!("  Duration: {} ticks", replay.final_tick);

    let scenario = load_scenario(scenario);
    match verify_replay(&scenario, &replay) {
        Ok(verification) if verification.is_match() => {
            eprintln!("PASS: Replay verification successful");
            eprintln!("  Expected hash: {:016x}", verification.expected_hash);
            eprintln!("  Actual hash:   {:016x}", verification.actual_hash);
        }
        Ok(verification) => {
            eprintln!("FAIL: Replay diverged");
            eprintln!("  Expected hash: {:016x}", verification.expected_hash);
            eprintln!("  Actual hash:   {:016x}", verification.actual_hash);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("FAIL: {e}");
            std::process::exit(1);
        }
    }
}

/// Verify determinism across repeated runs
fn cmd_determinism(scenario: Option<PathBuf>, runs: usize) {
    let scenario = load_scenario(scenario);
    tracing::info!("Verifying determinism: {} ({} runs)", scenario.name, runs);

    match check_determinism(&scenario, runs) {
        Ok(report) if report.is_deterministic() => {
            eprintln!("PASS: All {runs} runs produced identical results");
        }
        Ok(report) => {
            eprintln!("FAIL: Non-determinism detected!");
            for (run, hash) in report.hashes.iter().enumerate() {
                eprintln!("  Run {run}: {hash:016x}");
            }
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("FAIL: {e}");
            std::process::exit(1);
        }
    }
}

//! Headless game runner for scripted play, advisor testing and CI.
//!
//! This crate drives a [`bastion_core`] simulation without graphics. A
//! controller talks to it with JSON commands on stdin and reads state on
//! stdout. This enables:
//!
//! - **Bot play**: A controller or the built-in advisor plays the game
//! - **CI verification**: Scenario runs checked for determinism
//! - **Replay verification**: Recorded runs re-played and hash-compared
//! - **Save slots**: Snapshots persisted per player on disk
//!
//! # Protocol
//!
//! Communication uses JSON lines (one JSON object per line):
//!
//! - **stdin**: Requests from the controller (place, tick, save, etc.)
//! - **stdout**: Responses and state (JSON)
//! - **stderr**: Logs (human-readable)
//!
//! See [`protocol`] module for the full request/response format.
//!
//! # Example
//!
//! ```bash
//! # Run interactively
//! echo '{"cmd":"tick","count":60}' | cargo run -p bastion_headless -- run
//!
//! # Play a scenario with the advisor and record it
//! cargo run -p bastion_headless -- autoplay --scenario data/scenarios/greedy.ron --record run.replay
//!
//! # Verify the recording
//! cargo run -p bastion_headless -- verify --replay run.replay
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod advisor;
pub mod protocol;
pub mod runner;
pub mod scenario;
pub mod store;

pub use advisor::{GreedyAdvisor, GreedyConfig};
pub use protocol::{Request, Response};
pub use runner::{run_scenario, HeadlessConfig, HeadlessRunner, RunSummary, RunnerError};
pub use scenario::{Scenario, ScenarioError};
pub use store::FileStore;

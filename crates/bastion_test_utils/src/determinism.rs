//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the simulation produces identical
//! results given identical inputs.
//!
//! # Testing Strategy
//!
//! Replays, undo and save/restore all assume the same starting snapshot and
//! the same command sequence lead to the same state hash. Sources of
//! non-determinism include:
//!
//! - **Floating-point math**: We use fixed-point arithmetic via
//!   [`bastion_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Systems always iterate in sorted entity id order.
//!
//! - **Command arrival order**: Commands are stamped with a sequence number
//!   at submission and applied in that order at the next boundary.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual system determinism (movement, combat, waves)
//! 2. **Property tests**: Random command scripts still produce identical hashes
//! 3. **Integration tests**: Full runs and replays are reproducible
//! 4. **Parallel tests**: Running N clocks on separate threads all match

use std::thread;

use bastion_core::prelude::*;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of boundaries processed.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic run).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that every run matched, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Boundaries: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `ticks` - Number of steps per run
/// * `setup` - Function to create the initial state
/// * `step` - Function to advance by one step
/// * `hash` - Function to compute the state hash
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S, u64),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for tick in 0..ticks {
            step(&mut state, tick);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// A command scheduled for a specific boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedCommand {
    /// Boundary index (0-based) the command is submitted before.
    pub boundary: u64,
    /// Producer.
    pub source: CommandSource,
    /// The command.
    pub command: Command,
}

impl ScriptedCommand {
    /// Player command at `boundary`.
    #[must_use]
    pub fn player(boundary: u64, command: Command) -> Self {
        Self {
            boundary,
            source: CommandSource::Player,
            command,
        }
    }
}

/// Feed the script into a clock and process `boundaries` boundaries.
///
/// Commands are sent in script order before the boundary they name. Stops
/// early once the run is finished.
///
/// # Errors
///
/// Propagates the first boundary error.
pub fn run_script(
    clock: &mut SimulationClock,
    script: &[ScriptedCommand],
    boundaries: u64,
) -> Result<u64> {
    let sender = clock.sender();
    for boundary in 0..boundaries {
        for scripted in script.iter().filter(|c| c.boundary == boundary) {
            sender.send(scripted.source, scripted.command.clone())?;
        }
        clock.tick()?;
        if clock.state().status().is_finished() {
            break;
        }
    }
    Ok(clock.state().state_hash())
}

/// Run the same script on two fresh clocks and compare final hashes.
///
/// # Panics
///
/// Panics if a boundary fails.
pub fn verify_clock_determinism<F>(
    setup_fn: F,
    script: &[ScriptedCommand],
    boundaries: u64,
) -> bool
where
    F: Fn() -> SimulationClock,
{
    let result = verify_determinism(
        2,
        1,
        &setup_fn,
        |clock, _| {
            run_script(clock, script, boundaries).expect("scripted run succeeds");
        },
        |clock| clock.state().state_hash(),
    );
    result.is_deterministic
}

/// Result of parallel runs.
#[derive(Debug, Clone)]
pub struct ParallelSimResult {
    /// Final state hash from each run.
    pub hashes: Vec<u64>,
    /// Boundaries each run processed.
    pub ticks: u64,
    /// Number of runs.
    pub num_sims: usize,
}

impl ParallelSimResult {
    /// Check if all runs produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all runs matched.
    ///
    /// # Panics
    ///
    /// Panics if runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel simulations diverged!\n\
                 Simulations: {}\n\
                 Boundaries: {}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.num_sims,
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run N clocks on scoped threads with the same script and collect hashes.
///
/// Catches non-determinism that only shows up under different memory
/// layouts or hasher seeds.
///
/// # Panics
///
/// Panics if a thread panics or a boundary fails.
pub fn run_parallel_scripts<F>(
    setup_fn: F,
    script: &[ScriptedCommand],
    num_sims: usize,
    boundaries: u64,
) -> ParallelSimResult
where
    F: Fn() -> SimulationClock + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut clock = setup_fn();
                    run_script(&mut clock, script, boundaries).expect("scripted run succeeds")
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("simulation thread panicked"))
            .collect()
    });

    ParallelSimResult {
        hashes,
        ticks: boundaries,
        num_sims,
    }
}

/// Compare two runs boundary by boundary, finding the first divergence.
///
/// # Returns
///
/// `None` if the runs stay identical, `Some(boundary)` for the first
/// boundary after which their hashes differ (0 means the initial states
/// already differ).
///
/// # Panics
///
/// Panics if a boundary fails.
pub fn find_first_divergence<F>(
    setup_fn: F,
    script: &[ScriptedCommand],
    boundaries: u64,
) -> Option<u64>
where
    F: Fn() -> SimulationClock,
{
    let mut first = setup_fn();
    let mut second = setup_fn();

    if first.state().state_hash() != second.state().state_hash() {
        return Some(0);
    }

    let senders = (first.sender(), second.sender());
    for boundary in 0..boundaries {
        for scripted in script.iter().filter(|c| c.boundary == boundary) {
            senders
                .0
                .send(scripted.source, scripted.command.clone())
                .expect("inbox open");
            senders
                .1
                .send(scripted.source, scripted.command.clone())
                .expect("inbox open");
        }
        first.tick().expect("boundary succeeds");
        second.tick().expect("boundary succeeds");

        if first.state().state_hash() != second.state().state_hash() {
            tracing::warn!(boundary, "Runs diverged");
            return Some(boundary + 1);
        }
    }

    None
}

/// Verify that encoding a snapshot mid-run and resuming from the decoded
/// copy ends on the same hash as the uninterrupted run.
///
/// The script is split at `split`; the resumed clock receives the remaining
/// commands with their boundaries shifted down by `split`.
///
/// # Panics
///
/// Panics if a boundary fails.
pub fn verify_snapshot_determinism<F>(
    setup_fn: F,
    script: &[ScriptedCommand],
    split: u64,
    boundaries: u64,
) -> bool
where
    F: Fn() -> SimulationClock,
{
    let mut uninterrupted = setup_fn();
    let expected =
        run_script(&mut uninterrupted, script, boundaries).expect("scripted run succeeds");

    let mut first_half = setup_fn();
    let (head, tail): (Vec<_>, Vec<_>) = script.iter().cloned().partition(|c| c.boundary < split);
    run_script(&mut first_half, &head, split).expect("scripted run succeeds");

    let Ok(bytes) = first_half.capture().encode() else {
        return false;
    };
    let Ok(decoded) = GameSnapshot::decode(&bytes) else {
        return false;
    };
    if decoded.state_hash() != first_half.state().state_hash() {
        return false;
    }

    let config = ClockConfig {
        player: decoded.player().clone(),
        undo_depth: 0,
        record_replay: false,
    };
    let Ok(mut resumed) =
        SimulationClock::from_snapshot(first_half.ruleset().clone(), decoded, config)
    else {
        return false;
    };
    let shifted: Vec<_> = tail
        .into_iter()
        .map(|mut c| {
            c.boundary -= split;
            c
        })
        .collect();
    let actual = run_script(&mut resumed, &shifted, boundaries.saturating_sub(split))
        .expect("scripted run succeeds");

    expected == actual
}

/// Proptest strategies for determinism testing.
///
/// These strategies generate random but reproducible command scripts for
/// property-based testing of the clock.
pub mod strategies {
    use bastion_core::prelude::*;
    use proptest::prelude::*;

    use super::ScriptedCommand;

    /// Any tower kind.
    pub fn arb_tower_kind() -> impl Strategy<Value = TowerKind> {
        prop::sample::select(TowerKind::ALL.to_vec())
    }

    /// A cell inside a `width` x `height` grid.
    pub fn arb_grid_pos(width: u32, height: u32) -> impl Strategy<Value = GridPos> {
        (0..width, 0..height).prop_map(|(x, y)| GridPos::new(x, y))
    }

    /// Small entity ids, so sell and upgrade sometimes hit a real tower.
    pub fn arb_entity_id() -> impl Strategy<Value = EntityId> {
        1u64..24u64
    }

    /// Generate a place command without an asset.
    pub fn arb_place_command(width: u32, height: u32) -> impl Strategy<Value = Command> {
        (arb_tower_kind(), arb_grid_pos(width, height)).prop_map(|(kind, position)| {
            Command::PlaceTower {
                kind,
                position,
                asset: None,
            }
        })
    }

    /// Generate any command, weighted towards placement and wave starts.
    pub fn arb_command(width: u32, height: u32) -> impl Strategy<Value = Command> {
        prop_oneof![
            4 => arb_place_command(width, height),
            1 => arb_entity_id().prop_map(|tower| Command::SellTower { tower }),
            1 => arb_entity_id().prop_map(|tower| Command::UpgradeTower { tower }),
            2 => Just(Command::StartWave),
            1 => Just(Command::Pause),
            1 => Just(Command::Resume),
        ]
    }

    /// Generate a sequence of commands.
    pub fn arb_command_sequence(
        width: u32,
        height: u32,
        max_len: usize,
    ) -> impl Strategy<Value = Vec<Command>> {
        proptest::collection::vec(arb_command(width, height), 0..max_len)
    }

    /// Generate a script over the first `boundaries` boundaries, sorted by
    /// boundary.
    pub fn arb_script(
        width: u32,
        height: u32,
        boundaries: u64,
        max_len: usize,
    ) -> impl Strategy<Value = Vec<ScriptedCommand>> {
        proptest::collection::vec((0..boundaries, arb_command(width, height)), 0..max_len)
            .prop_map(|mut entries| {
                entries.sort_by_key(|(boundary, _)| *boundary);
                entries
                    .into_iter()
                    .map(|(boundary, command)| ScriptedCommand::player(boundary, command))
                    .collect()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::strategies::*;
    use super::*;
    use crate::fixtures::{place, standard_clock, tiny_clock};
    use proptest::prelude::*;

    fn opening_script() -> Vec<ScriptedCommand> {
        vec![
            ScriptedCommand::player(0, place(TowerKind::Arrow, 2, 1)),
            ScriptedCommand::player(0, place(TowerKind::Frost, 4, 3)),
            ScriptedCommand::player(1, Command::StartWave),
            ScriptedCommand::player(60, Command::Pause),
            ScriptedCommand::player(62, Command::Resume),
        ]
    }

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 100, || 0u64, |n, _| *n += 1, |n| *n);

        assert!(result.is_deterministic);
        assert_eq!(result.hashes, vec![100, 100, 100]);
    }

    #[test]
    fn test_idle_clock_determinism() {
        assert!(verify_clock_determinism(standard_clock, &[], 50));
    }

    #[test]
    fn test_scripted_run_determinism() {
        assert!(verify_clock_determinism(
            standard_clock,
            &opening_script(),
            300
        ));
    }

    #[test]
    fn test_find_divergence_on_deterministic_run() {
        assert!(find_first_divergence(standard_clock, &opening_script(), 200).is_none());
    }

    #[test]
    fn test_parallel_runs_match() {
        run_parallel_scripts(standard_clock, &opening_script(), 4, 250).assert_deterministic();
    }

    #[test]
    fn test_snapshot_resume_matches() {
        assert!(verify_snapshot_determinism(
            standard_clock,
            &opening_script(),
            40,
            200
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_random_scripts_are_deterministic(script in arb_script(10, 3, 40, 16)) {
            prop_assert!(verify_clock_determinism(tiny_clock, &script, 60));
        }
    }
}

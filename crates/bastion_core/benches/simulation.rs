//! Simulation benchmarks for bastion_core.
//!
//! Run with: `cargo bench -p bastion_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use std::sync::Arc;

use bastion_core::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn busy_clock() -> SimulationClock {
    let mut rules = Ruleset::standard();
    rules.starting_balance = 1_000;
    let mut clock =
        SimulationClock::new(Arc::new(rules), &MapDef::standard(), ClockConfig::default())
            .expect("standard clock");
    let sender = clock.sender();
    for (x, y) in [(2, 1), (4, 3), (5, 2), (9, 4), (11, 3), (7, 3)] {
        let _ = sender.send(
            CommandSource::Player,
            Command::PlaceTower {
                kind: TowerKind::Arrow,
                position: GridPos::new(x, y),
                asset: None,
            },
        );
    }
    let _ = sender.send(CommandSource::Player, Command::StartWave);
    clock
}

/// Runs simulation benchmarks for the bastion_core crate.
pub fn simulation_benchmark(c: &mut Criterion) {
    c.bench_function("wave_one_200_ticks", |b| {
        b.iter(|| {
            let mut clock = busy_clock();
            let reports = clock.run_ticks(200).expect("ticks run");
            black_box(reports.len())
        })
    });

    c.bench_function("snapshot_encode", |b| {
        let mut clock = busy_clock();
        clock.run_ticks(100).expect("ticks run");
        let snapshot = clock.capture();
        b.iter(|| black_box(snapshot.encode().expect("encode")))
    });

    c.bench_function("state_hash", |b| {
        let mut clock = busy_clock();
        clock.run_ticks(100).expect("ticks run");
        b.iter(|| black_box(clock.state().state_hash()))
    });
}

criterion_group!(benches, simulation_benchmark);
criterion_main!(benches);

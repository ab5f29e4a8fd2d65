//! A* planner benchmarks.
//!
//! Measures `planner::plan` search cost as a function of how much state
//! the goal predicate still disagrees with: divergence from upstream and
//! conflict count are the two dimensions the heuristic is built from.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench planner_search
//! # With a custom filter:
//! cargo bench --bench planner_search -- conflicts
//! ```

use std::path::PathBuf;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use gitgoap::config::{Config, GoalConfig, GoalMode};
use gitgoap::planner;
use gitgoap::state::{ConflictDetail, ConflictType, RepoState, RepoStateDraft};

fn resolve_only() -> GoalConfig {
    GoalConfig { mode: GoalMode::ResolveOnly, tests_must_pass: false, push_with_lease: false }
}

fn clean_state() -> RepoState {
    RepoStateDraft::new(PathBuf::from("/repo")).freeze(&Config::default())
}

fn diverged_state(behind: u32) -> RepoState {
    let mut draft = RepoStateDraft::new(PathBuf::from("/repo"));
    draft.diverged_remote = behind;
    draft.freeze(&Config::default())
}

fn conflicted_state(n: usize) -> RepoState {
    let mut draft = RepoStateDraft::new(PathBuf::from("/repo"));
    draft.working_tree_clean = false;
    draft.conflicts = (0..n)
        .map(|i| ConflictDetail {
            path: PathBuf::from(format!("file{i}.txt")),
            hunk_count: 1,
            conflict_type: ConflictType::Text,
            trivial_ratio: 1.0,
            preferred_resolution: None,
        })
        .collect();
    draft.freeze(&Config::default())
}

/// A goal already satisfied should short-circuit to an empty plan without
/// expanding any search nodes.
fn bench_already_satisfied(c: &mut Criterion) {
    let config = Config::default();
    let goal = resolve_only();
    let state = clean_state();

    c.bench_function("plan/already_satisfied", |b| {
        b.iter(|| planner::plan(&state, &goal, &config).unwrap());
    });
}

/// Search cost as the starting point gets further behind upstream.
fn bench_diverged(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan/diverged");
    let config = Config::default();
    let mut goal = resolve_only();
    goal.mode = GoalMode::RebaseToUpstream;

    for &behind in &[1u32, 5, 20] {
        let state = diverged_state(behind);
        group.throughput(Throughput::Elements(u64::from(behind)));
        group.bench_with_input(BenchmarkId::new("behind", behind), &behind, |b, _| {
            b.iter(|| planner::plan(&state, &goal, &config));
        });
    }

    group.finish();
}

/// Search cost as the number of trivially-resolvable conflicts grows.
fn bench_conflicts(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan/conflicts");
    let config = Config::default();
    let goal = resolve_only();

    for &n in &[1usize, 5, 20] {
        let state = conflicted_state(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("count", n), &n, |b, _| {
            b.iter(|| planner::plan(&state, &goal, &config));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_already_satisfied, bench_diverged, bench_conflicts);
criterion_main!(benches);

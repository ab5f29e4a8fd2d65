//! Generative property tests over the action registry and the A* planner.
//!
//! Covers: every applicable action predicts a consistent, non-negative
//! state; a returned plan replays step by step to a goal-satisfying state;
//! planning is deterministic for identical inputs; and a state that already
//! satisfies the goal always plans to nothing. Checked over small
//! hand-built `RepoState` fixtures, in the same style as the action
//! registry's own `proptest` coverage of merge determinism.
//!
//! Fixtures never populate `current_ref.commit`/`upstream_commit`, so
//! `RebaseOntoUpstream`'s merge-tree preview is never consulted (its
//! predicted-conflicts helper short-circuits to empty without one) — these
//! tests exercise pure functions only, no subprocess calls.

use std::path::PathBuf;
use std::time::Duration;

use proptest::prelude::*;

use crate::action::PlanningContext;
use crate::actions;
use crate::config::{Config, GoalConfig, GoalMode};
use crate::goal;
use crate::planner::{self, Plan};
use crate::state::{ConflictDetail, ConflictType, RepoState, RepoStateDraft, TestsResult};

fn arb_conflict_type() -> impl Strategy<Value = ConflictType> {
    prop_oneof![
        Just(ConflictType::Text),
        Just(ConflictType::Json),
        Just(ConflictType::Yaml),
        Just(ConflictType::Lock),
        Just(ConflictType::Binary),
    ]
}

fn arb_conflict(idx: usize) -> impl Strategy<Value = ConflictDetail> {
    (arb_conflict_type(), 0u32..4, prop_oneof![Just(0.0), Just(0.5), Just(1.0)]).prop_map(
        move |(conflict_type, hunk_count, trivial_ratio)| ConflictDetail {
            path: PathBuf::from(format!("file{idx}.txt")),
            hunk_count,
            conflict_type,
            trivial_ratio,
            preferred_resolution: None,
        },
    )
}

fn arb_tests_result() -> impl Strategy<Value = TestsResult> {
    prop_oneof![Just(TestsResult::Unknown), Just(TestsResult::Passed), Just(TestsResult::Failed)]
}

/// A small, bounded `RepoState` fixture satisfying invariant 1 (a clean
/// working tree never carries conflicts) by construction.
fn arb_state() -> impl Strategy<Value = RepoState> {
    (
        0u32..3,
        0u32..3,
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        prop::collection::vec(0..2usize, 0..2).prop_flat_map(|idxs| {
            idxs.into_iter().map(arb_conflict).collect::<Vec<_>>()
        }),
        arb_tests_result(),
        any::<bool>(),
    )
        .prop_map(
            |(
                diverged_local,
                diverged_remote,
                working_tree_clean_hint,
                ongoing_rebase,
                ongoing_merge,
                conflicts,
                tests_last_result,
                has_unpushed_commits,
            )| {
                let config = Config::default();
                let mut draft = RepoStateDraft::new(PathBuf::from("/repo"));
                draft.diverged_local = diverged_local;
                draft.diverged_remote = diverged_remote;
                draft.ongoing_rebase = ongoing_rebase;
                draft.ongoing_merge = ongoing_merge;
                draft.conflicts = conflicts;
                draft.tests_last_result = tests_last_result;
                draft.has_unpushed_commits = has_unpushed_commits;
                draft.working_tree_clean = working_tree_clean_hint && draft.conflicts.is_empty();
                draft.freeze(&config)
            },
        )
}

fn resolve_only_goal() -> GoalConfig {
    GoalConfig { mode: GoalMode::ResolveOnly, tests_must_pass: false, push_with_lease: false }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Invariant 2: an applicable action's predicted state has no negative
    /// counters and a `risk_level`/`conflict_difficulty` consistent with
    /// refreezing its own raw fields.
    #[test]
    fn predicted_states_have_consistent_derived_fields(state in arb_state()) {
        let config = Config::default();
        let ctx = PlanningContext::new(PathBuf::from("/repo"), Duration::from_secs(5));
        for action in actions::registry() {
            if !(action.applicable)(&state, &config, &ctx) {
                continue;
            }
            prop_assert!((action.cost)(&state, &config, &ctx) >= 0.0);
            let next = (action.predict)(&state, &config, &ctx);
            prop_assert!(next.conflict_difficulty >= 0.0);
            prop_assert!(next.staleness_score >= 0.0);
            let refrozen = RepoStateDraft::from_state(&next).freeze(&config);
            prop_assert_eq!(next.risk_level, refrozen.risk_level);
            prop_assert!((next.conflict_difficulty - refrozen.conflict_difficulty).abs() < 1e-9);
        }
    }

    /// Invariant 3: a plan returned by `plan` replays, step by step via each
    /// chosen action's `predict`, to a state satisfying the goal; every
    /// intermediate state satisfies the next action's precondition.
    #[test]
    fn plans_replay_to_a_goal_satisfying_state(state in arb_state()) {
        let config = Config::default();
        let goal_spec = resolve_only_goal();
        let Ok(plan) = planner::plan(&state, &goal_spec, &config) else { return Ok(()); };

        let ctx = PlanningContext::new(PathBuf::from("/repo"), Duration::from_secs(5));
        let registry = actions::registry();
        let mut cur = state;
        for step in &plan.actions {
            let action = registry
                .iter()
                .find(|a| a.name == step.name)
                .expect("plan names a registered action");
            prop_assert!((action.applicable)(&cur, &config, &ctx));
            cur = (action.predict)(&cur, &config, &ctx);
        }
        prop_assert!(goal::satisfied(&cur, &goal_spec));
    }

    /// Invariant 4: identical `(state, goal, config)` inputs produce
    /// byte-identical plans (or the same error) across repeated calls.
    #[test]
    fn planning_is_deterministic(state in arb_state()) {
        let config = Config::default();
        let goal_spec = resolve_only_goal();
        let a = planner::plan(&state, &goal_spec, &config);
        let b = planner::plan(&state, &goal_spec, &config);
        match (a, b) {
            (Ok(pa), Ok(pb)) => prop_assert_eq!(pa, pb),
            (Err(ea), Err(eb)) => prop_assert_eq!(ea.to_string(), eb.to_string()),
            _ => prop_assert!(false, "plan() returned different Ok/Err across identical repeated calls"),
        }
    }

    /// Admissibility, generatively (invariant 5): a state that already
    /// satisfies the goal must plan to the empty plan — there is never a
    /// cheaper-looking detour through a state that has nothing left to fix.
    #[test]
    fn goal_satisfying_states_plan_to_empty(state in arb_state()) {
        let goal_spec = resolve_only_goal();
        if goal::satisfied(&state, &goal_spec) {
            let config = Config::default();
            let plan = planner::plan(&state, &goal_spec, &config).expect("already-satisfied goal always plans");
            prop_assert_eq!(plan, Plan::empty());
        }
    }
}

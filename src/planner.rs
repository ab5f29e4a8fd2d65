//! The A* planner.
//!
//! Nodes are [`RepoState`] values; edges are applications of a registered
//! action's `predict`. The open set is a `BinaryHeap` of a `Reverse`-wrapped
//! min-key (`f`, then `h`, then insertion order) so Rust's max-heap gives
//! the required min-f/min-h/FIFO tie-break without a custom comparator
//! trait, preferring plain stdlib collections over a bespoke data
//! structure. The closed set is a `HashMap<StateDigest, f64>` keyed by
//! the state's canonical digest.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::action::{ActionSpec, PlanningContext, RegisteredAction};
use crate::config::{Config, GoalConfig};
use crate::error::{GoapError, NoPlanReason};
use crate::state::{RepoState, StateDigest, TestsResult};
use crate::{actions, goal};

/// Ordered list of actions the executor should drive, plus the total
/// predicted cost and the planner's explanation notes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Ordered actions to execute.
    pub actions: Vec<ActionSpec>,
    /// Sum of `actions[..].cost`.
    pub estimated_cost: f64,
    /// One explanation line per action, in plan order.
    pub notes: Vec<String>,
}

impl Plan {
    /// A plan with no actions: the start state already satisfies the goal.
    #[must_use]
    pub fn empty() -> Self {
        Self { actions: Vec::new(), estimated_cost: 0.0, notes: Vec::new() }
    }
}

/// One slab entry in the search tree: the state it represents, the best
/// `g` found to reach it along this path, and a back-pointer to its parent
/// for plan reconstruction.
struct SearchNode {
    state: RepoState,
    g: f64,
    parent: Option<usize>,
    action_name: Option<&'static str>,
    step_cost: f64,
}

/// Min-key for the open set: ordered by `(f, h, seq)` ascending, wrapped in
/// `Reverse` at the call site so `BinaryHeap::pop` yields the smallest.
#[derive(Clone, Copy)]
struct OpenKey {
    f: f64,
    h: f64,
    seq: u64,
    idx: usize,
}

impl PartialEq for OpenKey {
    fn eq(&self, other: &Self) -> bool {
        self.f == other.f && self.h == other.h && self.seq == other.seq
    }
}
impl Eq for OpenKey {}

impl PartialOrd for OpenKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.f.total_cmp(&other.f).then_with(|| self.h.total_cmp(&other.h)).then_with(|| self.seq.cmp(&other.seq))
    }
}

/// The heuristic `h(n)`: a non-negative, admissible estimate of remaining
/// cost. Coefficients are clamped non-negative by
/// [`Config::validated`] before they ever reach here.
fn heuristic(state: &RepoState, goal_spec: &GoalConfig, config: &Config) -> f64 {
    let h = &config.heuristics;
    let mut total = h.alpha * state.conflicts.len() as f64
        + h.beta * f64::from(state.diverged_local + state.diverged_remote)
        + h.delta * state.staleness_score;
    if state.ongoing_rebase || state.ongoing_merge {
        total += h.gamma;
    }
    if goal_spec.tests_must_pass && state.tests_last_result != TestsResult::Passed {
        total += h.epsilon;
    }
    if goal_spec.push_with_lease && state.has_unpushed_commits {
        total += h.zeta;
    }
    total
}

/// Find the shortest safe sequence of registered actions from `start` to a
/// state satisfying `goal`, via A*.
///
/// # Errors
/// Returns [`GoapError::NoPlan`] if the goal is unreachable from `start`
/// under the registered actions, or if `config.planner.max_expansions` /
/// `max_plan_length` is exhausted first.
pub fn plan(start: &RepoState, goal_spec: &GoalConfig, config: &Config) -> Result<Plan, GoapError> {
    if goal::satisfied(start, goal_spec) {
        return Ok(Plan::empty());
    }

    let registry = actions::registry();
    let ctx = PlanningContext::new(start.root.clone(), Duration::from_secs(config.safety.observation_timeout_sec));

    let mut nodes: Vec<SearchNode> = vec![SearchNode { state: start.clone(), g: 0.0, parent: None, action_name: None, step_cost: 0.0 }];
    let mut open: BinaryHeap<Reverse<OpenKey>> = BinaryHeap::new();
    let mut closed: HashMap<StateDigest, f64> = HashMap::new();
    let mut seq: u64 = 1;

    let h0 = heuristic(start, goal_spec, config);
    open.push(Reverse(OpenKey { f: h0, h: h0, seq: 0, idx: 0 }));

    let mut expansions: u32 = 0;
    let mut hit_length_cap = false;

    while let Some(Reverse(key)) = open.pop() {
        let idx = key.idx;
        let g = nodes[idx].g;
        let digest = nodes[idx].state.digest();

        if let Some(&best_g) = closed.get(&digest) {
            if g > best_g {
                continue;
            }
        }
        closed.insert(digest, g);

        if goal::satisfied(&nodes[idx].state, goal_spec) {
            return Ok(reconstruct(&nodes, idx, &registry, config, goal_spec, &ctx));
        }

        expansions += 1;
        if expansions > config.planner.max_expansions {
            return Err(GoapError::NoPlan { reason: NoPlanReason::ExhaustedExpansions });
        }

        let depth = path_depth(&nodes, idx);
        if depth >= config.planner.max_plan_length {
            hit_length_cap = true;
            continue;
        }

        let state = nodes[idx].state.clone();
        for action in &registry {
            if !(action.applicable)(&state, config, &ctx) {
                continue;
            }
            let next_state = (action.predict)(&state, config, &ctx);
            let step_cost = (action.cost)(&state, config, &ctx);
            let next_g = g + step_cost;
            let next_digest = next_state.digest();

            if let Some(&best_g) = closed.get(&next_digest) {
                if next_g >= best_g {
                    continue;
                }
            }

            let h = heuristic(&next_state, goal_spec, config);
            let next_idx = nodes.len();
            nodes.push(SearchNode {
                state: next_state,
                g: next_g,
                parent: Some(idx),
                action_name: Some(action.name),
                step_cost,
            });
            open.push(Reverse(OpenKey { f: next_g + h, h, seq, idx: next_idx }));
            seq += 1;
        }
    }

    let reason = if hit_length_cap { NoPlanReason::ExhaustedLength } else { NoPlanReason::Unreachable };
    Err(GoapError::NoPlan { reason })
}

/// Number of actions already applied to reach `idx` from the start node.
fn path_depth(nodes: &[SearchNode], idx: usize) -> u32 {
    let mut depth = 0;
    let mut cur = idx;
    while let Some(parent) = nodes[cur].parent {
        depth += 1;
        cur = parent;
    }
    depth
}

/// Walk back from the goal node to the start node and build the ordered
/// [`Plan`], annotating each step with why it was chosen, the best
/// alternative it rejected, and its cumulative cost.
fn reconstruct(
    nodes: &[SearchNode],
    goal_idx: usize,
    registry: &[RegisteredAction],
    config: &Config,
    goal_spec: &GoalConfig,
    ctx: &PlanningContext,
) -> Plan {
    let mut path = vec![goal_idx];
    let mut cur = goal_idx;
    while let Some(parent) = nodes[cur].parent {
        path.push(parent);
        cur = parent;
    }
    path.reverse();

    let mut actions_out = Vec::with_capacity(path.len() - 1);
    let mut notes = Vec::with_capacity(path.len() - 1);
    let mut cumulative = 0.0;

    for window in path.windows(2) {
        let (parent_idx, child_idx) = (window[0], window[1]);
        let chosen_name = nodes[child_idx].action_name.unwrap_or("?");
        let chosen_cost = nodes[child_idx].step_cost;
        cumulative += chosen_cost;

        actions_out.push(ActionSpec {
            name: chosen_name.to_owned(),
            params: std::collections::BTreeMap::new(),
            cost: chosen_cost,
            rationale: Some(format!("reduces heuristic distance toward the goal at cost {chosen_cost:.3}")),
        });

        notes.push(explain_step(nodes, parent_idx, chosen_name, chosen_cost, cumulative, registry, config, goal_spec, ctx));
    }

    let estimated_cost = nodes[goal_idx].g;
    Plan { actions: actions_out, estimated_cost, notes }
}

/// Recompute, at `parent_idx`'s state, every other applicable action's
/// resulting `f` so the note can name the best rejected alternative.
#[allow(clippy::too_many_arguments)]
fn explain_step(
    nodes: &[SearchNode],
    parent_idx: usize,
    chosen_name: &str,
    chosen_cost: f64,
    cumulative: f64,
    registry: &[RegisteredAction],
    config: &Config,
    goal_spec: &GoalConfig,
    ctx: &PlanningContext,
) -> String {
    let parent_state = &nodes[parent_idx].state;
    let parent_g = nodes[parent_idx].g;

    let mut alternatives: Vec<(&str, f64)> = Vec::new();
    for action in registry {
        if action.name == chosen_name {
            continue;
        }
        if !(action.applicable)(parent_state, config, ctx) {
            continue;
        }
        let next_state = (action.predict)(parent_state, config, ctx);
        let alt_cost = (action.cost)(parent_state, config, ctx);
        let f = parent_g + alt_cost + heuristic(&next_state, goal_spec, config);
        alternatives.push((action.name, f));
    }
    alternatives.sort_by(|a, b| a.1.total_cmp(&b.1));

    match alternatives.first() {
        Some((name, f)) => format!(
            "chose {chosen_name} (cost {chosen_cost:.3}, cumulative {cumulative:.3}); best rejected alternative was {name} (f={f:.3})"
        ),
        None => format!("chose {chosen_name} (cost {chosen_cost:.3}, cumulative {cumulative:.3}); no applicable alternative at this step"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GoalMode;
    use crate::state::{ConflictDetail, ConflictType, RepoStateDraft};
    use std::path::PathBuf;

    fn goal(mode: GoalMode) -> GoalConfig {
        GoalConfig { mode, tests_must_pass: false, push_with_lease: false }
    }

    #[test]
    fn already_satisfied_goal_returns_empty_plan() {
        let config = Config::default();
        let state = RepoStateDraft::new(PathBuf::from("/repo")).freeze(&config);
        let result = plan(&state, &goal(GoalMode::ResolveOnly), &config).unwrap();
        assert_eq!(result, Plan::empty());
    }

    #[test]
    fn dirty_tree_plans_a_single_ensure_clean_step() {
        let config = Config::default();
        let mut draft = RepoStateDraft::new(PathBuf::from("/repo"));
        draft.working_tree_clean = false;
        let state = draft.freeze(&config);
        let result = plan(&state, &goal(GoalMode::ResolveOnly), &config).unwrap();
        assert_eq!(result.actions.len(), 1);
        assert_eq!(result.actions[0].name, "EnsureClean");
        assert_eq!(result.notes.len(), 1);
    }

    #[test]
    fn ongoing_rebase_with_no_conflicts_continues_and_reaches_goal() {
        let config = Config::default();
        let mut draft = RepoStateDraft::new(PathBuf::from("/repo"));
        draft.ongoing_rebase = true;
        let state = draft.freeze(&config);
        let result = plan(&state, &goal(GoalMode::ResolveOnly), &config).unwrap();
        assert_eq!(result.actions.last().map(|a| a.name.as_str()), Some("RebaseContinue"));
    }

    #[test]
    fn path_rule_resolves_lock_conflict_then_continues() {
        let mut config = Config::default();
        config.strategy.rules.push(crate::config::PathRule {
            pattern: "**/*.lock".to_owned(),
            resolution: crate::config::Resolution::Theirs,
            when: None,
        });
        let mut draft = RepoStateDraft::new(PathBuf::from("/repo"));
        draft.ongoing_rebase = true;
        draft.conflicts.push(ConflictDetail {
            path: PathBuf::from("Cargo.lock"),
            hunk_count: 1,
            conflict_type: ConflictType::Lock,
            trivial_ratio: 0.0,
            preferred_resolution: None,
        });
        let state = draft.freeze(&config);
        let result = plan(&state, &goal(GoalMode::ResolveOnly), &config).unwrap();
        let names: Vec<&str> = result.actions.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["ApplyPathStrategy", "RebaseContinue"]);
    }

    #[test]
    fn binary_conflict_with_no_rule_is_unreachable() {
        let config = Config::default();
        let mut draft = RepoStateDraft::new(PathBuf::from("/repo"));
        draft.ongoing_rebase = true;
        draft.conflicts.push(ConflictDetail {
            path: PathBuf::from("blob.bin"),
            hunk_count: 1,
            conflict_type: ConflictType::Binary,
            trivial_ratio: 0.0,
            preferred_resolution: None,
        });
        let state = draft.freeze(&config);
        let err = plan(&state, &goal(GoalMode::ResolveOnly), &config).unwrap_err();
        assert!(matches!(err, GoapError::NoPlan { reason: NoPlanReason::Unreachable }));
    }

    #[test]
    fn two_conflicts_one_trivial_one_binary_is_unreachable() {
        let mut config = Config::default();
        config.strategy.enable_rerere = true;
        let mut draft = RepoStateDraft::new(PathBuf::from("/repo"));
        draft.ongoing_rebase = true;
        draft.conflicts.push(ConflictDetail {
            path: PathBuf::from("whitespace.txt"),
            hunk_count: 1,
            conflict_type: ConflictType::Text,
            trivial_ratio: 1.0,
            preferred_resolution: None,
        });
        draft.conflicts.push(ConflictDetail {
            path: PathBuf::from("blob.bin"),
            hunk_count: 1,
            conflict_type: ConflictType::Binary,
            trivial_ratio: 0.0,
            preferred_resolution: None,
        });
        let state = draft.freeze(&config);
        let err = plan(&state, &goal(GoalMode::ResolveOnly), &config).unwrap_err();
        assert!(matches!(err, GoapError::NoPlan { reason: NoPlanReason::Unreachable }));
    }

    #[test]
    fn determinism_same_inputs_yield_byte_identical_plans() {
        let config = Config::default();
        let mut draft = RepoStateDraft::new(PathBuf::from("/repo"));
        draft.working_tree_clean = false;
        let state = draft.freeze(&config);
        let a = plan(&state, &goal(GoalMode::ResolveOnly), &config).unwrap();
        let b = plan(&state, &goal(GoalMode::ResolveOnly), &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn force_push_blocked_without_allow_force_push_is_unreachable() {
        let config = Config::default();
        let mut draft = RepoStateDraft::new(PathBuf::from("/repo"));
        draft.has_unpushed_commits = true;
        let state = draft.freeze(&config);
        let goal_spec = GoalConfig { mode: GoalMode::ResolveOnly, tests_must_pass: false, push_with_lease: true };
        let err = plan(&state, &goal_spec, &config).unwrap_err();
        assert!(matches!(err, GoapError::NoPlan { reason: NoPlanReason::Unreachable }));
    }

    #[test]
    fn zero_max_expansions_yields_exhausted_expansions() {
        let mut config = Config::default();
        config.planner.max_expansions = 0;
        let mut draft = RepoStateDraft::new(PathBuf::from("/repo"));
        draft.working_tree_clean = false;
        let state = draft.freeze(&config);
        let err = plan(&state, &goal(GoalMode::ResolveOnly), &config).unwrap_err();
        assert!(matches!(err, GoapError::NoPlan { reason: NoPlanReason::ExhaustedExpansions }));
    }
}

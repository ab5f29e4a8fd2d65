//! The eleven registered actions.
//!
//! Each action is a plain set of four pure functions plus an execute hook;
//! see [`crate::action::RegisteredAction`]. [`registry`] builds the fixed,
//! ordered `Vec` the planner iterates — fixed order matters for
//! determinism when two actions tie on `f`/`h`.

use std::path::Path;
use std::time::Duration;

use glob::Pattern;

use crate::action::{ExecutionContext, PlanningContext, RegisteredAction};
use crate::config::{Config, Resolution};
use crate::error::GoapError;
use crate::state::{ConflictDetail, ConflictType, RepoState, RepoStateDraft, RiskLevel, TestsResult};

/// Cost multiplier applied on top of an action's base cost when the
/// pre-action state's risk level is elevated.
const fn risk_multiplier(risk: RiskLevel) -> f64 {
    match risk {
        RiskLevel::Low => 1.0,
        RiskLevel::Medium => 1.25,
        RiskLevel::High => 1.75,
    }
}

/// Build the fixed, ordered action registry.
#[must_use]
pub fn registry() -> Vec<RegisteredAction> {
    vec![
        RegisteredAction {
            name: "BackupRef",
            applicable: backup_ref::applicable,
            predict: backup_ref::predict,
            cost: backup_ref::cost,
            execute: backup_ref::execute,
        },
        RegisteredAction {
            name: "EnsureClean",
            applicable: ensure_clean::applicable,
            predict: ensure_clean::predict,
            cost: ensure_clean::cost,
            execute: ensure_clean::execute,
        },
        RegisteredAction {
            name: "FetchAll",
            applicable: fetch_all::applicable,
            predict: fetch_all::predict,
            cost: fetch_all::cost,
            execute: fetch_all::execute,
        },
        RegisteredAction {
            name: "RebaseOntoUpstream",
            applicable: rebase_onto_upstream::applicable,
            predict: rebase_onto_upstream::predict,
            cost: rebase_onto_upstream::cost,
            execute: rebase_onto_upstream::execute,
        },
        RegisteredAction {
            name: "AutoTrivialResolve",
            applicable: auto_trivial_resolve::applicable,
            predict: auto_trivial_resolve::predict,
            cost: auto_trivial_resolve::cost,
            execute: auto_trivial_resolve::execute,
        },
        RegisteredAction {
            name: "ApplyPathStrategy",
            applicable: apply_path_strategy::applicable,
            predict: apply_path_strategy::predict,
            cost: apply_path_strategy::cost,
            execute: apply_path_strategy::execute,
        },
        RegisteredAction {
            name: "UseMergeDriver",
            applicable: use_merge_driver::applicable,
            predict: use_merge_driver::predict,
            cost: use_merge_driver::cost,
            execute: use_merge_driver::execute,
        },
        RegisteredAction {
            name: "RebaseContinue",
            applicable: rebase_continue::applicable,
            predict: rebase_continue::predict,
            cost: rebase_continue::cost,
            execute: rebase_continue::execute,
        },
        RegisteredAction {
            name: "RebaseAbort",
            applicable: rebase_abort::applicable,
            predict: rebase_abort::predict,
            cost: rebase_abort::cost,
            execute: rebase_abort::execute,
        },
        RegisteredAction {
            name: "RunTests",
            applicable: run_tests::applicable,
            predict: run_tests::predict,
            cost: run_tests::cost,
            execute: run_tests::execute,
        },
        RegisteredAction {
            name: "PushWithLease",
            applicable: push_with_lease::applicable,
            predict: push_with_lease::predict,
            cost: push_with_lease::cost,
            execute: push_with_lease::execute,
        },
    ]
}

/// Find a matching [`crate::config::PathRule`] for `path`, in configured
/// order (first match wins).
pub(crate) fn matching_rule<'a>(path: &Path, rules: &'a [crate::config::PathRule]) -> Option<&'a crate::config::PathRule> {
    rules.iter().find(|rule| {
        Pattern::new(&rule.pattern).is_ok_and(|pattern| pattern.matches_path(path))
    })
}

mod backup_ref {
    use super::{Config, ExecutionContext, GoapError, PlanningContext, RepoState, RepoStateDraft};

    pub fn applicable(_s: &RepoState, _c: &Config, _ctx: &PlanningContext) -> bool {
        true
    }

    pub fn predict(s: &RepoState, c: &Config, _ctx: &PlanningContext) -> RepoState {
        RepoStateDraft::from_state(s).freeze(c)
    }

    pub fn cost(s: &RepoState, _c: &Config, _ctx: &PlanningContext) -> f64 {
        0.5 * super::risk_multiplier(s.risk_level)
    }

    pub fn execute(s: &RepoState, _c: &Config, ctx: &mut ExecutionContext<'_>) -> Result<(), GoapError> {
        let timestamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
        let refname = format!("refs/backup/goap/{timestamp}");
        let target = s.current_ref.name.clone().unwrap_or_else(|| "HEAD".to_owned());
        let argv = vec!["update-ref".to_owned(), refname, target];
        ctx.facade.run(&argv, ctx.repo_root, ctx.mutating_timeout, ctx.dry_run)?;
        Ok(())
    }
}

mod ensure_clean {
    use super::{Config, ExecutionContext, GoapError, PlanningContext, RepoState, RepoStateDraft};

    pub fn applicable(s: &RepoState, _c: &Config, _ctx: &PlanningContext) -> bool {
        !s.working_tree_clean && s.conflicts.is_empty()
    }

    pub fn predict(s: &RepoState, c: &Config, _ctx: &PlanningContext) -> RepoState {
        let mut draft = RepoStateDraft::from_state(s);
        draft.working_tree_clean = true;
        draft.staged_changes = false;
        draft.stash_entries += 1;
        draft.freeze(c)
    }

    pub fn cost(s: &RepoState, _c: &Config, _ctx: &PlanningContext) -> f64 {
        1.0 * super::risk_multiplier(s.risk_level)
    }

    pub fn execute(_s: &RepoState, _c: &Config, ctx: &mut ExecutionContext<'_>) -> Result<(), GoapError> {
        let argv = vec!["stash".to_owned(), "push".to_owned(), "--include-untracked".to_owned()];
        ctx.facade.run(&argv, ctx.repo_root, ctx.mutating_timeout, ctx.dry_run)?;
        Ok(())
    }
}

mod fetch_all {
    use super::{Config, ExecutionContext, GoapError, PlanningContext, RepoState, RepoStateDraft};

    pub fn applicable(_s: &RepoState, _c: &Config, _ctx: &PlanningContext) -> bool {
        true
    }

    pub fn predict(s: &RepoState, c: &Config, _ctx: &PlanningContext) -> RepoState {
        let mut draft = RepoStateDraft::from_state(s);
        draft.seconds_since_fetch = Some(0);
        draft.freeze(c)
    }

    pub fn cost(s: &RepoState, _c: &Config, _ctx: &PlanningContext) -> f64 {
        (0.5 + 0.1 * s.staleness_score) * super::risk_multiplier(s.risk_level)
    }

    pub fn execute(_s: &RepoState, _c: &Config, ctx: &mut ExecutionContext<'_>) -> Result<(), GoapError> {
        let argv = vec!["fetch".to_owned(), "--prune".to_owned(), "--tags".to_owned()];
        ctx.facade.run(&argv, ctx.repo_root, ctx.mutating_timeout, ctx.dry_run)?;
        Ok(())
    }
}

mod rebase_onto_upstream {
    use super::{Config, ExecutionContext, GoapError, PlanningContext, RepoState, RepoStateDraft};
    use crate::state::ConflictDetail;

    pub fn applicable(s: &RepoState, _c: &Config, _ctx: &PlanningContext) -> bool {
        s.diverged_remote > 0 && !s.ongoing_rebase && s.working_tree_clean
    }

    fn predicted_conflicts(s: &RepoState, ctx: &PlanningContext) -> Vec<ConflictDetail> {
        let (Some(onto), Some(from)) =
            (s.current_ref.upstream_commit.as_deref(), s.current_ref.commit.as_deref())
        else {
            return Vec::new();
        };
        let preview = ctx.merge_preview(onto, from);
        preview
            .conflicts
            .into_iter()
            .map(|path| {
                let kind = goap_git::conflict::classify_path(&path);
                ConflictDetail {
                    path,
                    hunk_count: 1,
                    conflict_type: kind.into(),
                    trivial_ratio: 0.0,
                    preferred_resolution: None,
                }
            })
            .collect()
    }

    pub fn predict(s: &RepoState, c: &Config, ctx: &PlanningContext) -> RepoState {
        let mut draft = RepoStateDraft::from_state(s);
        draft.ongoing_rebase = true;
        draft.conflicts = predicted_conflicts(s, ctx);
        draft.working_tree_clean = draft.conflicts.is_empty();
        draft.freeze(c)
    }

    pub fn cost(s: &RepoState, _c: &Config, ctx: &PlanningContext) -> f64 {
        let predicted = predicted_conflicts(s, ctx);
        let difficulty: f64 = predicted
            .iter()
            .map(|c| f64::from(c.hunk_count) * (1.0 - c.trivial_ratio) * c.conflict_type.difficulty_weight())
            .sum();
        (2.0 + difficulty) * super::risk_multiplier(s.risk_level)
    }

    pub fn execute(s: &RepoState, _c: &Config, ctx: &mut ExecutionContext<'_>) -> Result<(), GoapError> {
        let upstream = s.current_ref.upstream.clone().unwrap_or_else(|| "@{upstream}".to_owned());
        let argv = vec!["rebase".to_owned(), "--update-refs".to_owned(), upstream];
        ctx.facade.run(&argv, ctx.repo_root, ctx.mutating_timeout, ctx.dry_run)?;
        Ok(())
    }
}

mod auto_trivial_resolve {
    use super::{Config, ExecutionContext, GoapError, PlanningContext, RepoState, RepoStateDraft};

    pub fn applicable(s: &RepoState, c: &Config, _ctx: &PlanningContext) -> bool {
        s.ongoing_rebase && !s.conflicts.is_empty() && c.strategy.enable_rerere
            && s.conflicts.iter().any(|conflict| conflict.trivial_ratio > 0.0)
    }

    pub fn predict(s: &RepoState, c: &Config, _ctx: &PlanningContext) -> RepoState {
        let mut draft = RepoStateDraft::from_state(s);
        draft.conflicts.retain(|conflict| conflict.trivial_ratio <= 0.0);
        draft.working_tree_clean = draft.conflicts.is_empty() && draft.ongoing_rebase;
        draft.freeze(c)
    }

    pub fn cost(s: &RepoState, _c: &Config, _ctx: &PlanningContext) -> f64 {
        let hunks: u32 = s.conflicts.iter().filter(|c| c.trivial_ratio > 0.0).map(|c| c.hunk_count).sum();
        f64::from(hunks).max(1.0) * 0.3 * super::risk_multiplier(s.risk_level)
    }

    pub fn execute(_s: &RepoState, _c: &Config, ctx: &mut ExecutionContext<'_>) -> Result<(), GoapError> {
        let argv = vec!["rerere".to_owned()];
        ctx.facade.run(&argv, ctx.repo_root, ctx.mutating_timeout, ctx.dry_run)?;
        Ok(())
    }
}

mod apply_path_strategy {
    use super::{matching_rule, Config, ExecutionContext, GoapError, PlanningContext, RepoState, RepoStateDraft, Resolution};

    pub fn applicable(s: &RepoState, c: &Config, _ctx: &PlanningContext) -> bool {
        !s.conflicts.is_empty()
            && s.conflicts.iter().any(|conflict| {
                matching_rule(&conflict.path, &c.strategy.rules)
                    .is_some_and(|rule| !matches!(rule.resolution, Resolution::MergeDriver(_)))
            })
    }

    pub fn predict(s: &RepoState, c: &Config, _ctx: &PlanningContext) -> RepoState {
        let mut draft = RepoStateDraft::from_state(s);
        draft.conflicts.retain(|conflict| {
            !matching_rule(&conflict.path, &c.strategy.rules)
                .is_some_and(|rule| !matches!(rule.resolution, Resolution::MergeDriver(_)))
        });
        draft.working_tree_clean = draft.conflicts.is_empty() && draft.ongoing_rebase;
        draft.freeze(c)
    }

    pub fn cost(s: &RepoState, _c: &Config, _ctx: &PlanningContext) -> f64 {
        1.5 * super::risk_multiplier(s.risk_level)
    }

    pub fn execute(s: &RepoState, c: &Config, ctx: &mut ExecutionContext<'_>) -> Result<(), GoapError> {
        for conflict in &s.conflicts {
            let Some(rule) = matching_rule(&conflict.path, &c.strategy.rules) else { continue };
            let flag = match &rule.resolution {
                Resolution::Ours => "--ours",
                Resolution::Theirs => "--theirs",
                Resolution::MergeDriver(_) => continue,
            };
            let path_arg = conflict.path.to_string_lossy().into_owned();
            let checkout = vec!["checkout".to_owned(), flag.to_owned(), "--".to_owned(), path_arg.clone()];
            ctx.facade.run(&checkout, ctx.repo_root, ctx.mutating_timeout, ctx.dry_run)?;
            let add = vec!["add".to_owned(), "--".to_owned(), path_arg];
            ctx.facade.run(&add, ctx.repo_root, ctx.mutating_timeout, ctx.dry_run)?;
        }
        Ok(())
    }
}

mod use_merge_driver {
    use super::{matching_rule, Config, ExecutionContext, GoapError, PlanningContext, RepoState, RepoStateDraft, Resolution};
    use crate::state::ConflictType;

    fn driver_matches(conflict: &crate::state::ConflictDetail, rules: &[crate::config::PathRule]) -> bool {
        matches!(conflict.conflict_type, ConflictType::Json | ConflictType::Yaml)
            && matching_rule(&conflict.path, rules).is_some_and(|rule| matches!(rule.resolution, Resolution::MergeDriver(_)))
    }

    pub fn applicable(s: &RepoState, c: &Config, _ctx: &PlanningContext) -> bool {
        !s.conflicts.is_empty() && s.conflicts.iter().any(|conflict| driver_matches(conflict, &c.strategy.rules))
    }

    pub fn predict(s: &RepoState, c: &Config, _ctx: &PlanningContext) -> RepoState {
        let mut draft = RepoStateDraft::from_state(s);
        draft.conflicts.retain(|conflict| !driver_matches(conflict, &c.strategy.rules));
        draft.working_tree_clean = draft.conflicts.is_empty() && draft.ongoing_rebase;
        draft.freeze(c)
    }

    pub fn cost(s: &RepoState, _c: &Config, _ctx: &PlanningContext) -> f64 {
        2.0 * super::risk_multiplier(s.risk_level)
    }

    pub fn execute(s: &RepoState, c: &Config, ctx: &mut ExecutionContext<'_>) -> Result<(), GoapError> {
        for conflict in &s.conflicts {
            if !driver_matches(conflict, &c.strategy.rules) {
                continue;
            }
            let Some(rule) = matching_rule(&conflict.path, &c.strategy.rules) else { continue };
            let Resolution::MergeDriver(name) = &rule.resolution else { continue };
            let key = format!("merge.{name}.driver");
            let argv = vec!["config".to_owned(), "--get".to_owned(), key];
            ctx.facade.run(&argv, ctx.repo_root, ctx.observation_timeout, false)?;
            let path_arg = conflict.path.to_string_lossy().into_owned();
            let add = vec!["add".to_owned(), "--".to_owned(), path_arg];
            ctx.facade.run(&add, ctx.repo_root, ctx.mutating_timeout, ctx.dry_run)?;
        }
        Ok(())
    }
}

mod rebase_continue {
    use super::{Config, ExecutionContext, GoapError, PlanningContext, RepoState, RepoStateDraft};

    pub fn applicable(s: &RepoState, _c: &Config, _ctx: &PlanningContext) -> bool {
        s.ongoing_rebase && s.conflicts.is_empty()
    }

    pub fn predict(s: &RepoState, c: &Config, _ctx: &PlanningContext) -> RepoState {
        let mut draft = RepoStateDraft::from_state(s);
        draft.ongoing_rebase = false;
        draft.diverged_remote = 0;
        draft.working_tree_clean = true;
        draft.has_unpushed_commits = true;
        draft.freeze(c)
    }

    pub fn cost(s: &RepoState, _c: &Config, _ctx: &PlanningContext) -> f64 {
        0.5 * super::risk_multiplier(s.risk_level)
    }

    pub fn execute(_s: &RepoState, _c: &Config, ctx: &mut ExecutionContext<'_>) -> Result<(), GoapError> {
        let argv = vec!["rebase".to_owned(), "--continue".to_owned()];
        ctx.facade.run(&argv, ctx.repo_root, ctx.mutating_timeout, ctx.dry_run)?;
        Ok(())
    }
}

mod rebase_abort {
    use super::{Config, ExecutionContext, GoapError, PlanningContext, RepoState, RepoStateDraft};

    /// "Irrecoverable" is taken conservatively: only ever applicable when
    /// the operator has opted in via `safety.allow_auto_abort` (open
    /// question (b) — repeated drift otherwise always surfaces as
    /// `exhausted_replans` instead of auto-aborting).
    pub fn applicable(s: &RepoState, c: &Config, _ctx: &PlanningContext) -> bool {
        s.ongoing_rebase && c.safety.allow_auto_abort && !s.conflicts.is_empty()
    }

    pub fn predict(s: &RepoState, c: &Config, _ctx: &PlanningContext) -> RepoState {
        let mut draft = RepoStateDraft::from_state(s);
        draft.ongoing_rebase = false;
        draft.conflicts.clear();
        draft.working_tree_clean = true;
        draft.freeze(c)
    }

    pub fn cost(s: &RepoState, _c: &Config, _ctx: &PlanningContext) -> f64 {
        8.0 * super::risk_multiplier(s.risk_level)
    }

    pub fn execute(_s: &RepoState, _c: &Config, ctx: &mut ExecutionContext<'_>) -> Result<(), GoapError> {
        let argv = vec!["rebase".to_owned(), "--abort".to_owned()];
        ctx.facade.run(&argv, ctx.repo_root, ctx.mutating_timeout, ctx.dry_run)?;
        Ok(())
    }
}

mod run_tests {
    use std::io::Read as _;
    use std::process::{Command, Stdio};
    use std::time::{Duration, Instant};

    use super::{Config, ExecutionContext, GoapError, PlanningContext, RepoState, RepoStateDraft, TestsResult};

    /// Poll interval while waiting for the test script to exit or time out,
    /// matching the facade's own subprocess poll loop.
    const POLL_INTERVAL: Duration = Duration::from_millis(50);

    pub fn applicable(s: &RepoState, c: &Config, _ctx: &PlanningContext) -> bool {
        s.working_tree_clean && c.goal.tests_must_pass && s.tests_last_result != TestsResult::Passed
    }

    /// Optimistic by construction: the planner cannot know the outcome of a
    /// test run in advance, so it predicts success. A real failure is
    /// caught by the executor's drift comparator and triggers a replan.
    pub fn predict(s: &RepoState, c: &Config, _ctx: &PlanningContext) -> RepoState {
        let mut draft = RepoStateDraft::from_state(s);
        draft.tests_last_result = TestsResult::Passed;
        draft.freeze(c)
    }

    pub fn cost(s: &RepoState, c: &Config, _ctx: &PlanningContext) -> f64 {
        (c.safety.max_test_runtime_sec as f64 / 60.0).max(1.0) * super::risk_multiplier(s.risk_level)
    }

    /// The actual test *command* is a host-project concern external to the
    /// core; this hook only knows the conventional script name and the
    /// configured timeout. A repository with no such script vacuously
    /// passes rather than blocking the whole plan on a command that
    /// doesn't exist.
    ///
    /// The subprocess facade only ever spawns `git`, by contract, so the
    /// script is run with a direct `Command`, not through it; its own
    /// poll-and-timeout loop mirrors the facade's.
    pub fn execute(_s: &RepoState, c: &Config, ctx: &mut ExecutionContext<'_>) -> Result<(), GoapError> {
        if ctx.dry_run {
            return Ok(());
        }
        let script = ctx.repo_root.join("gitgoap-test.sh");
        if !script.is_file() {
            return Ok(());
        }
        let timeout = Duration::from_secs(c.safety.max_test_runtime_sec);
        run_script(&script, ctx.repo_root, timeout)
    }

    fn run_script(script: &std::path::Path, cwd: &std::path::Path, timeout: Duration) -> Result<(), GoapError> {
        let mut child = Command::new("sh")
            .arg(script)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| GoapError::Parse { source: "I/O".to_owned(), detail: e.to_string() })?;

        let start = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    if status.success() {
                        return Ok(());
                    }
                    let mut stderr = String::new();
                    if let Some(mut pipe) = child.stderr.take() {
                        let _ = pipe.read_to_string(&mut stderr);
                    }
                    return Err(GoapError::ExternalFailure { code: status.code().unwrap_or(-1), stderr });
                }
                Ok(None) => {
                    if start.elapsed() >= timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(GoapError::ExternalTimeout);
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(GoapError::Parse { source: "I/O".to_owned(), detail: e.to_string() }),
            }
        }
    }
}

mod push_with_lease {
    use super::{Config, ExecutionContext, GoapError, PlanningContext, RepoState, RepoStateDraft};

    pub fn applicable(s: &RepoState, c: &Config, _ctx: &PlanningContext) -> bool {
        s.has_unpushed_commits && c.safety.allow_force_push
    }

    pub fn predict(s: &RepoState, c: &Config, _ctx: &PlanningContext) -> RepoState {
        let mut draft = RepoStateDraft::from_state(s);
        draft.has_unpushed_commits = false;
        draft.freeze(c)
    }

    pub fn cost(s: &RepoState, _c: &Config, _ctx: &PlanningContext) -> f64 {
        1.5 * super::risk_multiplier(s.risk_level)
    }

    pub fn execute(s: &RepoState, c: &Config, ctx: &mut ExecutionContext<'_>) -> Result<(), GoapError> {
        if !c.safety.allow_force_push {
            return Err(GoapError::PolicyViolation { rule: "safety.allow_force_push = false".to_owned() });
        }
        let branch = s.current_ref.name.clone().unwrap_or_else(|| "HEAD".to_owned());
        let argv = vec!["push".to_owned(), "--force-with-lease".to_owned(), "origin".to_owned(), branch];
        ctx.facade.run(&argv, ctx.repo_root, ctx.mutating_timeout, ctx.dry_run)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, PathRule, Resolution};
    use std::path::PathBuf;

    fn planning_context() -> PlanningContext {
        PlanningContext::new(PathBuf::from("/repo"), Duration::from_secs(5))
    }

    fn clean_state(config: &Config) -> RepoState {
        RepoStateDraft::new(PathBuf::from("/repo")).freeze(config)
    }

    #[test]
    fn ensure_clean_not_applicable_when_tree_already_clean() {
        let config = Config::default();
        let ctx = planning_context();
        assert!(!ensure_clean::applicable(&clean_state(&config), &config, &ctx));
    }

    #[test]
    fn ensure_clean_stashes_and_cleans() {
        let config = Config::default();
        let ctx = planning_context();
        let mut draft = RepoStateDraft::new(PathBuf::from("/repo"));
        draft.working_tree_clean = false;
        let dirty = draft.freeze(&config);
        assert!(ensure_clean::applicable(&dirty, &config, &ctx));
        let next = ensure_clean::predict(&dirty, &config, &ctx);
        assert!(next.working_tree_clean);
        assert_eq!(next.stash_entries, 1);
    }

    #[test]
    fn rebase_continue_requires_empty_conflicts() {
        let config = Config::default();
        let ctx = planning_context();
        let mut draft = RepoStateDraft::new(PathBuf::from("/repo"));
        draft.ongoing_rebase = true;
        draft.conflicts.push(ConflictDetail {
            path: PathBuf::from("a.rs"),
            hunk_count: 1,
            conflict_type: ConflictType::Text,
            trivial_ratio: 0.0,
            preferred_resolution: None,
        });
        let state = draft.freeze(&config);
        assert!(!rebase_continue::applicable(&state, &config, &ctx));
    }

    #[test]
    fn rebase_continue_clears_rebase_flag_and_divergence() {
        let config = Config::default();
        let ctx = planning_context();
        let mut draft = RepoStateDraft::new(PathBuf::from("/repo"));
        draft.ongoing_rebase = true;
        draft.diverged_remote = 3;
        let state = draft.freeze(&config);
        assert!(rebase_continue::applicable(&state, &config, &ctx));
        let next = rebase_continue::predict(&state, &config, &ctx);
        assert!(!next.ongoing_rebase);
        assert_eq!(next.diverged_remote, 0);
        assert!(next.has_unpushed_commits);
    }

    #[test]
    fn apply_path_strategy_removes_matched_conflicts_only() {
        let mut config = Config::default();
        config.strategy.rules.push(PathRule {
            pattern: "**/*.lock".to_owned(),
            resolution: Resolution::Theirs,
            when: None,
        });
        let ctx = planning_context();
        let mut draft = RepoStateDraft::new(PathBuf::from("/repo"));
        draft.ongoing_rebase = true;
        draft.conflicts.push(ConflictDetail {
            path: PathBuf::from("Cargo.lock"),
            hunk_count: 1,
            conflict_type: ConflictType::Lock,
            trivial_ratio: 0.0,
            preferred_resolution: None,
        });
        draft.conflicts.push(ConflictDetail {
            path: PathBuf::from("src/lib.rs"),
            hunk_count: 1,
            conflict_type: ConflictType::Text,
            trivial_ratio: 0.0,
            preferred_resolution: None,
        });
        let state = draft.freeze(&config);
        assert!(apply_path_strategy::applicable(&state, &config, &ctx));
        let next = apply_path_strategy::predict(&state, &config, &ctx);
        assert_eq!(next.conflicts.len(), 1);
        assert_eq!(next.conflicts[0].path, PathBuf::from("src/lib.rs"));
    }

    #[test]
    fn push_with_lease_blocked_without_allow_force_push() {
        let config = Config::default();
        let ctx = planning_context();
        let mut draft = RepoStateDraft::new(PathBuf::from("/repo"));
        draft.has_unpushed_commits = true;
        let state = draft.freeze(&config);
        assert!(!push_with_lease::applicable(&state, &config, &ctx));
    }

    #[test]
    fn rebase_abort_requires_explicit_opt_in() {
        let config = Config::default();
        let ctx = planning_context();
        let mut draft = RepoStateDraft::new(PathBuf::from("/repo"));
        draft.ongoing_rebase = true;
        draft.conflicts.push(ConflictDetail {
            path: PathBuf::from("a.rs"),
            hunk_count: 1,
            conflict_type: ConflictType::Binary,
            trivial_ratio: 0.0,
            preferred_resolution: None,
        });
        let state = draft.freeze(&config);
        assert!(!rebase_abort::applicable(&state, &config, &ctx));
    }

    #[test]
    fn run_tests_execute_passes_on_zero_exit_script() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gitgoap-test.sh"), "#!/bin/sh\nexit 0\n").unwrap();
        let mut facade = goap_git::facade::SubprocessFacade::new();
        let mut ctx = ExecutionContext {
            facade: &mut facade,
            repo_root: dir.path(),
            mutating_timeout: Duration::from_secs(5),
            observation_timeout: Duration::from_secs(5),
            dry_run: false,
        };
        let config = Config::default();
        let state = clean_state(&config);
        assert!(run_tests::execute(&state, &config, &mut ctx).is_ok());
    }

    #[test]
    fn run_tests_execute_fails_on_nonzero_exit_script() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gitgoap-test.sh"), "#!/bin/sh\nexit 7\n").unwrap();
        let mut facade = goap_git::facade::SubprocessFacade::new();
        let mut ctx = ExecutionContext {
            facade: &mut facade,
            repo_root: dir.path(),
            mutating_timeout: Duration::from_secs(5),
            observation_timeout: Duration::from_secs(5),
            dry_run: false,
        };
        let config = Config::default();
        let state = clean_state(&config);
        let err = run_tests::execute(&state, &config, &mut ctx).unwrap_err();
        assert!(matches!(err, GoapError::ExternalFailure { code: 7, .. }));
    }

    #[test]
    fn run_tests_execute_skips_when_script_absent() {
        let dir = tempfile::tempdir().unwrap();
        let mut facade = goap_git::facade::SubprocessFacade::new();
        let mut ctx = ExecutionContext {
            facade: &mut facade,
            repo_root: dir.path(),
            mutating_timeout: Duration::from_secs(5),
            observation_timeout: Duration::from_secs(5),
            dry_run: false,
        };
        let config = Config::default();
        let state = clean_state(&config);
        assert!(run_tests::execute(&state, &config, &mut ctx).is_ok());
    }

    #[test]
    fn all_actions_produce_non_negative_counters() {
        let config = Config::default();
        let ctx = planning_context();
        let state = clean_state(&config);
        for action in registry() {
            if (action.applicable)(&state, &config, &ctx) {
                let next = (action.predict)(&state, &config, &ctx);
                assert_eq!(next.risk_level, crate::state::RepoStateDraft::from_state(&next).freeze(&config).risk_level);
                assert!((action.cost)(&state, &config, &ctx) >= 0.0);
            }
        }
    }
}

//! End-to-end scenarios driven against real temporary git repositories,
//! exercising the observer, planner, and executor together the way
//! `gitgoap run`/`gitgoap plan` would against a checkout on disk. Pure-state
//! planner behavior (unreachable goals, exhausted search limits,
//! determinism) is already covered generatively in `src/proptests.rs` and
//! by the `#[cfg(test)]` modules next to `planner.rs`/`executor.rs`; these
//! tests instead confirm the real git plumbing underneath each action does
//! what its `predict` promises.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::AtomicBool;

use tempfile::TempDir;

use gitgoap::config::{Config, GoalConfig, GoalMode, PathRule, Resolution};
use gitgoap::executor::Executor;
use gitgoap::observer;
use gitgoap::planner;
use gitgoap::report::TerminalStatus;
use gitgoap::Plan;
use goap_git::facade::SubprocessFacade;

fn run_git(dir: &Path, args: &[&str]) {
    let status = Command::new("git").args(args).current_dir(dir).status().unwrap();
    assert!(status.success(), "git {args:?} failed in {}", dir.display());
}

fn git_stdout(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git").args(args).current_dir(dir).output().unwrap();
    assert!(output.status.success(), "git {args:?} failed in {}", dir.display());
    String::from_utf8(output.stdout).unwrap().trim().to_owned()
}

fn init_bare_remote() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    run_git(dir.path(), &["init", "--quiet", "--bare", "--initial-branch=main"]);
    dir
}

/// Clones `remote` into a fresh tempdir and configures a commit identity.
/// Returns the tempdir (kept alive by the caller) and the clone's path.
fn clone_repo(remote: &Path, name: &str) -> (TempDir, PathBuf) {
    let holder = tempfile::tempdir().unwrap();
    let dest = holder.path().join(name);
    run_git(holder.path(), &["clone", "--quiet", remote.to_str().unwrap(), dest.to_str().unwrap()]);
    run_git(&dest, &["config", "user.email", "test@example.com"]);
    run_git(&dest, &["config", "user.name", "Test"]);
    (holder, dest)
}

fn commit_file(dir: &Path, name: &str, content: &str, message: &str) {
    std::fs::write(dir.join(name), content).unwrap();
    run_git(dir, &["add", "."]);
    run_git(dir, &["commit", "--quiet", "-m", message]);
}

fn resolve_only() -> GoalConfig {
    GoalConfig { mode: GoalMode::ResolveOnly, tests_must_pass: false, push_with_lease: false }
}

/// Scenario A: a clean working tree already level with its upstream needs
/// no actions at all.
#[test]
fn clean_repo_already_on_upstream_needs_no_plan() {
    let origin = init_bare_remote();
    let (_work_holder, work) = clone_repo(origin.path(), "work");
    commit_file(&work, "README.md", "hello\n", "initial");
    run_git(&work, &["push", "--quiet", "-u", "origin", "main"]);

    let config = Config::default();
    let mut facade = SubprocessFacade::new();
    let state = observer::observe(&mut facade, &work, &config).unwrap();
    assert_eq!(planner::plan(&state, &config.goal, &config).unwrap(), Plan::empty());

    let cancel = AtomicBool::new(false);
    let mut executor = Executor::new();
    let report = executor.execute(&work, &config, &cancel);
    assert_eq!(report.terminal, TerminalStatus::GoalReached);
    assert_eq!(report.exit_code(), 0);
}

/// Scenario B: behind the upstream by several commits with a clean tree —
/// the executor fetches (if it chooses to) and rebases onto the upstream
/// tip, reaching a `rebase_to_upstream` goal with no conflicts.
#[test]
fn behind_by_three_with_clean_tree_rebases_onto_upstream() {
    let origin = init_bare_remote();
    let (_work_holder, work) = clone_repo(origin.path(), "work");
    commit_file(&work, "README.md", "hello\n", "initial");
    run_git(&work, &["push", "--quiet", "-u", "origin", "main"]);

    let (_other_holder, other) = clone_repo(origin.path(), "other");
    for i in 0..3 {
        commit_file(&other, &format!("file{i}.txt"), &format!("{i}\n"), &format!("upstream commit {i}"));
    }
    run_git(&other, &["push", "--quiet", "origin", "main"]);

    // Refresh work's remote-tracking ref without touching its local history,
    // so `status --ahead-behind` reports the real divergence.
    run_git(&work, &["fetch", "--quiet", "origin"]);

    let mut config = Config::default();
    config.goal = GoalConfig { mode: GoalMode::RebaseToUpstream, tests_must_pass: false, push_with_lease: false };

    let mut facade = SubprocessFacade::new();
    let observed = observer::observe(&mut facade, &work, &config).unwrap();
    assert_eq!(observed.diverged_remote, 3);
    assert!(observed.working_tree_clean);

    let cancel = AtomicBool::new(false);
    let mut executor = Executor::new();
    let report = executor.execute(&work, &config, &cancel);
    assert_eq!(report.terminal, TerminalStatus::GoalReached, "records: {:?}", report.records);
    assert_eq!(report.exit_code(), 0);

    let local_head = git_stdout(&work, &["rev-parse", "HEAD"]);
    let upstream_head = git_stdout(origin.path(), &["rev-parse", "main"]);
    assert_eq!(local_head, upstream_head);
}

/// Scenario C: a rebase already in progress with a single lockfile conflict
/// and a configured path rule resolves via `ApplyPathStrategy` followed by
/// `RebaseContinue`, without operator intervention.
#[test]
fn in_progress_rebase_with_lockfile_conflict_resolves_via_rule() {
    let origin = init_bare_remote();
    let (_work_holder, work) = clone_repo(origin.path(), "work");
    commit_file(&work, "Cargo.lock", "base\n", "initial");
    run_git(&work, &["push", "--quiet", "-u", "origin", "main"]);

    let (_other_holder, other) = clone_repo(origin.path(), "other");
    commit_file(&other, "Cargo.lock", "theirs\n", "upstream lockfile change");
    run_git(&other, &["push", "--quiet", "origin", "main"]);

    commit_file(&work, "Cargo.lock", "ours\n", "local lockfile change");
    run_git(&work, &["fetch", "--quiet", "origin"]);

    // Start the rebase by hand so the executor picks up a genuinely
    // conflicted, already in-progress rebase rather than starting one.
    let rebase = Command::new("git").args(["rebase", "origin/main"]).current_dir(&work).status().unwrap();
    assert!(!rebase.success(), "expected the Cargo.lock change to conflict");

    let mut config = Config::default();
    config.strategy.rules.push(PathRule {
        pattern: "**/*.lock".to_owned(),
        resolution: Resolution::Theirs,
        when: None,
    });
    config.goal = resolve_only();

    let mut facade = SubprocessFacade::new();
    let observed = observer::observe(&mut facade, &work, &config).unwrap();
    assert!(observed.ongoing_rebase);
    assert_eq!(observed.conflicts.len(), 1);

    let cancel = AtomicBool::new(false);
    let mut executor = Executor::new();
    let report = executor.execute(&work, &config, &cancel);
    assert_eq!(report.terminal, TerminalStatus::GoalReached, "records: {:?}", report.records);
    assert_eq!(report.exit_code(), 0);

    let status_out = git_stdout(&work, &["status", "--porcelain"]);
    assert!(status_out.is_empty());
    let rebase_dir_gone = !work.join(".git").join("rebase-merge").exists() && !work.join(".git").join("rebase-apply").exists();
    assert!(rebase_dir_gone);
}

/// Scenario F: an unpushed commit with `push_with_lease` required but force
/// pushes disallowed by policy is unreachable — the planner refuses to plan
/// a `PushWithLease` step rather than silently ignoring the policy.
#[test]
fn unpushed_commit_with_force_push_disallowed_is_unreachable() {
    let origin = init_bare_remote();
    let (_work_holder, work) = clone_repo(origin.path(), "work");
    commit_file(&work, "README.md", "hello\n", "initial");
    run_git(&work, &["push", "--quiet", "-u", "origin", "main"]);
    commit_file(&work, "README.md", "changed\n", "local only change");

    let mut config = Config::default();
    config.goal = GoalConfig { mode: GoalMode::ResolveOnly, tests_must_pass: false, push_with_lease: true };
    assert!(!config.safety.allow_force_push);

    let mut facade = SubprocessFacade::new();
    let observed = observer::observe(&mut facade, &work, &config).unwrap();
    assert!(observed.has_unpushed_commits);

    let err = planner::plan(&observed, &config.goal, &config).unwrap_err();
    assert!(matches!(err, gitgoap::GoapError::NoPlan { .. }));
    assert_eq!(err.exit_code(), 3);
}

//! The observer: composes the facade, porcelain parser, and conflict
//! parser into one immutable [`RepoState`] snapshot.
//!
//! `observe` is referentially transparent given a fixed repository on disk
//! at a moment in time: it never mutates the repository and never retains
//! state between calls. It additionally takes the frozen [`Config`] (needed
//! for the configured path rules used to populate `preferred_resolution`
//! hints, and the staleness decay parameters `RepoStateDraft::freeze` uses)
//! without breaking that transparency, since `Config` is itself frozen
//! input.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use goap_git::conflict;
use goap_git::facade::SubprocessFacade;
use goap_git::porcelain;

use crate::actions::matching_rule;
use crate::config::Config;
use crate::error::GoapError;
use crate::state::{ConflictDetail, RepoRef, RepoState, RepoStateDraft, TestsResult};

/// Observe `repo_path` and return a frozen [`RepoState`].
///
/// `tests_last_result` is always reported as [`TestsResult::Unknown`] here:
/// git has no notion of a test result, so the executor overlays the result
/// of its own most recent `RunTests` invocation after observing; there is
/// no persistent history between runs, so the overlay is run-local, never
/// written to disk.
///
/// # Errors
/// Returns [`GoapError::Parse`] if git's output cannot be decoded, or
/// [`GoapError::ExternalFailure`]/[`GoapError::ExternalTimeout`] if a
/// required git invocation fails.
#[tracing::instrument(skip(facade, config), fields(repo = %repo_path.display()))]
pub fn observe(
    facade: &mut SubprocessFacade,
    repo_path: &Path,
    config: &Config,
) -> Result<RepoState, GoapError> {
    let timeout = Duration::from_secs(config.safety.observation_timeout_sec);

    let status = porcelain::status(facade, repo_path, timeout)?;
    let git_dir = porcelain::git_dir(facade, repo_path, timeout)?;
    let (ongoing_rebase, ongoing_merge) = porcelain::in_flight_state(&git_dir);
    let stash_entries = porcelain::stash_count(facade, repo_path, timeout)?;

    let mut conflicts = Vec::with_capacity(status.unmerged.len());
    for entry in &status.unmerged {
        let scanned = conflict::scan_conflict_file(repo_path, &entry.path)?;
        let preferred_resolution = matching_rule(&entry.path, &config.strategy.rules)
            .map(|rule| rule.resolution.to_string());
        conflicts.push(ConflictDetail {
            path: scanned.path,
            hunk_count: scanned.hunk_count,
            conflict_type: scanned.kind.into(),
            trivial_ratio: scanned.trivial_ratio,
            preferred_resolution,
        });
    }

    let upstream_commit = match status.branch.upstream.as_deref() {
        Some(upstream) => resolve_commit(facade, repo_path, upstream, timeout),
        None => None,
    };

    let mut draft = RepoStateDraft::new(repo_path.to_path_buf());
    draft.current_ref = RepoRef {
        name: status.branch.name.clone(),
        upstream: status.branch.upstream.clone(),
        commit: status.branch.oid.clone(),
        upstream_commit,
    };
    draft.diverged_local = status.branch.ahead;
    draft.diverged_remote = status.branch.behind;
    draft.working_tree_clean = status.working_tree_clean() && conflicts.is_empty();
    draft.staged_changes = status.has_staged_changes();
    draft.ongoing_rebase = ongoing_rebase;
    draft.ongoing_merge = ongoing_merge;
    draft.stash_entries = stash_entries;
    draft.conflicts = conflicts;
    draft.tests_last_result = TestsResult::Unknown;
    draft.has_unpushed_commits = status.branch.ahead > 0;
    draft.seconds_since_fetch = seconds_since_fetch(&git_dir);

    Ok(draft.freeze(config))
}

/// Resolve `rev` to a commit id without mutating anything. A resolution
/// failure (unknown upstream, detached remote, etc.) degrades to `None`
/// rather than aborting the whole observation: the merge-tree preview
/// simply has nothing to preview against until a later observation
/// resolves it.
fn resolve_commit(
    facade: &mut SubprocessFacade,
    repo_path: &Path,
    rev: &str,
    timeout: Duration,
) -> Option<String> {
    let argv = vec!["rev-parse".to_owned(), rev.to_owned()];
    facade.run_stdout(&argv, repo_path, timeout).ok().map(|s| s.trim().to_owned())
}

/// Seconds since `FETCH_HEAD` was last written, or `None` if it doesn't
/// exist (the repository has never been fetched).
fn seconds_since_fetch(git_dir: &Path) -> Option<u64> {
    let path: PathBuf = git_dir.join("FETCH_HEAD");
    let modified = std::fs::metadata(&path).ok()?.modified().ok()?;
    SystemTime::now().duration_since(modified).ok().map(|d| d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn init_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let run = |args: &[&str]| {
            let status = Command::new("git").args(args).current_dir(dir.path()).status().unwrap();
            assert!(status.success(), "git {args:?} failed");
        };
        run(&["init", "--quiet", "--initial-branch=main"]);
        run(&["config", "user.email", "test@example.com"]);
        run(&["config", "user.name", "Test"]);
        std::fs::write(dir.path().join("README.md"), "hello\n").unwrap();
        run(&["add", "."]);
        run(&["commit", "--quiet", "-m", "initial"]);
        dir
    }

    #[test]
    fn clean_repo_observes_as_clean_with_no_conflicts() {
        let dir = init_repo();
        let config = Config::default();
        let mut facade = SubprocessFacade::new();
        let state = observe(&mut facade, dir.path(), &config).unwrap();
        assert!(state.working_tree_clean);
        assert!(state.conflicts.is_empty());
        assert!(!state.ongoing_rebase);
        assert!(!state.ongoing_merge);
        assert_eq!(state.current_ref.name.as_deref(), Some("main"));
    }

    #[test]
    fn dirty_working_tree_is_not_clean() {
        let dir = init_repo();
        std::fs::write(dir.path().join("README.md"), "changed\n").unwrap();
        let config = Config::default();
        let mut facade = SubprocessFacade::new();
        let state = observe(&mut facade, dir.path(), &config).unwrap();
        assert!(!state.working_tree_clean);
    }

    #[test]
    fn observing_twice_in_succession_is_idempotent() {
        let dir = init_repo();
        let config = Config::default();
        let mut facade = SubprocessFacade::new();
        let a = observe(&mut facade, dir.path(), &config).unwrap();
        let b = observe(&mut facade, dir.path(), &config).unwrap();
        assert_eq!(a, b);
    }
}

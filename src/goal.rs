//! The goal predicate, `GoalSpec`.

use crate::config::GoalConfig;
use crate::state::{RepoState, TestsResult};

/// `true` iff `state` satisfies `goal`.
#[must_use]
pub fn satisfied(state: &RepoState, goal: &GoalConfig) -> bool {
    state.conflicts.is_empty()
        && !state.ongoing_rebase
        && !state.ongoing_merge
        && state.working_tree_clean
        && !state.staged_changes
        && (!goal.mode.requires_rebase() || state.diverged_remote == 0)
        && (!goal.tests_must_pass || state.tests_last_result == TestsResult::Passed)
        && (!goal.push_with_lease || !state.has_unpushed_commits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GoalMode;
    use std::path::PathBuf;

    fn clean_state() -> RepoState {
        crate::state::RepoStateDraft::new(PathBuf::from("/repo")).freeze(&crate::config::Config::default())
    }

    #[test]
    fn clean_state_satisfies_resolve_only() {
        let goal = GoalConfig { mode: GoalMode::ResolveOnly, tests_must_pass: false, push_with_lease: false };
        assert!(satisfied(&clean_state(), &goal));
    }

    #[test]
    fn diverged_remote_fails_rebase_to_upstream_goal() {
        let mut draft = crate::state::RepoStateDraft::new(PathBuf::from("/repo"));
        draft.diverged_remote = 2;
        let state = draft.freeze(&crate::config::Config::default());
        let goal = GoalConfig { mode: GoalMode::RebaseToUpstream, tests_must_pass: false, push_with_lease: false };
        assert!(!satisfied(&state, &goal));
    }

    #[test]
    fn unpushed_commits_fail_push_with_lease_goal() {
        let mut draft = crate::state::RepoStateDraft::new(PathBuf::from("/repo"));
        draft.has_unpushed_commits = true;
        let state = draft.freeze(&crate::config::Config::default());
        let goal = GoalConfig { mode: GoalMode::ResolveOnly, tests_must_pass: false, push_with_lease: true };
        assert!(!satisfied(&state, &goal));
    }

    #[test]
    fn required_tests_not_yet_passed_fail_goal() {
        let state = clean_state();
        let goal = GoalConfig { mode: GoalMode::ResolveOnly, tests_must_pass: true, push_with_lease: false };
        assert!(!satisfied(&state, &goal));
    }
}

//! The action registry's shared types: [`ActionSpec`] (a plan edge),
//! [`RegisteredAction`] (the four pure functions an action supplies, plus
//! its execute hook), and [`PlanningContext`] (the read-only git access the
//! pure functions are allowed during search).
//!
//! Actions are modeled as plain function pointers collected into a `Vec`,
//! not trait objects — the planner treats every entry as opaque with
//! respect to its `execute` hook.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use goap_git::facade::SubprocessFacade;
use goap_git::mergetree::{self, MergePreview};

use crate::config::Config;
use crate::error::GoapError;
use crate::state::RepoState;

/// A declarative edge in a returned [`crate::planner::Plan`]: the action's
/// name, the parameters it was applied with, its cost contribution, and an
/// optional human-readable rationale.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ActionSpec {
    /// Unique (within one plan) action name.
    pub name: String,
    /// Free-form parameters, e.g. `{"path_rule": "**/*.lock"}`.
    pub params: BTreeMap<String, String>,
    /// This step's cost contribution.
    pub cost: f64,
    /// Why this action was chosen, if the planner recorded one.
    pub rationale: Option<String>,
}

/// Pure precondition predicate.
pub type ApplicableFn = fn(&RepoState, &Config, &PlanningContext) -> bool;
/// Pure effect transformer.
pub type PredictFn = fn(&RepoState, &Config, &PlanningContext) -> RepoState;
/// Pure cost function.
pub type CostFn = fn(&RepoState, &Config, &PlanningContext) -> f64;
/// Impure execute hook: turns the action into subprocess invocations.
pub type ExecuteFn = fn(&RepoState, &Config, &mut ExecutionContext<'_>) -> Result<(), GoapError>;

/// One registered action: name plus its four pure functions and its execute
/// hook. Built once by [`crate::actions::registry`] and never mutated.
#[derive(Clone, Copy)]
pub struct RegisteredAction {
    /// Unique name, matched against [`ActionSpec::name`].
    pub name: &'static str,
    /// Precondition predicate.
    pub applicable: ApplicableFn,
    /// Effect transformer.
    pub predict: PredictFn,
    /// Cost function.
    pub cost: CostFn,
    /// Execute hook (subprocess side effects, external to planning).
    pub execute: ExecuteFn,
}

/// Read-only git access available to `applicable`/`predict`/`cost` during
/// search. Only the non-destructive merge-tree preview is exposed; results
/// are memoized per `(onto, from)` commit pair so repeated node expansions
/// against the same commits cost one subprocess call.
pub struct PlanningContext {
    repo_root: PathBuf,
    facade: RefCell<SubprocessFacade>,
    preview_cache: RefCell<HashMap<(String, String), MergePreview>>,
    observation_timeout: Duration,
}

impl PlanningContext {
    /// Construct a context rooted at `repo_root`.
    #[must_use]
    pub fn new(repo_root: PathBuf, observation_timeout: Duration) -> Self {
        Self {
            repo_root,
            facade: RefCell::new(SubprocessFacade::new()),
            preview_cache: RefCell::new(HashMap::new()),
            observation_timeout,
        }
    }

    /// Preview merging `from` onto `onto`, memoized. On a facade error the
    /// preview is treated as conflict-free (optimistic, matching the
    /// planner's general policy of not blocking on external failures that
    /// don't change the search itself); a warning is logged.
    pub fn merge_preview(&self, onto: &str, from: &str) -> MergePreview {
        let key = (onto.to_owned(), from.to_owned());
        if let Some(cached) = self.preview_cache.borrow().get(&key) {
            return cached.clone();
        }
        let preview = mergetree::preview(
            &mut self.facade.borrow_mut(),
            &self.repo_root,
            onto,
            from,
            self.observation_timeout,
        )
        .unwrap_or_else(|err| {
            tracing::warn!(%err, onto, from, "merge-tree preview failed, assuming no conflicts");
            MergePreview::default()
        });
        self.preview_cache.borrow_mut().insert(key, preview.clone());
        preview
    }
}

/// The facade and repository root an `execute` hook drives subprocess calls
/// through. Owned for the duration of one executor iteration.
pub struct ExecutionContext<'a> {
    /// The subprocess facade (owned by the [`crate::executor::Executor`]).
    pub facade: &'a mut SubprocessFacade,
    /// Repository root.
    pub repo_root: &'a Path,
    /// Mutating-command timeout.
    pub mutating_timeout: Duration,
    /// Observation-command timeout.
    pub observation_timeout: Duration,
    /// Global dry-run flag, read once at execution start.
    pub dry_run: bool,
}

//! The observation snapshot: [`RepoState`] and the value types it is built
//! from ([`RepoRef`], [`ConflictDetail`], [`ConflictType`], [`RiskLevel`],
//! [`TestsResult`]).
//!
//! All of these are immutable, structurally-equal value types. A `RepoState`
//! is never mutated after construction; transitions go through
//! [`RepoStateDraft`], a copy-update builder that recomputes the derived
//! fields (`conflict_difficulty`, `risk_level`) on every freeze so they can
//! never drift out of sync with the raw fields they summarize.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::Config;

/// A named reference with optional upstream tracking and resolved commit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    /// Branch name, or `None` if HEAD is detached.
    pub name: Option<String>,
    /// Configured upstream (`<remote>/<branch>`), if any.
    pub upstream: Option<String>,
    /// Resolved commit id of this ref, if known.
    pub commit: Option<String>,
    /// Resolved commit id of the upstream, if known (used only for merge-tree
    /// preview caching; re-resolved whenever `FetchAll` runs).
    pub upstream_commit: Option<String>,
}

/// Conflict marker kind, mirroring [`goap_git::conflict::ConflictKind`] as a
/// serializable, planner-facing value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Ordinary text.
    Text,
    /// `.json` files.
    Json,
    /// `.yaml`/`.yml` files.
    Yaml,
    /// `*.lock` files or a recognized lockfile name.
    Lock,
    /// Detected via a null-byte sniff.
    Binary,
}

impl From<goap_git::conflict::ConflictKind> for ConflictType {
    fn from(kind: goap_git::conflict::ConflictKind) -> Self {
        use goap_git::conflict::ConflictKind as K;
        match kind {
            K::Text => Self::Text,
            K::Json => Self::Json,
            K::Yaml => Self::Yaml,
            K::Lock => Self::Lock,
            K::Binary => Self::Binary,
        }
    }
}

impl ConflictType {
    /// Per-type weight used by [`conflict_difficulty`]: harder-to-automate
    /// conflict kinds weigh more heavily per unresolved hunk.
    #[must_use]
    pub const fn difficulty_weight(self) -> f64 {
        match self {
            Self::Lock => 0.5,
            Self::Json | Self::Yaml => 0.8,
            Self::Text => 1.0,
            Self::Binary => 1.5,
        }
    }
}

/// One conflicted path, as estimated by the conflict parser.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConflictDetail {
    /// Path relative to the repository root.
    pub path: PathBuf,
    /// Estimated hunk count (`>= 0`).
    pub hunk_count: u32,
    /// Conflict kind.
    pub conflict_type: ConflictType,
    /// Estimated share of hunks resolvable by rule, in `[0, 1]`.
    pub trivial_ratio: f64,
    /// Optional preferred resolution hint (e.g. a matched rule's resolution).
    pub preferred_resolution: Option<String>,
}

/// Result of the last test run the planner knows about.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestsResult {
    /// No test run has been recorded yet.
    #[default]
    Unknown,
    /// The last recorded run passed.
    Passed,
    /// The last recorded run failed.
    Failed,
}

/// Coarse risk classification derived from the rest of the state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// No conflicts, no in-progress rebase/merge, small divergence.
    Low,
    /// Some divergence or an in-progress rebase/merge with no conflicts yet.
    Medium,
    /// Unresolved conflicts, or an in-progress rebase/merge plus divergence.
    High,
}

/// A 256-bit digest over a fixed, field-ordered canonical encoding of a
/// [`RepoState`]. Used as the planner's closed-set key and the executor's
/// drift-comparison key; stable across Rust versions because it is never
/// derived from `Hash`/`Debug`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateDigest(#[serde(with = "hex_32")] [u8; 32]);

impl StateDigest {
    /// Render as a lowercase hex string.
    #[must_use]
    pub fn to_hex(self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl std::fmt::Display for StateDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

mod hex_32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        s.serialize_str(&hex)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let mut out = [0u8; 32];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(serde::de::Error::custom)?;
        }
        Ok(out)
    }
}

/// The observer's snapshot of a repository at one moment in time.
///
/// Value-typed: no field is mutated after construction. `conflict_difficulty`
/// and `risk_level` are derived and recomputed by [`RepoStateDraft::freeze`]
/// on every reconstruction, never set directly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RepoState {
    /// Repository root path.
    pub root: PathBuf,
    /// Current ref.
    pub current_ref: RepoRef,
    /// Commits ahead of the recorded upstream position.
    pub diverged_local: u32,
    /// Commits behind the recorded upstream position.
    pub diverged_remote: u32,
    /// `true` iff no tracked changes and no conflicts.
    pub working_tree_clean: bool,
    /// `true` iff any tracked change is staged.
    pub staged_changes: bool,
    /// A rebase is in progress (`.git/rebase-merge` or `.git/rebase-apply`).
    pub ongoing_rebase: bool,
    /// A merge is in progress (`.git/MERGE_HEAD`).
    pub ongoing_merge: bool,
    /// Number of stash entries.
    pub stash_entries: u32,
    /// Ordered sequence of conflicted paths; empty iff no textual conflict.
    pub conflicts: Vec<ConflictDetail>,
    /// `sum(hunk_count * (1 - trivial_ratio) * type_weight)` over `conflicts`.
    pub conflict_difficulty: f64,
    /// Result of the last recorded test run.
    pub tests_last_result: TestsResult,
    /// `true` if the current branch has commits not on its upstream.
    pub has_unpushed_commits: bool,
    /// Monotone function of `diverged_remote` and elapsed time since fetch.
    pub staleness_score: f64,
    /// Derived overall risk classification.
    pub risk_level: RiskLevel,
}

impl RepoState {
    /// Compute the canonical digest used by the planner's closed set and the
    /// executor's drift comparator.
    #[must_use]
    pub fn digest(&self) -> StateDigest {
        let mut hasher = Sha256::new();
        hasher.update(self.root.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.current_ref.name.as_deref().unwrap_or("").as_bytes());
        hasher.update([0u8]);
        hasher.update(self.current_ref.upstream.as_deref().unwrap_or("").as_bytes());
        hasher.update([0u8]);
        hasher.update(self.current_ref.commit.as_deref().unwrap_or("").as_bytes());
        hasher.update([0u8]);
        hasher.update(self.diverged_local.to_le_bytes());
        hasher.update(self.diverged_remote.to_le_bytes());
        hasher.update([
            u8::from(self.working_tree_clean),
            u8::from(self.staged_changes),
            u8::from(self.ongoing_rebase),
            u8::from(self.ongoing_merge),
        ]);
        hasher.update(self.stash_entries.to_le_bytes());
        for c in &self.conflicts {
            hasher.update(c.path.to_string_lossy().as_bytes());
            hasher.update([0u8]);
            hasher.update(c.hunk_count.to_le_bytes());
            hasher.update([c.conflict_type as u8]);
            hasher.update(c.trivial_ratio.to_bits().to_le_bytes());
        }
        hasher.update([match self.tests_last_result {
            TestsResult::Unknown => 0u8,
            TestsResult::Passed => 1,
            TestsResult::Failed => 2,
        }]);
        hasher.update([u8::from(self.has_unpushed_commits)]);
        StateDigest(hasher.finalize().into())
    }

    /// A canonical digest of only the safety-relevant fields the executor
    /// compares between a predicted and an observed post-state: conflicts,
    /// in-flight rebase/merge booleans, and diverged counts.
    #[must_use]
    pub fn safety_digest(&self) -> StateDigest {
        let mut hasher = Sha256::new();
        for c in &self.conflicts {
            hasher.update(c.path.to_string_lossy().as_bytes());
            hasher.update([0u8]);
        }
        hasher.update([u8::from(self.ongoing_rebase), u8::from(self.ongoing_merge)]);
        hasher.update(self.diverged_local.to_le_bytes());
        hasher.update(self.diverged_remote.to_le_bytes());
        StateDigest(hasher.finalize().into())
    }
}

/// Mutable copy-update builder for [`RepoState`]. Construct with
/// [`RepoStateDraft::from_state`] (or [`RepoStateDraft::new`] for the
/// observer's first snapshot), mutate the raw fields, then [`freeze`] to
/// recompute the derived fields and obtain an immutable [`RepoState`].
///
/// [`freeze`]: RepoStateDraft::freeze
#[derive(Clone, Debug)]
pub struct RepoStateDraft {
    /// Repository root path.
    pub root: PathBuf,
    /// Current ref.
    pub current_ref: RepoRef,
    /// Commits ahead of the recorded upstream position.
    pub diverged_local: u32,
    /// Commits behind the recorded upstream position.
    pub diverged_remote: u32,
    /// `true` iff no tracked changes and no conflicts.
    pub working_tree_clean: bool,
    /// `true` iff any tracked change is staged.
    pub staged_changes: bool,
    /// A rebase is in progress.
    pub ongoing_rebase: bool,
    /// A merge is in progress.
    pub ongoing_merge: bool,
    /// Number of stash entries.
    pub stash_entries: u32,
    /// Ordered sequence of conflicted paths.
    pub conflicts: Vec<ConflictDetail>,
    /// Result of the last recorded test run.
    pub tests_last_result: TestsResult,
    /// `true` if the current branch has commits not on its upstream.
    pub has_unpushed_commits: bool,
    /// Seconds elapsed since the last fetch, if known.
    pub seconds_since_fetch: Option<u64>,
}

impl RepoStateDraft {
    /// Start a draft with every raw field defaulted (used by the observer
    /// when composing the first snapshot of a run).
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            current_ref: RepoRef::default(),
            diverged_local: 0,
            diverged_remote: 0,
            working_tree_clean: true,
            staged_changes: false,
            ongoing_rebase: false,
            ongoing_merge: false,
            stash_entries: 0,
            conflicts: Vec::new(),
            tests_last_result: TestsResult::Unknown,
            has_unpushed_commits: false,
            seconds_since_fetch: None,
        }
    }

    /// Start a draft pre-populated from an existing state, for an action's
    /// `predict` to mutate.
    #[must_use]
    pub fn from_state(state: &RepoState) -> Self {
        Self {
            root: state.root.clone(),
            current_ref: state.current_ref.clone(),
            diverged_local: state.diverged_local,
            diverged_remote: state.diverged_remote,
            working_tree_clean: state.working_tree_clean,
            staged_changes: state.staged_changes,
            ongoing_rebase: state.ongoing_rebase,
            ongoing_merge: state.ongoing_merge,
            stash_entries: state.stash_entries,
            conflicts: state.conflicts.clone(),
            tests_last_result: state.tests_last_result,
            has_unpushed_commits: state.has_unpushed_commits,
            seconds_since_fetch: None,
        }
    }

    /// Recompute `conflict_difficulty`, `staleness_score`, and `risk_level`
    /// and produce an immutable [`RepoState`].
    #[must_use]
    pub fn freeze(self, config: &Config) -> RepoState {
        let conflict_difficulty: f64 = self
            .conflicts
            .iter()
            .map(|c| f64::from(c.hunk_count) * (1.0 - c.trivial_ratio) * c.conflict_type.difficulty_weight())
            .sum();

        // Purely a freshness signal (time since the last fetch), independent
        // of `diverged_remote`'s magnitude: the heuristic's own β term
        // already accounts for divergence, so this must not double-count it.
        // A repository that has never been fetched is treated as maximally
        // stale rather than unknown.
        let staleness_score = self
            .seconds_since_fetch
            .map_or(config.heuristics.max_staleness_score, |secs| {
                (secs as f64 / config.heuristics.staleness_half_life_secs)
                    .min(config.heuristics.max_staleness_score)
            });

        let risk_level = if !self.conflicts.is_empty()
            || ((self.ongoing_rebase || self.ongoing_merge) && self.diverged_remote > 0)
        {
            RiskLevel::High
        } else if self.ongoing_rebase
            || self.ongoing_merge
            || self.diverged_remote > 0
            || self.diverged_local > 0
        {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        RepoState {
            root: self.root,
            current_ref: self.current_ref,
            diverged_local: self.diverged_local,
            diverged_remote: self.diverged_remote,
            working_tree_clean: self.working_tree_clean,
            staged_changes: self.staged_changes,
            ongoing_rebase: self.ongoing_rebase,
            ongoing_merge: self.ongoing_merge,
            stash_entries: self.stash_entries,
            conflicts: self.conflicts,
            conflict_difficulty,
            tests_last_result: self.tests_last_result,
            has_unpushed_commits: self.has_unpushed_commits,
            staleness_score,
            risk_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_draft() -> RepoStateDraft {
        RepoStateDraft::new(PathBuf::from("/repo"))
    }

    #[test]
    fn clean_tree_cannot_have_conflicts() {
        let config = Config::default();
        let state = base_draft().freeze(&config);
        assert!(state.working_tree_clean);
        assert!(state.conflicts.is_empty());
    }

    #[test]
    fn conflicts_raise_risk_to_high() {
        let config = Config::default();
        let mut draft = base_draft();
        draft.working_tree_clean = false;
        draft.conflicts.push(ConflictDetail {
            path: PathBuf::from("a.rs"),
            hunk_count: 2,
            conflict_type: ConflictType::Text,
            trivial_ratio: 0.0,
            preferred_resolution: None,
        });
        let state = draft.freeze(&config);
        assert_eq!(state.risk_level, RiskLevel::High);
        assert!(state.conflict_difficulty > 0.0);
    }

    #[test]
    fn digest_is_stable_for_equal_states() {
        let config = Config::default();
        let a = base_draft().freeze(&config);
        let b = base_draft().freeze(&config);
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn digest_differs_when_conflicts_differ() {
        let config = Config::default();
        let a = base_draft().freeze(&config);
        let mut draft = base_draft();
        draft.conflicts.push(ConflictDetail {
            path: PathBuf::from("a.rs"),
            hunk_count: 1,
            conflict_type: ConflictType::Text,
            trivial_ratio: 0.0,
            preferred_resolution: None,
        });
        let b = draft.freeze(&config);
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn safety_digest_ignores_non_safety_fields() {
        let config = Config::default();
        let a = base_draft().freeze(&config);
        let mut draft = base_draft();
        draft.stash_entries = 5;
        draft.tests_last_result = TestsResult::Passed;
        let b = draft.freeze(&config);
        assert_eq!(a.safety_digest(), b.safety_digest());
    }
}

//! The frozen `Config` value: goal, strategy, safety, heuristics, and
//! planner limits. Loaded once from TOML (default path `.gitgoap.toml`),
//! validated, and passed by shared reference thereafter — no subsystem
//! mutates it.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::GoapError;

/// Top-level frozen configuration.
///
/// Every section implements `#[serde(default)]` so a missing file or a
/// missing section falls back to documented defaults; unknown keys are
/// rejected so a typo in a hand-edited config surfaces immediately.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Goal predicate parameters.
    #[serde(default)]
    pub goal: GoalConfig,
    /// Conflict-resolution strategy.
    #[serde(default)]
    pub strategy: StrategyConfig,
    /// Safety gates and timeouts.
    #[serde(default)]
    pub safety: SafetyConfig,
    /// A* heuristic coefficients.
    #[serde(default)]
    pub heuristics: HeuristicConfig,
    /// Search termination limits.
    #[serde(default)]
    pub planner: PlannerConfig,
}

impl Config {
    /// Load and validate a `Config` from a TOML file.
    ///
    /// # Errors
    /// Returns [`GoapError::Config`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, GoapError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| GoapError::Config { detail: format!("reading {}: {e}", path.display()) })?;
        Self::from_toml_str(&text)
    }

    /// Load the default config if `path` exists, else fall back to defaults.
    ///
    /// # Errors
    /// Returns [`GoapError::Config`] if `path` exists but cannot be parsed.
    pub fn load_or_default(path: &Path) -> Result<Self, GoapError> {
        if path.exists() { Self::load(path) } else { Ok(Self::default().validated()) }
    }

    /// Parse and validate a `Config` from a TOML string.
    ///
    /// # Errors
    /// Returns [`GoapError::Config`] if the TOML cannot be deserialized.
    pub fn from_toml_str(text: &str) -> Result<Self, GoapError> {
        let config: Self = toml::from_str(text)
            .map_err(|e| GoapError::Config { detail: format!("parsing config: {e}") })?;
        Ok(config.validated())
    }

    /// Clamp heuristic coefficients to non-negative values so the planner's
    /// admissibility guarantee cannot be violated by a mis-configured
    /// negative weight. A negative coefficient is clamped to `0.0` and a
    /// warning is emitted immediately (at load time, not mid-search).
    #[must_use]
    pub fn validated(mut self) -> Self {
        self.heuristics.clamp_non_negative();
        self
    }
}

/// `gitgoap run`'s goal predicate, §3 `GoalSpec`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GoalConfig {
    /// How far the goal requires the branch to be reconciled with upstream.
    #[serde(default)]
    pub mode: GoalMode,
    /// Whether the goal additionally requires a passing test run.
    #[serde(default)]
    pub tests_must_pass: bool,
    /// Whether the goal additionally requires the branch to be pushed.
    #[serde(default)]
    pub push_with_lease: bool,
}

/// How far toward upstream reconciliation the goal requires.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalMode {
    /// Conflicts resolved and working tree clean; divergence is not a goal.
    #[default]
    ResolveOnly,
    /// `resolve_only` plus rebased onto upstream (`diverged_remote == 0`).
    RebaseToUpstream,
    /// `rebase_to_upstream` plus pushed with lease.
    PushWithLease,
}

impl GoalMode {
    /// `true` if this mode requires `diverged_remote == 0`.
    #[must_use]
    pub const fn requires_rebase(self) -> bool {
        matches!(self, Self::RebaseToUpstream | Self::PushWithLease)
    }
}

/// Conflict-resolution strategy.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyConfig {
    /// Enable git's rerere (reuse recorded resolution) mechanism.
    #[serde(default)]
    pub enable_rerere: bool,
    /// Conflict marker style git should write.
    #[serde(default)]
    pub conflict_style: ConflictStyle,
    /// Ordered path-matching resolution rules.
    #[serde(default)]
    pub rules: Vec<PathRule>,
}

/// Conflict marker style passed to `git config merge.conflictStyle`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStyle {
    /// Two-way markers (`<<<<<<< / ======= / >>>>>>>`).
    #[default]
    Merge,
    /// Diff3 markers with a base section.
    Diff3,
    /// zdiff3 markers (a tighter base section).
    Zdiff3,
}

/// One ordered rule for `ApplyPathStrategy`/`UseMergeDriver`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathRule {
    /// Repository-relative glob.
    pub pattern: String,
    /// How to resolve paths matching `pattern`.
    pub resolution: Resolution,
    /// Optional extra predicate expressed as a conflict-type filter.
    #[serde(default)]
    pub when: Option<String>,
}

/// A path rule's chosen resolution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Resolution {
    /// Take our side.
    Ours,
    /// Take their side.
    Theirs,
    /// Delegate to a named merge driver.
    MergeDriver(String),
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ours => write!(f, "ours"),
            Self::Theirs => write!(f, "theirs"),
            Self::MergeDriver(name) => write!(f, "merge-driver:{name}"),
        }
    }
}

/// Safety gates, timeouts, and drift tolerance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SafetyConfig {
    /// Force every mutating subprocess call to be suppressed and journaled.
    #[serde(default)]
    pub dry_run: bool,
    /// Whether `PushWithLease` is permitted to run at all.
    #[serde(default)]
    pub allow_force_push: bool,
    /// Maximum seconds a test run may take before it is treated as a timeout.
    #[serde(default = "default_max_test_runtime_sec")]
    pub max_test_runtime_sec: u64,
    /// Timeout for mutating subprocess calls.
    #[serde(default = "default_mutating_timeout_sec")]
    pub mutating_timeout_sec: u64,
    /// Timeout for read-only observation subprocess calls.
    #[serde(default = "default_observation_timeout_sec")]
    pub observation_timeout_sec: u64,
    /// Maximum replans the executor will attempt before giving up.
    #[serde(default = "default_max_replans")]
    pub max_replans: u32,
    /// Allowed absolute difference between a predicted and an observed
    /// diverged count before it counts as drift (open question (c)).
    #[serde(default = "default_drift_tolerance")]
    pub drift_tolerance: u32,
    /// Whether the planner may include `RebaseAbort` as a drift-recovery
    /// step when the goal is otherwise unreachable (open question (b)).
    /// Defaults to `false`: repeated drift always surfaces as
    /// `exhausted_replans`, deferring to the operator.
    #[serde(default)]
    pub allow_auto_abort: bool,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            allow_force_push: false,
            max_test_runtime_sec: default_max_test_runtime_sec(),
            mutating_timeout_sec: default_mutating_timeout_sec(),
            observation_timeout_sec: default_observation_timeout_sec(),
            max_replans: default_max_replans(),
            drift_tolerance: default_drift_tolerance(),
            allow_auto_abort: false,
        }
    }
}

const fn default_max_test_runtime_sec() -> u64 {
    600
}
const fn default_mutating_timeout_sec() -> u64 {
    120
}
const fn default_observation_timeout_sec() -> u64 {
    30
}
const fn default_max_replans() -> u32 {
    3
}
const fn default_drift_tolerance() -> u32 {
    1
}

/// A* heuristic coefficients (α…ζ) plus the staleness decay rate used by
/// [`crate::state::RepoStateDraft::freeze`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeuristicConfig {
    /// α — weight per unresolved conflict.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// β — weight per diverged commit (local + remote).
    #[serde(default = "default_beta")]
    pub beta: f64,
    /// γ — weight for an in-progress rebase or merge.
    #[serde(default = "default_gamma")]
    pub gamma: f64,
    /// δ — weight per unit of staleness.
    #[serde(default = "default_delta")]
    pub delta: f64,
    /// ε — weight for outstanding required tests.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// ζ — weight for an outstanding required push.
    #[serde(default = "default_zeta")]
    pub zeta: f64,
    /// Seconds per unit of staleness contribution (higher = slower decay).
    #[serde(default = "default_staleness_half_life")]
    pub staleness_half_life_secs: f64,
    /// Ceiling applied to `staleness_score`, including the fallback used
    /// when the repository has never been fetched.
    #[serde(default = "default_max_staleness_score")]
    pub max_staleness_score: f64,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            beta: default_beta(),
            gamma: default_gamma(),
            delta: default_delta(),
            epsilon: default_epsilon(),
            zeta: default_zeta(),
            staleness_half_life_secs: default_staleness_half_life(),
            max_staleness_score: default_max_staleness_score(),
        }
    }
}

impl HeuristicConfig {
    /// Clamp every coefficient to `>= 0.0`, warning on each one that wasn't.
    pub fn clamp_non_negative(&mut self) {
        for (name, value) in [
            ("alpha", &mut self.alpha),
            ("beta", &mut self.beta),
            ("gamma", &mut self.gamma),
            ("delta", &mut self.delta),
            ("epsilon", &mut self.epsilon),
            ("zeta", &mut self.zeta),
        ] {
            if *value < 0.0 {
                tracing::warn!(coefficient = name, value = *value, "negative heuristic coefficient clamped to 0.0 to preserve admissibility");
                *value = 0.0;
            }
        }
    }
}

const fn default_alpha() -> f64 {
    1.0
}
const fn default_beta() -> f64 {
    0.5
}
const fn default_gamma() -> f64 {
    3.0
}
const fn default_delta() -> f64 {
    0.2
}
const fn default_epsilon() -> f64 {
    5.0
}
const fn default_zeta() -> f64 {
    2.0
}
const fn default_staleness_half_life() -> f64 {
    3600.0
}
const fn default_max_staleness_score() -> f64 {
    24.0
}

/// Search termination limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlannerConfig {
    /// Maximum nodes the A* search may expand before giving up.
    #[serde(default = "default_max_expansions")]
    pub max_expansions: u32,
    /// Maximum plan length (actions) the search will return.
    #[serde(default = "default_max_plan_length")]
    pub max_plan_length: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self { max_expansions: default_max_expansions(), max_plan_length: default_max_plan_length() }
    }
}

const fn default_max_expansions() -> u32 {
    5000
}
const fn default_max_plan_length() -> u32 {
    32
}

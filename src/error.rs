//! `GoapError` — the core's unified error type.
//!
//! `goap_git::FacadeError` converts into it via `From` so call sites at the
//! core/facade boundary use plain `?` instead of manual matching.

use thiserror::Error;

use goap_git::FacadeError;

/// Why the planner could not find a plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoPlanReason {
    /// No sequence of registered actions reaches the goal from any state the
    /// search explored.
    Unreachable,
    /// `max_expansions` was hit before the goal was found.
    ExhaustedExpansions,
    /// `max_plan_length` was hit before the goal was found.
    ExhaustedLength,
}

impl std::fmt::Display for NoPlanReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unreachable => "unreachable",
            Self::ExhaustedExpansions => "exhausted_expansions",
            Self::ExhaustedLength => "exhausted_length",
        };
        f.write_str(s)
    }
}

/// The unified tagged error type for the planning/execution core.
#[derive(Debug, Error)]
pub enum GoapError {
    /// The observer could not decode git's output, even after one retry.
    #[error("failed to parse {source}: {detail}")]
    Parse {
        /// What was being parsed.
        source: String,
        /// Description of the problem.
        detail: String,
    },

    /// A git invocation returned a non-zero exit code.
    #[error("git command failed (exit {code}): {stderr}")]
    ExternalFailure {
        /// Process exit code.
        code: i32,
        /// Captured stderr.
        stderr: String,
    },

    /// A subprocess call exceeded its timeout.
    #[error("git command timed out")]
    ExternalTimeout,

    /// The planner could not reach the goal.
    #[error("no plan found: {reason}")]
    NoPlan {
        /// Why the search failed.
        reason: NoPlanReason,
    },

    /// The observed post-state disagreed with the action's predicted effect.
    #[error("drift detected: predicted {predicted_digest}, observed {observed_digest}")]
    Drift {
        /// Digest of the predicted post-state's safety-relevant fields.
        predicted_digest: String,
        /// Digest of the observed post-state's safety-relevant fields.
        observed_digest: String,
    },

    /// An action required a policy the frozen config does not permit.
    #[error("policy violation: {rule}")]
    PolicyViolation {
        /// The violated rule, e.g. `"safety.allow_force_push = false"`.
        rule: String,
    },

    /// The `git` binary is absent or older than the supported minimum.
    #[error("environment missing: {0}")]
    EnvironmentMissing(String),

    /// The configuration file could not be loaded or parsed.
    #[error("configuration error: {detail}")]
    Config {
        /// Human-readable description of the problem.
        detail: String,
    },
}

impl From<FacadeError> for GoapError {
    fn from(err: FacadeError) -> Self {
        match err {
            FacadeError::Timeout { .. } => Self::ExternalTimeout,
            FacadeError::NonZeroExit { code, stderr, .. } => Self::ExternalFailure { code, stderr },
            FacadeError::EnvironmentMissing { detail } => Self::EnvironmentMissing(detail),
            FacadeError::Parse { source, detail } => Self::Parse { source, detail },
            FacadeError::UnbalancedMarkers { path, detail } => {
                Self::Parse { source: path.display().to_string(), detail }
            }
            FacadeError::Io(e) => Self::Parse { source: "I/O".to_owned(), detail: e.to_string() },
        }
    }
}

impl GoapError {
    /// Process exit code this error maps to at the CLI boundary.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::NoPlan { .. } => 3,
            Self::EnvironmentMissing(_) => 4,
            _ => 2,
        }
    }
}

//! Structured report records.
//!
//! The core only produces these typed records; rendering them to a
//! human-readable form or line-delimited JSON is the CLI's job — the core
//! itself never formats output for a terminal or log sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::StateDigest;

/// Severity of one [`ReportRecord`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// Routine progress (an iteration started, an action was dispatched).
    Info,
    /// A recoverable anomaly (a replan, a transient failure).
    Warn,
    /// A structural error ending the execution.
    Error,
}

/// One causally-ordered record of the executor's loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    /// Wall-clock time the record was emitted.
    pub timestamp: DateTime<Utc>,
    /// Severity.
    pub level: Level,
    /// Monotonically increasing per-execution id, unique within one run.
    pub correlation_id: u64,
    /// The action this record concerns, if any.
    pub action: Option<String>,
    /// Digest of the action's predicted post-state, if applicable.
    pub predicted_state_digest: Option<StateDigest>,
    /// Digest of the actually-observed post-state, if applicable.
    pub observed_state_digest: Option<StateDigest>,
    /// Process exit code this record corresponds to, at the terminal record.
    pub exit_code: Option<i32>,
    /// Free-form human-readable message.
    pub message: String,
}

/// The executor's terminal status, mapped to a process exit code below.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    /// The goal predicate was satisfied.
    GoalReached,
    /// Cancelled (SIGINT) before the goal was reached.
    Aborted,
    /// `max_replans` was exceeded without reaching the goal.
    ExhaustedReplans,
    /// The next planned action's precondition did not hold against the
    /// freshly observed state, or an unrecoverable action failed.
    Fatal,
    /// The planner could not find a plan at all.
    NoPlan,
}

impl TerminalStatus {
    /// Process exit code table.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::GoalReached => 0,
            Self::ExhaustedReplans => 1,
            Self::Fatal | Self::Aborted => 2,
            Self::NoPlan => 3,
        }
    }
}

/// The full result of one `Executor::execute` run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Causally ordered records.
    pub records: Vec<ReportRecord>,
    /// How the run ended.
    pub terminal: TerminalStatus,
    /// Number of replans triggered by drift or action failure.
    pub replan_count: u32,
    /// Digest of the final observed state, if any observation happened.
    pub final_state_digest: Option<StateDigest>,
}

impl ExecutionReport {
    /// The exit code a CLI caller should surface.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.terminal.exit_code()
    }
}

//! Error type for the subprocess facade and the parsers built on top of it.
//!
//! [`FacadeError`] is the single error type returned by everything in this
//! crate. `gitgoap`'s own [`GoapError`](../../gitgoap/error/enum.GoapError.html)
//! converts from it at the core/facade boundary via `From`.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from running `git` or parsing its output.
#[derive(Debug, Error)]
pub enum FacadeError {
    /// The subprocess exceeded its configured timeout.
    #[error("`{command}` timed out after {timeout_secs}s")]
    Timeout {
        /// The command that was run (e.g. `"git fetch --prune"`).
        command: String,
        /// The configured timeout.
        timeout_secs: u64,
    },

    /// The subprocess exited with a non-zero status.
    #[error("`{command}` failed (exit code {code}): {stderr}")]
    NonZeroExit {
        /// The command that was run.
        command: String,
        /// The process exit code, or -1 if killed by signal.
        code: i32,
        /// Captured stderr, trimmed.
        stderr: String,
    },

    /// The `git` binary could not be found, or reported an unsupported version.
    #[error("git binary missing or unsupported: {detail}")]
    EnvironmentMissing {
        /// Human-readable detail (not found / version string / etc).
        detail: String,
    },

    /// Git output could not be decoded into a structured record.
    #[error("failed to parse {source}: {detail}")]
    Parse {
        /// What was being parsed (e.g. `"status --porcelain=v2"`).
        source: String,
        /// Description of the problem, including the offending line when known.
        detail: String,
    },

    /// A conflict marker region was malformed (unbalanced `<<<<<<<`/`>>>>>>>`).
    #[error("unbalanced conflict markers in {}: {detail}", path.display())]
    UnbalancedMarkers {
        /// The file being scanned.
        path: PathBuf,
        /// Description of the imbalance.
        detail: String,
    },

    /// An I/O error spawning the subprocess or reading a working-copy file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

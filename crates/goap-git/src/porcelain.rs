//! Decodes `git status --porcelain=v2 --branch --ahead-behind` and the
//! on-disk markers for an in-progress rebase or merge.
//!
//! Parsing is total: an unrecognized header line is ignored (a `tracing`
//! warning is emitted), but a malformed entry line raises
//! [`FacadeError::Parse`] carrying the offending line.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bstr::ByteSlice;

use crate::error::FacadeError;
use crate::facade::SubprocessFacade;

/// Branch/tracking header decoded from the `# branch.*` lines.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BranchInfo {
    /// Current branch name, `None` if HEAD is detached.
    pub name: Option<String>,
    /// Configured upstream (`<remote>/<branch>`), if any.
    pub upstream: Option<String>,
    /// Resolved commit id of HEAD, if known.
    pub oid: Option<String>,
    /// Commits ahead of upstream.
    pub ahead: u32,
    /// Commits behind upstream.
    pub behind: u32,
}

/// One ordinary changed entry (`1`/`2` records).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangedEntry {
    /// Path relative to the repository root.
    pub path: PathBuf,
    /// Staged-side status letter (`X`); `.` means unchanged in the index.
    pub index_status: char,
    /// Worktree-side status letter (`Y`); `.` means unchanged on disk.
    pub worktree_status: char,
}

/// One unmerged (conflicted) entry (`u` records).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnmergedEntry {
    /// Path relative to the repository root.
    pub path: PathBuf,
    /// The two-letter `XY` conflict code, e.g. `"UU"`, `"AA"`, `"DD"`.
    pub code: String,
}

/// Decoded `status --porcelain=v2 --branch --ahead-behind` output, plus the
/// in-flight rebase/merge booleans read from the git directory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PorcelainStatus {
    /// Branch/tracking metadata.
    pub branch: BranchInfo,
    /// Ordinary changed entries (staged and/or unstaged), conflicts excluded.
    pub changed: Vec<ChangedEntry>,
    /// Conflicted entries.
    pub unmerged: Vec<UnmergedEntry>,
    /// Untracked paths (`?` records).
    pub untracked: Vec<PathBuf>,
}

impl PorcelainStatus {
    /// `true` if any ordinary entry has a staged-side change.
    #[must_use]
    pub fn has_staged_changes(&self) -> bool {
        self.changed.iter().any(|e| e.index_status != '.')
    }

    /// `true` if there are no tracked changes and no conflicts.
    ///
    /// Untracked files alone do not make the working tree "dirty" for the
    /// purposes of rebase/merge preconditions, matching what `git rebase`
    /// itself requires to be clean.
    #[must_use]
    pub fn working_tree_clean(&self) -> bool {
        self.changed.is_empty() && self.unmerged.is_empty()
    }
}

/// Run `git status --porcelain=v2 --branch --ahead-behind` and decode it.
///
/// # Errors
/// Returns [`FacadeError::NonZeroExit`] if git fails, or
/// [`FacadeError::Parse`] if an entry line cannot be decoded.
pub fn status(
    facade: &mut SubprocessFacade,
    repo_root: &Path,
    timeout: Duration,
) -> Result<PorcelainStatus, FacadeError> {
    let argv = vec![
        "status".to_owned(),
        "--porcelain=v2".to_owned(),
        "--branch".to_owned(),
        "--ahead-behind".to_owned(),
    ];
    let stdout = facade.run_stdout(&argv, repo_root, timeout)?;
    parse_porcelain_v2(&stdout)
}

/// Decode the textual output of `status --porcelain=v2 --branch --ahead-behind`.
///
/// # Errors
/// Returns [`FacadeError::Parse`] for a malformed `1`/`2`/`u` record.
pub fn parse_porcelain_v2(input: &str) -> Result<PorcelainStatus, FacadeError> {
    let mut out = PorcelainStatus::default();

    for line in input.as_bytes().lines() {
        let line = line.to_str_lossy();
        if line.is_empty() {
            continue;
        }
        match line.as_bytes()[0] {
            b'#' => parse_header(&line, &mut out.branch),
            b'1' => out.changed.push(parse_ordinary(&line)?),
            b'2' => out.changed.push(parse_renamed(&line)?),
            b'u' => out.unmerged.push(parse_unmerged(&line)?),
            b'?' => out.untracked.push(dequote_path(field(&line, 1)?)),
            b'!' => {} // ignored entries carry no information the planner needs
            _ => {
                tracing::warn!(line = %line, "unrecognized status --porcelain=v2 line, ignoring");
            }
        }
    }

    Ok(out)
}

fn parse_header(line: &str, branch: &mut BranchInfo) {
    let Some(rest) = line.strip_prefix("# ") else {
        tracing::warn!(line = %line, "malformed header line, ignoring");
        return;
    };
    if let Some(name) = rest.strip_prefix("branch.head ") {
        branch.name = (name != "(detached)").then(|| name.to_owned());
    } else if let Some(upstream) = rest.strip_prefix("branch.upstream ") {
        branch.upstream = Some(upstream.to_owned());
    } else if let Some(oid) = rest.strip_prefix("branch.oid ") {
        branch.oid = (oid != "(initial)").then(|| oid.to_owned());
    } else if let Some(ab) = rest.strip_prefix("branch.ab ") {
        parse_ahead_behind(ab, branch);
    } else {
        tracing::warn!(line = %line, "unrecognized branch header, ignoring");
    }
}

fn parse_ahead_behind(ab: &str, branch: &mut BranchInfo) {
    // "+<ahead> -<behind>"
    for token in ab.split_whitespace() {
        if let Some(n) = token.strip_prefix('+') {
            branch.ahead = n.parse().unwrap_or(0);
        } else if let Some(n) = token.strip_prefix('-') {
            branch.behind = n.parse().unwrap_or(0);
        }
    }
}

/// Returns the space-separated field at `index` (0-based), erroring if absent.
fn field(line: &str, index: usize) -> Result<&str, FacadeError> {
    line.split_whitespace().nth(index).ok_or_else(|| FacadeError::Parse {
        source: "status --porcelain=v2".to_owned(),
        detail: format!("missing field {index} in line: {line}"),
    })
}

fn parse_ordinary(line: &str) -> Result<ChangedEntry, FacadeError> {
    // "1 <XY> <sub> <mH> <mI> <mW> <hH> <hI> <path>"
    let xy = field(line, 1)?;
    let (index_status, worktree_status) = xy_pair(line, xy)?;
    let path = path_from_fixed_fields(line, 8)?;
    Ok(ChangedEntry { path, index_status, worktree_status })
}

fn parse_renamed(line: &str) -> Result<ChangedEntry, FacadeError> {
    // "2 <XY> <sub> <mH> <mI> <mW> <hH> <hI> <X><score> <path><tab><origPath>"
    let xy = field(line, 1)?;
    let (index_status, worktree_status) = xy_pair(line, xy)?;
    let tail = line.splitn(9, char::is_whitespace).nth(8).ok_or_else(|| FacadeError::Parse {
        source: "status --porcelain=v2".to_owned(),
        detail: format!("missing rename path field in line: {line}"),
    })?;
    let path = tail.split('\t').next().unwrap_or(tail);
    Ok(ChangedEntry { path: dequote_path(path), index_status, worktree_status })
}

fn parse_unmerged(line: &str) -> Result<UnmergedEntry, FacadeError> {
    // "u <XY> <sub> <m1> <m2> <m3> <mW> <h1> <h2> <h3> <path>"
    let xy = field(line, 1)?;
    if xy.chars().count() != 2 {
        return Err(FacadeError::Parse {
            source: "status --porcelain=v2".to_owned(),
            detail: format!("malformed unmerged XY code in line: {line}"),
        });
    }
    let path = path_from_fixed_fields(line, 10)?;
    Ok(UnmergedEntry { path, code: xy.to_owned() })
}

fn xy_pair(line: &str, xy: &str) -> Result<(char, char), FacadeError> {
    let mut chars = xy.chars();
    let (Some(x), Some(y), None) = (chars.next(), chars.next(), chars.next()) else {
        return Err(FacadeError::Parse {
            source: "status --porcelain=v2".to_owned(),
            detail: format!("malformed XY code in line: {line}"),
        });
    };
    Ok((x, y))
}

/// The path is whatever follows the `n`th whitespace-separated fixed field.
fn path_from_fixed_fields(line: &str, n: usize) -> Result<PathBuf, FacadeError> {
    let path = line.splitn(n + 1, char::is_whitespace).nth(n).ok_or_else(|| FacadeError::Parse {
        source: "status --porcelain=v2".to_owned(),
        detail: format!("missing path field in line: {line}"),
    })?;
    Ok(dequote_path(path))
}

/// Undo git's C-style quoting of paths containing special characters.
///
/// Git only quotes a path (wraps it in `"..."` with backslash escapes) when
/// it contains a quote, backslash, or control character; otherwise the raw
/// bytes are used verbatim, which this passes through unchanged.
fn dequote_path(raw: &str) -> PathBuf {
    let Some(inner) = raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')) else {
        return PathBuf::from(raw);
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    PathBuf::from(out)
}

/// Whether `.git/rebase-merge`, `.git/rebase-apply`, or `.git/MERGE_HEAD`
/// indicate an in-progress rebase or merge.
#[must_use]
pub fn in_flight_state(git_dir: &Path) -> (bool, bool) {
    let ongoing_rebase =
        git_dir.join("rebase-merge").is_dir() || git_dir.join("rebase-apply").is_dir();
    let ongoing_merge = git_dir.join("MERGE_HEAD").is_file();
    (ongoing_rebase, ongoing_merge)
}

/// Resolve the real `.git` directory for `repo_root` (handles worktrees).
///
/// # Errors
/// Returns [`FacadeError::NonZeroExit`] if `git rev-parse --git-dir` fails.
pub fn git_dir(
    facade: &mut SubprocessFacade,
    repo_root: &Path,
    timeout: Duration,
) -> Result<PathBuf, FacadeError> {
    let argv = vec!["rev-parse".to_owned(), "--git-dir".to_owned()];
    let out = facade.run_stdout(&argv, repo_root, timeout)?;
    let rel = PathBuf::from(out.trim());
    Ok(if rel.is_absolute() { rel } else { repo_root.join(rel) })
}

/// Count stash entries via `git stash list`.
///
/// # Errors
/// Returns [`FacadeError::NonZeroExit`] if git fails.
pub fn stash_count(
    facade: &mut SubprocessFacade,
    repo_root: &Path,
    timeout: Duration,
) -> Result<u32, FacadeError> {
    let argv = vec!["stash".to_owned(), "list".to_owned()];
    let out = facade.run_stdout(&argv, repo_root, timeout)?;
    Ok(out.lines().filter(|l| !l.trim().is_empty()).count() as u32)
}

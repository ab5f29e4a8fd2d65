//! Non-destructive three-way merge preview via `git merge-tree --write-tree`.
//!
//! Never touches the working tree or the index; used by the planner to
//! predict the conflict set a real rebase/merge would produce.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::FacadeError;
use crate::facade::SubprocessFacade;

/// Result of previewing a merge of `from` onto `onto`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergePreview {
    /// Paths the merge would leave conflicted.
    pub conflicts: Vec<PathBuf>,
    /// The written tree id, when git reports one (unused by the planner
    /// itself; exposed so callers may cache on it).
    pub tree_id: Option<String>,
}

/// Run `git merge-tree --write-tree <onto> <from>` and parse conflicts.
///
/// # Errors
/// Returns [`FacadeError::NonZeroExit`] only for a hard failure (bad
/// revision, git missing); `merge-tree` exiting 1 to report conflicts is not
/// an error and is parsed normally.
pub fn preview(
    facade: &mut SubprocessFacade,
    repo_root: &Path,
    onto: &str,
    from: &str,
    timeout: Duration,
) -> Result<MergePreview, FacadeError> {
    let argv = vec![
        "merge-tree".to_owned(),
        "--write-tree".to_owned(),
        "--name-only".to_owned(),
        onto.to_owned(),
        from.to_owned(),
    ];
    let out = facade.run(&argv, repo_root, timeout, false)?;

    // Exit 0: clean merge. Exit 1: conflicts were recorded in the written
    // tree and reported in stdout. Anything else is a real failure (e.g. an
    // unknown revision).
    if out.exit_code != Some(0) && out.exit_code != Some(1) {
        return Err(FacadeError::NonZeroExit {
            command: out.recorded_command,
            code: out.exit_code.unwrap_or(-1),
            stderr: out.stderr.trim().to_owned(),
        });
    }

    Ok(parse_merge_tree_output(&out.stdout))
}

/// Parse `merge-tree --write-tree --name-only` output.
///
/// The first line is the written tree's object id. When the merge is clean,
/// that is the only line. When there are conflicts, a blank line separates
/// the tree id from a list of conflicted paths (one per line, `--name-only`
/// requests exactly this — no mode/stage/oid columns to strip), which is in
/// turn followed by a blank line and then an informational messages block
/// (`CONFLICT (content): Merge conflict in <path>`, etc.) that is not part of
/// the path list and must not be parsed as one.
fn parse_merge_tree_output(stdout: &str) -> MergePreview {
    let mut lines = stdout.lines().peekable();
    let tree_id = lines.next().map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned);

    while lines.peek().is_some_and(|l| l.trim().is_empty()) {
        lines.next();
    }

    let mut conflicts = Vec::new();
    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            break;
        }
        conflicts.push(PathBuf::from(trimmed));
    }

    MergePreview { conflicts, tree_id }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_merge_has_no_conflicts() {
        let preview = parse_merge_tree_output("abcd1234ef\n");
        assert_eq!(preview.tree_id.as_deref(), Some("abcd1234ef"));
        assert!(preview.conflicts.is_empty());
    }

    #[test]
    fn conflicted_merge_lists_paths_after_blank_line() {
        let preview = parse_merge_tree_output("abcd1234ef\n\nsrc/lib.rs\nCargo.lock\n");
        assert_eq!(preview.tree_id.as_deref(), Some("abcd1234ef"));
        assert_eq!(
            preview.conflicts,
            vec![PathBuf::from("src/lib.rs"), PathBuf::from("Cargo.lock")]
        );
    }

    #[test]
    fn informational_messages_after_path_list_are_not_conflicts() {
        let preview = parse_merge_tree_output(
            "abcd1234ef\n\nsrc/lib.rs\nCargo.lock\n\nCONFLICT (content): Merge conflict in src/lib.rs\nCONFLICT (content): Merge conflict in Cargo.lock\n",
        );
        assert_eq!(preview.tree_id.as_deref(), Some("abcd1234ef"));
        assert_eq!(
            preview.conflicts,
            vec![PathBuf::from("src/lib.rs"), PathBuf::from("Cargo.lock")]
        );
    }

    #[test]
    fn empty_output_yields_no_tree_id_and_no_conflicts() {
        let preview = parse_merge_tree_output("");
        assert_eq!(preview.tree_id, None);
        assert!(preview.conflicts.is_empty());
    }
}

//! Scans a working-copy file for `<<<<<<< / ||||||| / ======= / >>>>>>>`
//! conflict marker regions and classifies the file by extension.

use std::fs;
use std::path::{Path, PathBuf};

/// Conflict marker kind, used for triviality estimation and policy rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConflictKind {
    /// Ordinary text.
    Text,
    /// `.json` files.
    Json,
    /// `.yaml`/`.yml` files.
    Yaml,
    /// `*.lock` files or a recognized lockfile name.
    Lock,
    /// A null byte was found before any marker could be scanned.
    Binary,
}

/// Known lockfile basenames that aren't suffixed `.lock`.
const KNOWN_LOCK_FILENAMES: &[&str] =
    &["package-lock.json", "yarn.lock", "pnpm-lock.yaml", "Gemfile.lock", "poetry.lock"];

/// One scanned conflict region and the file it belongs to, scanned together
/// per file since triviality is estimated per region.
#[derive(Clone, Debug, PartialEq)]
pub struct ScannedConflict {
    /// Path relative to the repository root.
    pub path: PathBuf,
    /// Number of `<<<<<<<...>>>>>>>` regions found.
    pub hunk_count: u32,
    /// Classification by extension/content.
    pub kind: ConflictKind,
    /// Fraction of hunks resolvable by whitespace-only normalization, in [0, 1].
    pub trivial_ratio: f64,
}

/// Scan `repo_root.join(rel_path)` for conflict marker regions.
///
/// # Errors
/// Returns an I/O error if the file cannot be read, or an unbalanced-markers
/// error (`source`/`detail` pair suitable for [`crate::error::FacadeError`])
/// if a `<<<<<<<` is never closed by a matching `>>>>>>>`, or a closing or
/// separator marker appears outside any open region.
pub fn scan_conflict_file(
    repo_root: &Path,
    rel_path: &Path,
) -> Result<ScannedConflict, crate::error::FacadeError> {
    let bytes = fs::read(repo_root.join(rel_path))?;
    if bytes.iter().take(8000).any(|&b| b == 0) {
        return Ok(ScannedConflict {
            path: rel_path.to_path_buf(),
            hunk_count: 1,
            kind: ConflictKind::Binary,
            trivial_ratio: 0.0,
        });
    }

    let text = String::from_utf8_lossy(&bytes);
    let hunks = scan_hunks(&text, rel_path)?;
    let hunk_count = hunks.len() as u32;
    let trivial = hunks.iter().filter(|h| h.is_trivial()).count();
    let trivial_ratio = if hunk_count == 0 { 0.0 } else { trivial as f64 / f64(hunk_count) };

    Ok(ScannedConflict {
        path: rel_path.to_path_buf(),
        hunk_count,
        kind: classify_path(rel_path),
        trivial_ratio,
    })
}

#[allow(clippy::cast_precision_loss)]
const fn f64(n: u32) -> f64 {
    n as f64
}

struct Hunk {
    ours: String,
    theirs: String,
}

impl Hunk {
    /// A hunk is trivial if the two non-base sides differ only in
    /// whitespace or line-ending normalization.
    fn is_trivial(&self) -> bool {
        normalize_whitespace(&self.ours) == normalize_whitespace(&self.theirs)
    }
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

enum ScanState {
    Outside,
    Ours { ours: String },
    Base { ours: String, base: String },
    Theirs { ours: String, theirs: String },
}

fn scan_hunks(text: &str, rel_path: &Path) -> Result<Vec<Hunk>, crate::error::FacadeError> {
    let mut hunks = Vec::new();
    let mut state = ScanState::Outside;

    for line in text.lines() {
        state = match (state, line) {
            (ScanState::Outside, l) if l.starts_with("<<<<<<<") => {
                ScanState::Ours { ours: String::new() }
            }
            (ScanState::Outside, l) if l.starts_with("|||||||") || l.starts_with(">>>>>>>") => {
                return Err(unbalanced(rel_path, &format!("unexpected `{l}` outside a conflict region")));
            }
            (ScanState::Outside, _) => ScanState::Outside,

            (ScanState::Ours { ours }, l) if l.starts_with("|||||||") => {
                ScanState::Base { ours, base: String::new() }
            }
            (ScanState::Ours { ours }, l) if l.starts_with("=======") => {
                ScanState::Theirs { ours, theirs: String::new() }
            }
            (ScanState::Ours { .. }, l) if l.starts_with("<<<<<<<") => {
                return Err(unbalanced(rel_path, "nested `<<<<<<<` before a matching `=======`"));
            }
            (ScanState::Ours { mut ours }, l) => {
                push_line(&mut ours, l);
                ScanState::Ours { ours }
            }

            (ScanState::Base { ours, .. }, l) if l.starts_with("=======") => {
                ScanState::Theirs { ours, theirs: String::new() }
            }
            (ScanState::Base { ours, mut base }, l) => {
                push_line(&mut base, l);
                ScanState::Base { ours, base }
            }

            (ScanState::Theirs { ours, theirs }, l) if l.starts_with(">>>>>>>") => {
                hunks.push(Hunk { ours, theirs });
                ScanState::Outside
            }
            (ScanState::Theirs { .. }, l) if l.starts_with("=======") => {
                return Err(unbalanced(rel_path, "duplicate `=======` in one conflict region"));
            }
            (ScanState::Theirs { ours, mut theirs }, l) => {
                push_line(&mut theirs, l);
                ScanState::Theirs { ours, theirs }
            }
        };
    }

    if !matches!(state, ScanState::Outside) {
        return Err(unbalanced(rel_path, "file ended inside an open conflict region"));
    }

    Ok(hunks)
}

fn push_line(buf: &mut String, line: &str) {
    buf.push_str(line);
    buf.push('\n');
}

fn unbalanced(rel_path: &Path, detail: &str) -> crate::error::FacadeError {
    crate::error::FacadeError::UnbalancedMarkers {
        path: rel_path.to_path_buf(),
        detail: detail.to_owned(),
    }
}

/// Classify a path by extension/filename; binary detection happens earlier
/// in [`scan_conflict_file`] and takes precedence over this.
#[must_use]
pub fn classify_path(rel_path: &Path) -> ConflictKind {
    let name = rel_path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if KNOWN_LOCK_FILENAMES.contains(&name) || name.ends_with(".lock") {
        return ConflictKind::Lock;
    }
    match rel_path.extension().and_then(|e| e.to_str()) {
        Some("json") => ConflictKind::Json,
        Some("yaml" | "yml") => ConflictKind::Yaml,
        _ => ConflictKind::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_tmp(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conflicted.txt");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        (dir, PathBuf::from("conflicted.txt"))
    }

    #[test]
    fn counts_two_separate_hunks() {
        let contents = "\
before
<<<<<<< HEAD
ours1
=======
theirs1
>>>>>>> branch
middle
<<<<<<< HEAD
ours2
=======
theirs2
>>>>>>> branch
after
";
        let (dir, rel) = write_tmp(contents);
        let scanned = scan_conflict_file(dir.path(), &rel).unwrap();
        assert_eq!(scanned.hunk_count, 2);
        assert_eq!(scanned.kind, ConflictKind::Text);
    }

    #[test]
    fn zdiff3_base_section_is_skipped_for_triviality() {
        let contents = "\
<<<<<<< HEAD
same text
||||||| base
original
=======
same text
>>>>>>> branch
";
        let (dir, rel) = write_tmp(contents);
        let scanned = scan_conflict_file(dir.path(), &rel).unwrap();
        assert_eq!(scanned.hunk_count, 1);
        assert!((scanned.trivial_ratio - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn whitespace_only_difference_is_trivial() {
        let contents = "<<<<<<< HEAD\nfoo   bar\n=======\nfoo bar\n>>>>>>> branch\n";
        let (dir, rel) = write_tmp(contents);
        let scanned = scan_conflict_file(dir.path(), &rel).unwrap();
        assert!((scanned.trivial_ratio - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn substantive_difference_is_not_trivial() {
        let contents = "<<<<<<< HEAD\nfoo\n=======\nbar\n>>>>>>> branch\n";
        let (dir, rel) = write_tmp(contents);
        let scanned = scan_conflict_file(dir.path(), &rel).unwrap();
        assert!(scanned.trivial_ratio < f64::EPSILON);
    }

    #[test]
    fn unclosed_marker_is_an_error() {
        let contents = "<<<<<<< HEAD\nours\n=======\ntheirs\n";
        let (dir, rel) = write_tmp(contents);
        assert!(scan_conflict_file(dir.path(), &rel).is_err());
    }

    #[test]
    fn stray_closing_marker_is_an_error() {
        let contents = "plain text\n>>>>>>> branch\n";
        let (dir, rel) = write_tmp(contents);
        assert!(scan_conflict_file(dir.path(), &rel).is_err());
    }

    #[test]
    fn null_byte_classifies_as_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        fs::write(&path, [0u8, 1, 2, 3]).unwrap();
        let scanned = scan_conflict_file(dir.path(), Path::new("blob.bin")).unwrap();
        assert_eq!(scanned.kind, ConflictKind::Binary);
    }

    #[test]
    fn classifies_by_extension_and_lockfile_name() {
        assert_eq!(classify_path(Path::new("a.json")), ConflictKind::Json);
        assert_eq!(classify_path(Path::new("a.yml")), ConflictKind::Yaml);
        assert_eq!(classify_path(Path::new("Cargo.lock")), ConflictKind::Lock);
        assert_eq!(classify_path(Path::new("yarn.lock")), ConflictKind::Lock);
        assert_eq!(classify_path(Path::new("main.rs")), ConflictKind::Text);
    }
}

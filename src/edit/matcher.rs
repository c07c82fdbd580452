//! Locating and applying edits in a working tree.
//!
//! Matching is line based. Each line is compared after trimming leading and
//! trailing whitespace, so the model may re-indent freely; the first window
//! of consecutive file lines equal to the edit's match key wins. The window is
//! then replaced with the edit's raw lines. Bytes outside the window are
//! copied through untouched, line terminators included.

use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use super::{Edit, EditError};

/// Directories never searched when resolving a partial path.
pub(crate) const SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
    ".mypy_cache",
];

/// Why an edit could not be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotMatchedReason {
    /// No file under the root corresponds to the target path.
    FileNotFound,
    /// The target path points outside the project root.
    OutsideRoot,
    /// More than one file ends with the target path.
    AmbiguousPath(Vec<PathBuf>),
    /// The file exists but holds no window equal to the match key.
    ContentNotFound,
}

impl std::fmt::Display for NotMatchedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileNotFound => write!(f, "file not found"),
            Self::OutsideRoot => write!(f, "path leaves the project root"),
            Self::AmbiguousPath(candidates) => {
                write!(f, "path is ambiguous ({} candidates)", candidates.len())
            }
            Self::ContentNotFound => write!(f, "code not found in file"),
        }
    }
}

/// Result of trying to apply one edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The edit was written to `path`, replacing `replaced` lines at `start_line`.
    Applied {
        path: PathBuf,
        start_line: usize,
        replaced: usize,
    },
    /// The edit could not be placed; the tree is unchanged.
    NotMatched(NotMatchedReason),
}

impl MatchOutcome {
    /// Whether the edit landed.
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Find the first window of `file_lines` whose normalized lines equal the
/// normalized `key_lines`. An empty key matches at line 0.
pub fn find_window(file_lines: &[&str], key_lines: &[&str]) -> Option<usize> {
    if key_lines.is_empty() {
        return Some(0);
    }
    if key_lines.len() > file_lines.len() {
        return None;
    }

    let key: Vec<&str> = key_lines.iter().map(|l| l.trim()).collect();
    file_lines.windows(key.len()).position(|window| {
        window
            .iter()
            .zip(&key)
            .all(|(line, expected)| line.trim() == *expected)
    })
}

/// Apply `edit` to `text`. Returns the rewritten text and the window start,
/// or `None` when the match key does not occur.
pub fn apply_to_text(text: &str, edit: &Edit) -> Option<(String, usize)> {
    let raw_lines: Vec<&str> = text.split_inclusive('\n').collect();
    let bare_lines: Vec<&str> = raw_lines.iter().map(|l| strip_eol(l)).collect();
    let key = key_lines(edit);

    let start = find_window(&bare_lines, &key)?;
    let end = start + key.len();

    let eol = detect_eol(text);
    // The last replaced line keeps its own terminator, which may be none at EOF.
    let tail_eol = if end > start {
        line_terminator(raw_lines[end - 1])
    } else {
        eol
    };

    let mut out = String::with_capacity(text.len() + edit.content.len());
    for line in &raw_lines[..start] {
        out.push_str(line);
    }

    let replacement = split_lines(&edit.content);
    let count = replacement.len();
    for (i, line) in replacement.into_iter().enumerate() {
        out.push_str(line);
        out.push_str(if i + 1 == count { tail_eol } else { eol });
    }

    for line in &raw_lines[end..] {
        out.push_str(line);
    }

    Some((out, start))
}

/// Resolve the model-supplied `target` against `root`.
///
/// The literal path is tried first; otherwise the tree is searched for files
/// whose relative path ends with the target's components. Targets with `..`
/// components, or that resolve through a symlink to somewhere else, are
/// rejected.
pub fn resolve_target(root: &Path, target: &str) -> Result<PathBuf, NotMatchedReason> {
    let cleaned = target.trim().trim_start_matches("./");
    let candidate = Path::new(cleaned);

    if candidate
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(NotMatchedReason::OutsideRoot);
    }

    let literal = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };
    if literal.is_file() {
        if is_within(root, &literal) {
            return Ok(literal);
        }
        if !candidate.is_absolute() {
            return Err(NotMatchedReason::OutsideRoot);
        }
    }

    let suffix = candidate
        .strip_prefix("/")
        .unwrap_or(candidate)
        .to_path_buf();
    if suffix.as_os_str().is_empty() {
        return Err(NotMatchedReason::FileNotFound);
    }

    let matches: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .strip_prefix(root)
                .is_ok_and(|rel| rel.ends_with(&suffix))
        })
        .map(|e| e.into_path())
        .collect();

    match matches.len() {
        0 => Err(NotMatchedReason::FileNotFound),
        1 => matches
            .into_iter()
            .next()
            .ok_or(NotMatchedReason::FileNotFound),
        _ => Err(NotMatchedReason::AmbiguousPath(matches)),
    }
}

/// Whether `path` lies under `root` once symlinks are resolved.
fn is_within(root: &Path, path: &Path) -> bool {
    match (root.canonicalize(), path.canonicalize()) {
        (Ok(root), Ok(path)) => path.starts_with(root),
        _ => false,
    }
}

/// Apply `edit` inside the tree at `root`, writing the file on success.
pub fn apply_edit(root: &Path, edit: &Edit) -> Result<MatchOutcome, EditError> {
    match resolve_target(root, &edit.target_path) {
        Ok(path) => apply_to_file(&path, edit),
        Err(reason) => {
            tracing::debug!(target_path = %edit.target_path, %reason, "Edit target not resolved");
            Ok(MatchOutcome::NotMatched(reason))
        }
    }
}

/// Apply `edit` to an already resolved file.
pub fn apply_to_file(path: &Path, edit: &Edit) -> Result<MatchOutcome, EditError> {
    let text = std::fs::read_to_string(path).map_err(|source| EditError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let Some((rewritten, start_line)) = apply_to_text(&text, edit) else {
        tracing::debug!(path = %path.display(), "Edit content not found in file");
        return Ok(MatchOutcome::NotMatched(NotMatchedReason::ContentNotFound));
    };

    std::fs::write(path, rewritten).map_err(|source| EditError::Io {
        path: path.display().to_string(),
        source,
    })?;

    Ok(MatchOutcome::Applied {
        path: path.to_path_buf(),
        start_line,
        replaced: key_lines(edit).len(),
    })
}

/// Lines of the match key; a blank key is an empty window.
fn key_lines(edit: &Edit) -> Vec<&str> {
    if edit.has_empty_origin() {
        Vec::new()
    } else {
        split_lines(edit.match_key())
    }
}

/// Whether a walk entry is a vendored or build directory.
pub(crate) fn is_skipped_dir(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIP_DIRS.contains(&name))
}

fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    text.split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect()
}

fn strip_eol(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

fn line_terminator(line: &str) -> &'static str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else if line.ends_with('\n') {
        "\n"
    } else {
        ""
    }
}

fn detect_eol(text: &str) -> &'static str {
    if text.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

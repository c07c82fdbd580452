//! Code search backend for the context-gathering agent.
//!
//! [`CodeSearch`] is the seam the orchestrator dispatches to. The bundled
//! [`LocalCodeSearch`] walks a checkout on disk and finds definitions with
//! line-anchored regexes. Block boundaries come from indentation for
//! `:`-terminated headers (Python) and from brace balance otherwise.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

use crate::edit::matcher::is_skipped_dir;
use crate::edit::{resolve_target, NotMatchedReason};

/// Extensions treated as source code.
const SOURCE_EXTENSIONS: &[&str] = &[
    "py", "pyi", "rs", "go", "js", "jsx", "ts", "tsx", "mjs", "java", "kt", "scala", "c", "h",
    "cc", "cpp", "hpp", "cs", "rb", "php", "swift", "sh", "lua",
];

/// Results rendered in full; the rest are only listed by file.
const DEFAULT_MAX_RESULTS: usize = 5;

/// Longest block returned for one definition.
const MAX_BLOCK_LINES: usize = 400;

/// Lines scanned after a definition to find its body opener.
const HEADER_SCAN_LINES: usize = 10;

/// Context lines around a snippet hit outside any method.
const SNIPPET_CONTEXT: usize = 3;

const MODIFIERS: &str = r"(?:(?:pub(?:\([^)]*\))?|public|private|protected|internal|static|async|export|default|override|final|unsafe|const|extern|virtual|abstract|sealed|data)\s+)*";

static ANY_METHOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^\s*{}(?:def|fn|func|function)\s+(?:\([^)]*\)\s*)?[A-Za-z_][A-Za-z0-9_]*\s*[(<\[]",
        MODIFIERS
    ))
    .expect("valid method regex")
});

/// Result of one search capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOutput {
    /// Text forwarded to the model: code or an error message.
    pub content: String,
    /// One-line summary of what happened.
    pub summary: String,
    pub ok: bool,
}

impl SearchOutput {
    pub fn found(content: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            summary: summary.into(),
            ok: true,
        }
    }

    pub fn failure(content: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            summary: summary.into(),
            ok: false,
        }
    }

    fn not_found(message: String) -> Self {
        Self::failure(message.clone(), message)
    }
}

/// Search capabilities offered to the model.
///
/// Implementations never fail outright; problems are reported through
/// [`SearchOutput::ok`].
pub trait CodeSearch: Send + Sync {
    fn search_class(&self, class_name: &str) -> SearchOutput;
    fn search_class_in_file(&self, class_name: &str, file_path: &str) -> SearchOutput;
    fn search_method(&self, method_name: &str) -> SearchOutput;
    fn search_method_in_class(&self, method_name: &str, class_name: &str) -> SearchOutput;
    fn search_method_in_file(&self, method_name: &str, file_path: &str) -> SearchOutput;
    fn search_code(&self, code_str: &str) -> SearchOutput;
    fn search_code_in_file(&self, code_str: &str, file_path: &str) -> SearchOutput;
    fn extract_fullcode(&self, file_path: &str) -> SearchOutput;
}

/// A piece of code found by a search.
#[derive(Debug, Clone)]
struct Snippet {
    rel_path: String,
    text: String,
}

/// A loaded source file.
struct SourceFile {
    rel_path: String,
    lines: Vec<String>,
}

/// Regex-driven search over a checkout on disk.
#[derive(Debug, Clone)]
pub struct LocalCodeSearch {
    root: PathBuf,
    max_results: usize,
}

impl LocalCodeSearch {
    /// Search the tree rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Limit how many results are shown in full.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn source_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| !is_skipped_dir(e))
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
            })
            .map(|e| e.into_path())
            .collect();
        files.sort();
        files
    }

    fn load(&self, path: &Path) -> Option<SourceFile> {
        let content = std::fs::read_to_string(path).ok()?;
        Some(SourceFile {
            rel_path: self.rel_path(path),
            lines: content.lines().map(str::to_string).collect(),
        })
    }

    fn all_sources(&self) -> impl Iterator<Item = SourceFile> + '_ {
        self.source_files()
            .into_iter()
            .filter_map(move |path| self.load(&path))
    }

    fn rel_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .display()
            .to_string()
    }

    /// Resolve and load a model-supplied path, or explain why not.
    fn source_at(&self, file_path: &str) -> Result<SourceFile, SearchOutput> {
        let path = resolve_target(&self.root, file_path).map_err(|reason| match reason {
            NotMatchedReason::AmbiguousPath(candidates) => {
                let listed = candidates
                    .iter()
                    .map(|c| format!("- {}", self.rel_path(c)))
                    .collect::<Vec<_>>()
                    .join("\n");
                SearchOutput::failure(
                    format!(
                        "The file path {} is ambiguous. Candidates:\n{}",
                        file_path, listed
                    ),
                    format!("The file path {} is ambiguous.", file_path),
                )
            }
            _ => SearchOutput::not_found(format!(
                "Could not find file {} in the codebase.",
                file_path
            )),
        })?;

        self.load(&path).ok_or_else(|| {
            SearchOutput::not_found(format!("Could not read file {} as text.", file_path))
        })
    }

    /// Render snippets, showing at most `max_results` in full.
    fn render(&self, what: &str, snippets: Vec<Snippet>, scope: &str) -> SearchOutput {
        let total = snippets.len();
        let mut content = format!("Found {} {} {}:\n\n", total, what, scope);

        for (i, snippet) in snippets.iter().take(self.max_results).enumerate() {
            content.push_str(&format!(
                "- Search result {}:\n<file>{}</file>\n<code>\n{}\n</code>\n\n",
                i + 1,
                snippet.rel_path,
                snippet.text
            ));
        }

        if total > self.max_results {
            content.push_str("Other results are in these files:\n");
            let mut seen: Vec<&str> = Vec::new();
            for snippet in &snippets[self.max_results..] {
                if !seen.contains(&snippet.rel_path.as_str()) {
                    seen.push(&snippet.rel_path);
                    content.push_str(&format!("- {}\n", snippet.rel_path));
                }
            }
        }

        SearchOutput::found(
            content.trim_end().to_string(),
            format!("Found {} {} {}.", total, what, scope),
        )
    }

    fn class_snippets(
        &self,
        source: &SourceFile,
        class_name: &str,
        signature_only: bool,
    ) -> Vec<Snippet> {
        let Some(pattern) = class_regex(class_name) else {
            return Vec::new();
        };
        definition_starts(&source.lines, &pattern)
            .into_iter()
            .map(|start| {
                let (from, to) = block_range(&source.lines, start);
                let text = if signature_only {
                    class_signature(&source.lines[from..to])
                } else {
                    source.lines[from..to].join("\n")
                };
                Snippet {
                    rel_path: source.rel_path.clone(),
                    text,
                }
            })
            .collect()
    }

    fn method_snippets(&self, source: &SourceFile, method_name: &str) -> Vec<Snippet> {
        let Some(pattern) = method_regex(method_name) else {
            return Vec::new();
        };
        definition_starts(&source.lines, &pattern)
            .into_iter()
            .map(|start| {
                let (from, to) = block_range(&source.lines, start);
                Snippet {
                    rel_path: source.rel_path.clone(),
                    text: source.lines[from..to].join("\n"),
                }
            })
            .collect()
    }

    fn code_snippets(&self, source: &SourceFile, code_str: &str) -> Vec<Snippet> {
        let needle = code_str.trim();
        if needle.is_empty() {
            return Vec::new();
        }
        let first_line = needle.lines().next().unwrap_or(needle).trim();

        let mut covered_until = 0;
        let mut snippets = Vec::new();
        for (i, line) in source.lines.iter().enumerate() {
            if i < covered_until || !line.contains(first_line) {
                continue;
            }
            let (from, to) = enclosing_method(&source.lines, i).unwrap_or_else(|| {
                (
                    i.saturating_sub(SNIPPET_CONTEXT),
                    (i + SNIPPET_CONTEXT + 1).min(source.lines.len()),
                )
            });
            covered_until = to;
            snippets.push(Snippet {
                rel_path: source.rel_path.clone(),
                text: source.lines[from..to].join("\n"),
            });
        }
        snippets
    }
}

impl CodeSearch for LocalCodeSearch {
    fn search_class(&self, class_name: &str) -> SearchOutput {
        let snippets: Vec<Snippet> = self
            .all_sources()
            .flat_map(|source| self.class_snippets(&source, class_name, true))
            .collect();
        if snippets.is_empty() {
            return SearchOutput::not_found(format!(
                "Could not find class {} in the codebase.",
                class_name
            ));
        }
        self.render(
            "classes",
            snippets,
            &format!("with name {} in the codebase", class_name),
        )
    }

    fn search_class_in_file(&self, class_name: &str, file_path: &str) -> SearchOutput {
        let source = match self.source_at(file_path) {
            Ok(source) => source,
            Err(output) => return output,
        };
        let snippets = self.class_snippets(&source, class_name, false);
        if snippets.is_empty() {
            return SearchOutput::not_found(format!(
                "Could not find class {} in file {}.",
                class_name, file_path
            ));
        }
        self.render(
            "classes",
            snippets,
            &format!("with name {} in file {}", class_name, file_path),
        )
    }

    fn search_method(&self, method_name: &str) -> SearchOutput {
        let snippets: Vec<Snippet> = self
            .all_sources()
            .flat_map(|source| self.method_snippets(&source, method_name))
            .collect();
        if snippets.is_empty() {
            return SearchOutput::not_found(format!(
                "Could not find method {} in the codebase.",
                method_name
            ));
        }
        self.render(
            "methods",
            snippets,
            &format!("with name {} in the codebase", method_name),
        )
    }

    fn search_method_in_class(&self, method_name: &str, class_name: &str) -> SearchOutput {
        let (Some(class_pattern), Some(method_pattern)) =
            (class_regex(class_name), method_regex(method_name))
        else {
            return SearchOutput::failure("Invalid search pattern.", "Invalid search pattern.");
        };

        let mut class_found = false;
        let mut snippets = Vec::new();
        for source in self.all_sources() {
            for start in definition_starts(&source.lines, &class_pattern) {
                class_found = true;
                let (from, to) = block_range(&source.lines, start);
                let body = &source.lines[from..to];
                for method_start in definition_starts(body, &method_pattern) {
                    let (m_from, m_to) = block_range(body, method_start);
                    snippets.push(Snippet {
                        rel_path: source.rel_path.clone(),
                        text: body[m_from..m_to].join("\n"),
                    });
                }
            }
        }

        if !class_found {
            return SearchOutput::not_found(format!(
                "Could not find class {} in the codebase.",
                class_name
            ));
        }
        if snippets.is_empty() {
            return SearchOutput::not_found(format!(
                "Could not find method {} in class {}.",
                method_name, class_name
            ));
        }
        self.render(
            "methods",
            snippets,
            &format!("with name {} in class {}", method_name, class_name),
        )
    }

    fn search_method_in_file(&self, method_name: &str, file_path: &str) -> SearchOutput {
        let source = match self.source_at(file_path) {
            Ok(source) => source,
            Err(output) => return output,
        };
        let snippets = self.method_snippets(&source, method_name);
        if snippets.is_empty() {
            return SearchOutput::not_found(format!(
                "Could not find method {} in file {}.",
                method_name, file_path
            ));
        }
        self.render(
            "methods",
            snippets,
            &format!("with name {} in file {}", method_name, file_path),
        )
    }

    fn search_code(&self, code_str: &str) -> SearchOutput {
        let snippets: Vec<Snippet> = self
            .all_sources()
            .flat_map(|source| self.code_snippets(&source, code_str))
            .collect();
        if snippets.is_empty() {
            return SearchOutput::not_found(format!(
                "Could not find code {} in the codebase.",
                code_str
            ));
        }
        self.render(
            "snippets",
            snippets,
            &format!("containing `{}` in the codebase", code_str),
        )
    }

    fn search_code_in_file(&self, code_str: &str, file_path: &str) -> SearchOutput {
        let source = match self.source_at(file_path) {
            Ok(source) => source,
            Err(output) => return output,
        };
        let snippets = self.code_snippets(&source, code_str);
        if snippets.is_empty() {
            return SearchOutput::not_found(format!(
                "Could not find code {} in file {}.",
                code_str, file_path
            ));
        }
        self.render(
            "snippets",
            snippets,
            &format!("containing `{}` in file {}", code_str, file_path),
        )
    }

    fn extract_fullcode(&self, file_path: &str) -> SearchOutput {
        let source = match self.source_at(file_path) {
            Ok(source) => source,
            Err(output) => return output,
        };
        SearchOutput::found(
            format!(
                "<file>{}</file>\n<code>\n{}\n</code>",
                source.rel_path,
                source.lines.join("\n")
            ),
            format!("Extracted the full code of {}.", source.rel_path),
        )
    }
}

fn class_regex(name: &str) -> Option<Regex> {
    Regex::new(&format!(
        r"^\s*{}(?:class|struct|interface|trait|enum|type|impl(?:<[^>]*>)?)\s+{}\b",
        MODIFIERS,
        regex::escape(name.trim())
    ))
    .ok()
}

fn method_regex(name: &str) -> Option<Regex> {
    Regex::new(&format!(
        r"^\s*{}(?:def|fn|func|function)\s+(?:\([^)]*\)\s*)?{}\s*[(<\[]",
        MODIFIERS,
        regex::escape(name.trim())
    ))
    .ok()
}

fn definition_starts(lines: &[String], pattern: &Regex) -> Vec<usize> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| pattern.is_match(line))
        .map(|(i, _)| i)
        .collect()
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Lines `[from, to)` of the definition starting at `start`, decorators included.
fn block_range(lines: &[String], start: usize) -> (usize, usize) {
    let indent = indent_of(&lines[start]);
    let mut from = start;
    while from > 0 {
        let prev = &lines[from - 1];
        if prev.trim_start().starts_with('@') && indent_of(prev) == indent {
            from -= 1;
        } else {
            break;
        }
    }
    (from, block_end(lines, start))
}

fn block_end(lines: &[String], start: usize) -> usize {
    let limit = (start + MAX_BLOCK_LINES).min(lines.len());
    let scan_end = (start + HEADER_SCAN_LINES).min(lines.len());

    for header in start..scan_end {
        let code = strip_line_comment(&lines[header]);
        if code.contains('{') {
            return brace_block_end(lines, start, limit);
        }
        if code.ends_with(':') {
            return indent_block_end(lines, start, header, limit);
        }
        if code.ends_with(';') {
            return header + 1;
        }
    }
    start + 1
}

fn brace_block_end(lines: &[String], start: usize, limit: usize) -> usize {
    let mut depth: i64 = 0;
    let mut opened = false;
    for (i, line) in lines.iter().enumerate().take(limit).skip(start) {
        for c in strip_line_comment(line).chars() {
            match c {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if opened && depth <= 0 {
            return i + 1;
        }
    }
    limit
}

fn indent_block_end(lines: &[String], start: usize, header: usize, limit: usize) -> usize {
    let base = indent_of(&lines[start]);
    let mut end = header + 1;
    let mut last_code = header + 1;
    while end < limit {
        let line = &lines[end];
        if line.trim().is_empty() {
            end += 1;
            continue;
        }
        if indent_of(line) <= base {
            break;
        }
        end += 1;
        last_code = end;
    }
    last_code
}

/// Code part of a line, without a trailing `#` or `//` comment.
fn strip_line_comment(line: &str) -> &str {
    let cut = [line.find(" #"), line.find("//")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(line.len());
    let code = &line[..cut];
    if code.trim_start().starts_with('#') {
        ""
    } else {
        code.trim_end()
    }
}

/// Header line plus method signatures of a class block.
fn class_signature(block: &[String]) -> String {
    let header = block
        .iter()
        .position(|line| !line.trim_start().starts_with('@'))
        .unwrap_or(0);
    block
        .iter()
        .enumerate()
        .filter(|(i, line)| *i <= header || ANY_METHOD.is_match(line))
        .map(|(_, line)| line.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Method whose block covers line `hit`, searching backwards.
fn enclosing_method(lines: &[String], hit: usize) -> Option<(usize, usize)> {
    let lower = hit.saturating_sub(MAX_BLOCK_LINES);
    (lower..=hit)
        .rev()
        .filter(|&i| ANY_METHOD.is_match(&lines[i]))
        .map(|i| block_range(lines, i))
        .find(|&(_, end)| end > hit)
}

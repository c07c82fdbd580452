//! The working tree that edits are matched against and applied to.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::error::TaskError;

/// A checkout that can be restored to a clean state between attempts.
#[async_trait]
pub trait Workspace: Send + Sync {
    /// Root directory of the checkout.
    fn project_root(&self) -> &Path;

    /// Discard every change made since the checkout was prepared.
    async fn reset(&self) -> Result<(), TaskError>;
}

/// A project directory, reset through git when it is a git checkout.
///
/// Resetting runs `git reset --hard <commit>` (or `HEAD` without a base
/// commit) followed by `git clean -fd`. Paths registered with
/// [`GitWorkspace::preserving`] are excluded from the clean. Directories that
/// are not git checkouts are left alone.
#[derive(Debug, Clone)]
pub struct GitWorkspace {
    root: PathBuf,
    base_commit: Option<String>,
    preserved: Vec<PathBuf>,
}

impl GitWorkspace {
    pub fn new(root: impl Into<PathBuf>, base_commit: Option<String>) -> Self {
        Self {
            root: root.into(),
            base_commit: base_commit.filter(|c| !c.trim().is_empty()),
            preserved: Vec::new(),
        }
    }

    /// Keep `path` through resets when it lies inside the checkout.
    pub fn preserving(mut self, path: impl Into<PathBuf>) -> Self {
        self.preserved.push(path.into());
        self
    }

    /// Exclude patterns for `git clean`, or `None` when a preserved path
    /// holds the whole checkout and nothing may be cleaned.
    fn clean_excludes(&self) -> Option<Vec<String>> {
        let Ok(root) = self.root.canonicalize() else {
            return Some(Vec::new());
        };

        let mut patterns = Vec::new();
        for path in self.preserved.iter().filter_map(|p| p.canonicalize().ok()) {
            if root.starts_with(&path) {
                return None;
            }
            if let Ok(rel) = path.strip_prefix(&root) {
                let rel = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                patterns.push(format!("/{}/", rel));
            }
        }
        Some(patterns)
    }

    pub fn base_commit(&self) -> Option<&str> {
        self.base_commit.as_deref()
    }

    pub fn is_git_checkout(&self) -> bool {
        self.root.join(".git").exists()
    }

    async fn git(&self, args: &[&str]) -> Result<(), TaskError> {
        let output = tokio::process::Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(TaskError::GitFailed {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Workspace for GitWorkspace {
    fn project_root(&self) -> &Path {
        &self.root
    }

    async fn reset(&self) -> Result<(), TaskError> {
        if !self.root.is_dir() {
            return Err(TaskError::MissingProject(self.root.display().to_string()));
        }
        if !self.is_git_checkout() {
            tracing::debug!(path = %self.root.display(), "Not a git checkout, skipping reset");
            return Ok(());
        }

        let target = self.base_commit.as_deref().unwrap_or("HEAD");
        self.git(&["reset", "--hard", target]).await?;

        match self.clean_excludes() {
            Some(patterns) => {
                let mut args = vec!["clean", "-fd"];
                for pattern in &patterns {
                    args.extend(["-e", pattern.as_str()]);
                }
                self.git(&args).await?;
            }
            None => tracing::warn!(
                path = %self.root.display(),
                "Output directory contains the checkout, skipping git clean"
            ),
        }
        tracing::debug!(path = %self.root.display(), commit = target, "Workspace reset");
        Ok(())
    }
}

//! Tasks: a project checkout to document and where its results go.
//!
//! A task names a project directory, the README that introduces it and,
//! optionally, the commit the checkout is reset to between attempts. Batch
//! runs read a JSON list of [`TaskSpec`]s; tasks sharing a `group` run one
//! after another, groups run concurrently.

pub mod progress;
pub mod runner;
pub mod workspace;

pub use progress::TaskProgress;
pub use runner::{group_tasks, summarize_reports, TaskReport, TaskRunner};
pub use workspace::{GitWorkspace, Workspace};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::edit::matcher::is_skipped_dir;
use crate::error::TaskError;
use crate::scaffold::prepare_readme_prompt;

/// Name of the per-task metadata file.
pub const META_FILE: &str = "meta.json";

/// README file names tried when none is given.
const README_CANDIDATES: &[&str] = &["README.md", "README.rst", "README.txt", "README"];

/// Depth of the folder structure shown to the agent.
const STRUCTURE_DEPTH: usize = 4;

/// Entries listed in the folder structure before it is cut off.
const STRUCTURE_MAX_ENTRIES: usize = 400;

/// One task as written in a batch file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_id: String,
    pub repo_path: PathBuf,
    /// README path, relative to `repo_path` unless absolute.
    #[serde(default)]
    pub readme: Option<PathBuf>,
    #[serde(default)]
    pub base_commit: Option<String>,
    /// Tasks of the same group never run concurrently.
    #[serde(default)]
    pub group: Option<String>,
}

impl TaskSpec {
    /// Read a JSON array of task specs.
    pub fn load_list(path: &Path) -> Result<Vec<TaskSpec>, TaskError> {
        let content = std::fs::read_to_string(path)?;
        let specs: Vec<TaskSpec> = serde_json::from_str(&content)?;
        if let Some(dup) = first_duplicate(&specs) {
            return Err(TaskError::InvalidTaskList(format!(
                "duplicate task id {}",
                dup
            )));
        }
        Ok(specs)
    }

    /// Key used to group tasks; ungrouped tasks form their own group.
    pub fn group_key(&self) -> &str {
        self.group.as_deref().unwrap_or(&self.task_id)
    }
}

fn first_duplicate(specs: &[TaskSpec]) -> Option<&str> {
    let mut seen = std::collections::HashSet::new();
    specs
        .iter()
        .map(|s| s.task_id.as_str())
        .find(|id| !seen.insert(*id))
}

/// A project checkout to document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTask {
    pub task_id: String,
    pub project_path: PathBuf,
    pub readme_path: PathBuf,
    pub base_commit: Option<String>,
}

impl LocalTask {
    /// Build a task, locating the README when `readme` is `None`.
    pub fn new(
        task_id: impl Into<String>,
        project_path: impl Into<PathBuf>,
        readme: Option<PathBuf>,
        base_commit: Option<String>,
    ) -> Result<Self, TaskError> {
        let project_path: PathBuf = project_path.into();
        if !project_path.is_dir() {
            return Err(TaskError::MissingProject(project_path.display().to_string()));
        }

        let readme_path = match readme {
            Some(path) if path.is_absolute() => path,
            Some(path) => project_path.join(path),
            None => README_CANDIDATES
                .iter()
                .map(|name| project_path.join(name))
                .find(|p| p.is_file())
                .unwrap_or_else(|| project_path.join(README_CANDIDATES[0])),
        };

        Ok(Self {
            task_id: task_id.into(),
            project_path,
            readme_path,
            base_commit,
        })
    }

    pub fn from_spec(spec: &TaskSpec) -> Result<Self, TaskError> {
        Self::new(
            spec.task_id.clone(),
            spec.repo_path.clone(),
            spec.readme.clone(),
            spec.base_commit.clone(),
        )
    }

    /// README text; a missing README reads as empty.
    pub fn readme(&self) -> Result<String, TaskError> {
        match std::fs::read_to_string(&self.readme_path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.readme_path.display(), "README not found");
                Ok(String::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// First user message for the agent.
    pub fn readme_prompt(&self) -> Result<String, TaskError> {
        Ok(prepare_readme_prompt(
            &self.readme()?,
            &folder_structure(&self.project_path),
        ))
    }

    pub fn workspace(&self) -> GitWorkspace {
        GitWorkspace::new(self.project_path.clone(), self.base_commit.clone())
    }

    /// Output directory name: task id plus a start timestamp.
    pub fn output_dir_name(&self, started: DateTime<Utc>) -> String {
        format!("{}_{}", self.task_id, started.format("%Y-%m-%d_%H-%M-%S"))
    }

    pub fn meta(&self) -> TaskMeta {
        TaskMeta {
            task_info: TaskInfo {
                base_commit: self.base_commit.clone().unwrap_or_default(),
                description: self.readme_path.display().to_string(),
                instance_id: self.task_id.clone(),
            },
            setup_info: SetupInfo {
                repo_path: self.project_path.display().to_string(),
            },
            stats: None,
        }
    }
}

/// Contents of `meta.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMeta {
    pub task_info: TaskInfo,
    pub setup_info: SetupInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<RunStats>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub base_commit: String,
    pub description: String,
    pub instance_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupInfo {
    pub repo_path: String,
}

/// Timing of one task run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub elapsed_seconds: f64,
}

impl RunStats {
    pub fn between(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        let elapsed_seconds = (end_time - start_time).num_milliseconds() as f64 / 1000.0;
        Self {
            start_time,
            end_time,
            elapsed_seconds,
        }
    }
}

impl TaskMeta {
    pub fn save(&self, output_dir: &Path) -> Result<(), TaskError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(output_dir.join(META_FILE), json)?;
        Ok(())
    }
}

/// Indented listing of the project tree, directories suffixed with `/`.
///
/// Hidden entries and vendored or build directories are left out.
pub fn folder_structure(root: &Path) -> String {
    let mut lines = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(STRUCTURE_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e) && !is_hidden(e));

    for entry in walker.filter_map(Result::ok) {
        if lines.len() == STRUCTURE_MAX_ENTRIES {
            lines.push("...".to_string());
            break;
        }
        let indent = "  ".repeat(entry.depth() - 1);
        let name = entry.file_name().to_string_lossy();
        let suffix = if entry.file_type().is_dir() { "/" } else { "" };
        lines.push(format!("{}{}{}", indent, name, suffix));
    }
    lines.join("\n")
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/dep")).unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join("pkg/core.py"), "x = 1\n").unwrap();
        std::fs::write(dir.path().join("README.md"), "# Demo\n<!-- hidden -->\n").unwrap();
        dir
    }

    #[test]
    fn test_folder_structure() {
        let dir = project();
        let structure = folder_structure(dir.path());
        assert_eq!(structure, "README.md\npkg/\n  core.py");
    }

    #[test]
    fn test_local_task_finds_readme() {
        let dir = project();
        let task = LocalTask::new("demo", dir.path(), None, None).unwrap();
        assert_eq!(task.readme_path, dir.path().join("README.md"));

        let prompt = task.readme_prompt().unwrap();
        assert!(prompt.starts_with("<read>\nREADME file:\n# Demo\n</read>"));
        assert!(prompt.contains("pkg/\n  core.py"));
    }

    #[test]
    fn test_local_task_missing_project() {
        assert!(matches!(
            LocalTask::new("x", "/no/such/project", None, None),
            Err(TaskError::MissingProject(_))
        ));
    }

    #[test]
    fn test_meta_layout() {
        let dir = project();
        let task =
            LocalTask::new("demo", dir.path(), None, Some("abc123".to_string())).unwrap();
        let value = serde_json::to_value(task.meta()).unwrap();
        assert_eq!(value["task_info"]["instance_id"], "demo");
        assert_eq!(value["task_info"]["base_commit"], "abc123");
        assert!(value["setup_info"]["repo_path"].is_string());
        assert!(value.get("stats").is_none());
    }

    #[test]
    fn test_load_task_list() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(
            &path,
            r#"[{"task_id": "a", "repo_path": "/tmp/a", "group": "g"},
                {"task_id": "b", "repo_path": "/tmp/b"}]"#,
        )
        .unwrap();
        let specs = TaskSpec::load_list(&path).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].group_key(), "g");
        assert_eq!(specs[1].group_key(), "b");

        std::fs::write(
            &path,
            r#"[{"task_id": "a", "repo_path": "/tmp/a"}, {"task_id": "a", "repo_path": "/tmp/b"}]"#,
        )
        .unwrap();
        assert!(matches!(
            TaskSpec::load_list(&path),
            Err(TaskError::InvalidTaskList(_))
        ));
    }

    #[test]
    fn test_run_stats_elapsed() {
        let start = Utc::now();
        let end = start + chrono::Duration::milliseconds(1500);
        let stats = RunStats::between(start, end);
        assert!((stats.elapsed_seconds - 1.5).abs() < f64::EPSILON);
    }
}

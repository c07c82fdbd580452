//! Running tasks one at a time or as a batch of groups.

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;

use super::{LocalTask, RunStats, TaskProgress, TaskSpec, Workspace};
use crate::extraction::final_diff_path;
use crate::llm::LlmProvider;
use crate::scaffold::{
    ConversationOrchestrator, LocalCodeSearch, OrchestratorConfig, OrchestratorError, RunOutcome,
};

/// Summary key for tasks that ended without any status.
const NO_STATUS: &str = "NO_STATUS";

/// What happened to one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: String,
    pub output_dir: Option<PathBuf>,
    pub outcome: Option<RunOutcome>,
    pub diff_path: Option<PathBuf>,
    pub error: Option<String>,
}

impl TaskReport {
    fn failed(task_id: &str, output_dir: Option<PathBuf>, error: impl ToString) -> Self {
        Self {
            task_id: task_id.to_string(),
            output_dir,
            outcome: None,
            diff_path: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.as_ref().is_some_and(RunOutcome::is_finished)
    }

    /// Best status name, or `NO_STATUS`.
    pub fn status_name(&self) -> &'static str {
        self.outcome
            .as_ref()
            .and_then(|o| o.best_status)
            .map(|s| s.as_str())
            .unwrap_or(NO_STATUS)
    }
}

/// Runs tasks with a shared provider and configuration.
pub struct TaskRunner {
    llm: Arc<dyn LlmProvider>,
    config: OrchestratorConfig,
    output_root: PathBuf,
}

impl TaskRunner {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        config: OrchestratorConfig,
        output_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            llm,
            config,
            output_root: output_root.into(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Run one task in a fresh output directory.
    ///
    /// The checkout is reset before and after the run; the output root is
    /// kept through every reset, even when it lies inside the checkout.
    pub async fn run_task(&self, task: &LocalTask) -> TaskReport {
        let started = Utc::now();
        let output_dir = self.output_root.join(task.output_dir_name(started));
        if let Err(e) = std::fs::create_dir_all(&output_dir) {
            tracing::error!(task_id = %task.task_id, error = %e, "Cannot create output directory");
            return TaskReport::failed(&task.task_id, None, e);
        }

        tracing::info!(task_id = %task.task_id, output_dir = %output_dir.display(), "Starting task");
        let workspace = task.workspace().preserving(&self.output_root);
        let result = self.run_in(task, &workspace, &output_dir).await;

        if let Err(e) = workspace.reset().await {
            tracing::warn!(task_id = %task.task_id, error = %e, "Failed to reset project after run");
        }

        let mut meta = task.meta();
        meta.stats = Some(RunStats::between(started, Utc::now()));
        if let Err(e) = meta.save(&output_dir) {
            tracing::warn!(task_id = %task.task_id, error = %e, "Failed to write task metadata");
        }

        match result {
            Ok(outcome) => {
                let diff_path = final_diff_path(&output_dir).ok().flatten();
                match &diff_path {
                    Some(path) => tracing::info!(
                        task_id = %task.task_id,
                        "Please find the generated documents at: {}",
                        path.display()
                    ),
                    None => tracing::info!(
                        task_id = %task.task_id,
                        "No documents generated. You can try again."
                    ),
                }
                TaskReport {
                    task_id: task.task_id.clone(),
                    output_dir: Some(output_dir),
                    outcome: Some(outcome),
                    diff_path,
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!(task_id = %task.task_id, error = %e, "Task failed");
                TaskReport::failed(&task.task_id, Some(output_dir), e)
            }
        }
    }

    async fn run_in(
        &self,
        task: &LocalTask,
        workspace: &dyn Workspace,
        output_dir: &Path,
    ) -> Result<RunOutcome, OrchestratorError> {
        workspace.reset().await?;
        task.meta().save(output_dir)?;

        let readme_prompt = task.readme_prompt()?;
        let search = LocalCodeSearch::new(task.project_path.clone());
        let orchestrator = ConversationOrchestrator::new(self.llm.clone(), self.config.clone());
        orchestrator
            .run(&readme_prompt, &search, workspace, output_dir)
            .await
    }

    /// Run a batch: groups concurrently (at most `num_workers` at a time),
    /// tasks within a group in order.
    pub async fn run_batch(&self, specs: Vec<TaskSpec>, num_workers: usize) -> Vec<TaskReport> {
        let groups = group_tasks(specs);
        let total_tasks = groups.iter().map(|(_, tasks)| tasks.len()).sum();
        let progress = Arc::new(TaskProgress::new(total_tasks, groups.len()));
        let semaphore = Arc::new(Semaphore::new(num_workers.max(1)));

        tracing::info!(
            tasks = total_tasks,
            groups = groups.len(),
            workers = num_workers.max(1),
            "Starting batch"
        );

        let group_futures = groups.into_iter().map(|(key, tasks)| {
            let semaphore = semaphore.clone();
            let progress = progress.clone();
            async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    tracing::error!(group = %key, "Worker pool closed");
                    return Vec::new();
                };

                let mut reports = Vec::with_capacity(tasks.len());
                for spec in tasks {
                    let report = match LocalTask::from_spec(&spec) {
                        Ok(task) => self.run_task(&task).await,
                        Err(e) => {
                            tracing::error!(task_id = %spec.task_id, error = %e, "Invalid task");
                            TaskReport::failed(&spec.task_id, None, e)
                        }
                    };
                    progress.complete_task();
                    reports.push(report);
                }
                progress.complete_group();
                reports
            }
        });

        join_all(group_futures).await.into_iter().flatten().collect()
    }
}

/// Group specs by [`TaskSpec::group_key`], largest groups first.
///
/// Ties keep the order in which groups first appear.
pub fn group_tasks(specs: Vec<TaskSpec>) -> Vec<(String, Vec<TaskSpec>)> {
    let mut groups: Vec<(String, Vec<TaskSpec>)> = Vec::new();
    for spec in specs {
        let key = spec.group_key().to_string();
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, tasks)) => tasks.push(spec),
            None => groups.push((key, vec![spec])),
        }
    }
    groups.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
    groups
}

/// Task ids grouped by best status.
pub fn summarize_reports(reports: &[TaskReport]) -> BTreeMap<String, Vec<String>> {
    let mut summary: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for report in reports {
        summary
            .entry(report.status_name().to_string())
            .or_default()
            .push(report.task_id.clone());
    }
    summary
}

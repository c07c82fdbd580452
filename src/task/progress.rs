//! Completion counters shared by concurrently running task groups.
//!
//! The counters only feed progress messages; nothing depends on them for
//! correctness.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct TaskProgress {
    total_tasks: usize,
    total_groups: usize,
    tasks_done: AtomicUsize,
    groups_done: AtomicUsize,
}

impl TaskProgress {
    pub fn new(total_tasks: usize, total_groups: usize) -> Self {
        Self {
            total_tasks,
            total_groups,
            ..Self::default()
        }
    }

    pub fn total_tasks(&self) -> usize {
        self.total_tasks
    }

    pub fn total_groups(&self) -> usize {
        self.total_groups
    }

    pub fn tasks_done(&self) -> usize {
        self.tasks_done.load(Ordering::Relaxed)
    }

    pub fn groups_done(&self) -> usize {
        self.groups_done.load(Ordering::Relaxed)
    }

    /// Count a finished task and return the new total.
    pub fn complete_task(&self) -> usize {
        let done = self.tasks_done.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            ">>> Completed {}/{} tasks. For groups, completed {}/{} so far.",
            done,
            self.total_tasks,
            self.groups_done(),
            self.total_groups
        );
        done
    }

    /// Count a finished group and return the new total.
    pub fn complete_group(&self) -> usize {
        let done = self.groups_done.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            ">>>>>> Completed {}/{} task groups.",
            done,
            self.total_groups
        );
        done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counters() {
        let progress = TaskProgress::new(3, 2);
        assert_eq!(progress.complete_task(), 1);
        assert_eq!(progress.complete_task(), 2);
        assert_eq!(progress.complete_group(), 1);
        assert_eq!(progress.tasks_done(), 2);
        assert_eq!(progress.groups_done(), 1);
        assert_eq!(progress.total_tasks(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_increments() {
        let progress = Arc::new(TaskProgress::new(100, 1));
        let handles: Vec<_> = (0..100)
            .map(|_| {
                let progress = progress.clone();
                tokio::spawn(async move {
                    progress.complete_task();
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(progress.tasks_done(), 100);
    }
}

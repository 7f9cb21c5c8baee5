//! Task history shared between the poller and the UI.
//!
//! # Invariants
//! - At most one entry per `task_id`; every write is an upsert
//! - Entries keep creation order (newest last)

use std::sync::{Arc, RwLock};

use super::task::Task;
use crate::client::{TaskPayload, TaskSummary};

#[derive(Debug, Clone, Default)]
pub struct TaskHistory {
    tasks: Arc<RwLock<Vec<Task>>>,
}

impl TaskHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) the entry for `task.task_id`.
    pub fn upsert(&self, task: Task) {
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        match tasks.iter_mut().find(|t| t.task_id == task.task_id) {
            Some(existing) => *existing = task,
            None => tasks.push(task),
        }
    }

    /// Merge one status payload into the entry for `task_id`, creating the
    /// entry if the task was never seen. Returns the merged task.
    pub fn apply_payload(&self, task_id: &str, payload: TaskPayload) -> Task {
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        let pos = match tasks.iter().position(|t| t.task_id == task_id) {
            Some(pos) => pos,
            None => {
                tasks.push(Task::pending(task_id, ""));
                tasks.len() - 1
            }
        };
        tasks[pos].apply_payload(payload);
        tasks[pos].clone()
    }

    /// Merge a `GET /tasks` listing.
    pub fn merge_summaries(&self, summaries: &[TaskSummary]) {
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        for summary in summaries {
            match tasks.iter_mut().find(|t| t.task_id == summary.task_id) {
                Some(existing) => {
                    existing.apply_summary(summary);
                }
                None => tasks.push(Task::from_summary(summary)),
            }
        }
    }

    pub fn get(&self, task_id: &str) -> Option<Task> {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        tasks.iter().find(|t| t.task_id == task_id).cloned()
    }

    pub fn list(&self) -> Vec<Task> {
        self.tasks.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.tasks.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;

    fn summary(id: &str, status: &str, progress: f64) -> TaskSummary {
        TaskSummary {
            task_id: id.to_string(),
            status: status.to_string(),
            progress,
            created_at: None,
            title: Some("Report: rust".to_string()),
        }
    }

    #[test]
    fn test_polls_update_optimistic_entry() {
        let history = TaskHistory::new();
        history.upsert(Task::pending("research_1", "rust"));

        for progress in [5.0, 15.0, 50.0] {
            history.apply_payload(
                "research_1",
                TaskPayload {
                    status: "running".to_string(),
                    progress,
                    ..Default::default()
                },
            );
        }

        assert_eq!(history.len(), 1);
        let task = history.get("research_1").unwrap();
        assert_eq!(task.progress, 50);
        assert_eq!(task.topic, "rust");
    }

    #[test]
    fn test_merge_summaries_never_duplicates() {
        let history = TaskHistory::new();
        history.upsert(Task::pending("research_1", "rust"));
        history.merge_summaries(&[
            summary("research_1", "running", 30.0),
            summary("research_2", "completed", 100.0),
        ]);
        history.merge_summaries(&[summary("research_1", "running", 10.0)]);

        let tasks = history.list();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].progress, 30);
        assert_eq!(tasks[1].status, TaskStatus::Completed);
        assert_eq!(tasks[1].topic, "Report: rust");
    }
}

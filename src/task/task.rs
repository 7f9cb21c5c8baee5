//! Core Task type for poll-tracked research jobs.
//!
//! # Invariants
//! - `progress` is within 0..=100
//! - `progress` never decreases while the task is active
//! - `progress == 100` once `status == Completed`
//! - A terminal task ignores further status payloads

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::{TaskPayload, TaskStepPayload, TaskSummary};
use crate::timeline::{Source, Step, StepKind, StepStatus};

/// Status of a task in its lifecycle.
///
/// # State Machine
/// ```text
/// Pending -> Running -> Completed
///                   \-> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, no status fetched yet
    Pending,
    /// Backend is working on it
    Running,
    /// Report is ready
    Completed,
    /// Backend gave up; see `Task::error`
    Failed,
}

impl TaskStatus {
    /// Parse the backend's status string. Unrecognized values count as
    /// running so an unknown intermediate phase never stops the poller.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" | "started" => TaskStatus::Pending,
            "completed" | "done" | "success" => TaskStatus::Completed,
            "failed" | "error" => TaskStatus::Failed,
            _ => TaskStatus::Running,
        }
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Final research report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub findings_count: u32,
    #[serde(default)]
    pub generated_at: Option<String>,
}

/// A long-running, poll-tracked unit of work.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_id: String,
    pub topic: String,
    pub status: TaskStatus,
    pub progress: u8,
    pub steps: Vec<Step>,
    pub report: Option<Report>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set once a full status payload reported a terminal state. Listing
    /// summaries can mark a task terminal but never settle it.
    #[serde(skip)]
    settled: bool,
}

impl Task {
    /// Optimistic entry inserted when the task is created, before the first poll.
    pub fn pending(task_id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            topic: topic.into(),
            status: TaskStatus::Pending,
            progress: 0,
            steps: Vec::new(),
            report: None,
            error: None,
            created_at: Utc::now(),
            settled: false,
        }
    }

    /// Build a history entry from a `GET /tasks` summary.
    pub fn from_summary(summary: &TaskSummary) -> Self {
        let mut task = Self::pending(
            summary.task_id.clone(),
            summary.title.clone().unwrap_or_default(),
        );
        task.apply_summary(summary);
        task
    }

    /// Merge a status payload.
    ///
    /// Returns `false` (and changes nothing) once a payload already settled
    /// the task. A task only marked terminal by a summary still takes the
    /// payload carrying its report or error.
    pub fn apply_payload(&mut self, payload: TaskPayload) -> bool {
        if self.settled {
            return false;
        }
        self.status = TaskStatus::parse(&payload.status);
        self.progress = self.next_progress(payload.progress);
        self.steps = map_steps(&self.task_id, &payload.steps);
        if let Some(report) = payload.report {
            if self.topic.is_empty() {
                self.topic = report.title.clone();
            }
            self.report = Some(report);
        }
        if payload.error.is_some() {
            self.error = payload.error;
        }
        if let Some(created_at) = payload.created_at.as_deref().and_then(parse_timestamp) {
            self.created_at = created_at;
        }
        self.settled = self.status.is_terminal();
        true
    }

    /// True once a full payload delivered the terminal state.
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// Merge a history summary (status/progress only).
    pub fn apply_summary(&mut self, summary: &TaskSummary) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TaskStatus::parse(&summary.status);
        self.progress = self.next_progress(summary.progress);
        if self.topic.is_empty() {
            if let Some(title) = &summary.title {
                self.topic = title.clone();
            }
        }
        if let Some(created_at) = summary.created_at.as_deref().and_then(parse_timestamp) {
            self.created_at = created_at;
        }
        true
    }

    fn next_progress(&self, reported: f64) -> u8 {
        if self.status == TaskStatus::Completed {
            return 100;
        }
        let reported = if reported.is_finite() {
            reported.clamp(0.0, 100.0).floor() as u8
        } else {
            0
        };
        reported.max(self.progress)
    }
}

fn map_steps(task_id: &str, steps: &[TaskStepPayload]) -> Vec<Step> {
    steps
        .iter()
        .enumerate()
        .map(|(i, raw)| {
            let status = match raw.status.trim().to_ascii_lowercase().as_str() {
                "done" | "completed" => StepStatus::Completed,
                "failed" | "error" => StepStatus::Error,
                "pending" => StepStatus::Pending,
                _ => StepStatus::Running,
            };
            Step::new(format!("{}-step-{}", task_id, i), StepKind::Task, raw.step.as_str())
                .with_status(status)
                .with_summary(raw.result.clone().unwrap_or_default())
        })
        .collect()
}

/// Backend timestamps are ISO-8601, usually without an offset (taken as UTC).
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(status: &str, progress: f64) -> TaskPayload {
        TaskPayload {
            status: status.to_string(),
            progress,
            ..Default::default()
        }
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(TaskStatus::parse("running"), TaskStatus::Running);
        assert_eq!(TaskStatus::parse("COMPLETED"), TaskStatus::Completed);
        assert_eq!(TaskStatus::parse("failed"), TaskStatus::Failed);
        assert_eq!(TaskStatus::parse("indexing"), TaskStatus::Running);
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
    }

    #[test]
    fn test_progress_is_monotonic_and_pinned() {
        let mut task = Task::pending("research_1", "rust");
        task.apply_payload(payload("running", 36.9));
        assert_eq!(task.progress, 36);

        task.apply_payload(payload("running", 15.0));
        assert_eq!(task.progress, 36);

        task.apply_payload(payload("running", 250.0));
        assert_eq!(task.progress, 100);

        let mut task = Task::pending("research_2", "rust");
        task.apply_payload(payload("completed", 80.0));
        assert_eq!(task.progress, 100);
    }

    #[test]
    fn test_terminal_task_ignores_payloads() {
        let mut task = Task::pending("research_1", "rust");
        let mut failed = payload("failed", 40.0);
        failed.error = Some("LLM quota".to_string());
        assert!(task.apply_payload(failed));
        assert!(!task.apply_payload(payload("running", 90.0)));
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("LLM quota"));
    }

    #[test]
    fn test_summary_does_not_settle_task() {
        let mut task = Task::pending("research_1", "rust");
        task.apply_summary(&TaskSummary {
            task_id: "research_1".to_string(),
            status: "completed".to_string(),
            progress: 100.0,
            created_at: None,
            title: None,
        });
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(!task.is_settled());

        let mut done = payload("completed", 100.0);
        done.report = Some(Report {
            title: "Rust".to_string(),
            content: "findings".to_string(),
            sources: Vec::new(),
            findings_count: 2,
            generated_at: None,
        });
        assert!(task.apply_payload(done));
        assert!(task.is_settled());
        assert_eq!(task.report.as_ref().map(|r| r.findings_count), Some(2));
        assert!(!task.apply_payload(payload("running", 10.0)));
    }

    #[test]
    fn test_steps_map_into_timeline_steps() {
        let mut task = Task::pending("research_1", "rust");
        let mut p = payload("running", 20.0);
        p.steps = vec![
            TaskStepPayload {
                step: "Analyze topic".to_string(),
                status: "done".to_string(),
                result: Some("3 sub-questions".to_string()),
            },
            TaskStepPayload {
                step: "Research".to_string(),
                status: "running".to_string(),
                result: None,
            },
            TaskStepPayload {
                step: "Error".to_string(),
                status: "failed".to_string(),
                result: Some("boom".to_string()),
            },
        ];
        task.apply_payload(p);

        let statuses: Vec<_> = task.steps.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![StepStatus::Completed, StepStatus::Running, StepStatus::Error]
        );
        assert_eq!(task.steps[0].id, "research_1-step-0");
        assert_eq!(task.steps[0].summary, "3 sub-questions");
        assert_eq!(task.steps[1].kind, StepKind::Task);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2025-01-05T10:00:00.123456").is_some());
        assert!(parse_timestamp("2025-01-05T10:00:00+08:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}

//! Request and response bodies of the backend's HTTP API.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::task::Report;
use crate::timeline::Source;

/// Body of `POST /chat/stream` and `POST /chat`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Document filter; only these documents are searched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_docs: Option<Vec<String>>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_documents(mut self, documents: Vec<String>) -> Self {
        self.selected_docs = (!documents.is_empty()).then_some(documents);
        self
    }
}

/// Response of the non-streamed `POST /chat`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<Source>,
}

/// Body of `POST /tasks`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateTaskRequest {
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<String>>,
}

/// Response of `POST /tasks`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedTask {
    pub task_id: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Response of `GET /tasks/{task_id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPayload {
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub progress: f64,
    #[serde(default)]
    pub steps: Vec<TaskStepPayload>,
    #[serde(default)]
    pub report: Option<Report>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// One step entry of a task status payload.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskStepPayload {
    #[serde(default)]
    pub step: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub result: Option<String>,
}

/// One entry of `GET /tasks`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSummary {
    pub task_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub progress: f64,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskList {
    #[serde(default)]
    pub tasks: Vec<TaskSummary>,
}

/// Progress is sent as int, float, or occasionally null.
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_omits_empty_filters() {
        let body = serde_json::to_value(ChatRequest::new("hi").with_documents(Vec::new())).unwrap();
        assert_eq!(body, serde_json::json!({ "message": "hi" }));

        let body = serde_json::to_value(
            ChatRequest::new("hi")
                .with_session("s1")
                .with_documents(vec!["a.pdf".to_string()]),
        )
        .unwrap();
        assert_eq!(body["selected_docs"][0], "a.pdf");
        assert_eq!(body["session_id"], "s1");
    }

    #[test]
    fn test_task_payload_from_backend() {
        let raw = r#"{
            "status": "running",
            "progress": 36.66,
            "steps": [
                {"step": "Analyze topic", "status": "done", "result": "3 sub-questions"},
                {"step": "Research: pricing", "status": "running"}
            ],
            "report": null,
            "error": null,
            "created_at": "2025-01-05T10:00:00.123456"
        }"#;
        let payload: TaskPayload = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.steps.len(), 2);
        assert!((payload.progress - 36.66).abs() < f64::EPSILON);
        assert!(payload.report.is_none());
    }

    #[test]
    fn test_task_list_tolerates_missing_fields() {
        let raw = r#"{"tasks":[{"task_id":"research_1","status":"completed","progress":null}]}"#;
        let list: TaskList = serde_json::from_str(raw).unwrap();
        assert_eq!(list.tasks[0].progress, 0.0);
        assert!(list.tasks[0].title.is_none());
    }
}

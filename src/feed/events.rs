use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;

use crate::timeline::{ResultsCount, Source};

static RESULTS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)results?\s*[=:]\s*(\d+)").unwrap());
static FIRST_INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// Wire encoding of one event: `{type, content?, data?}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub data: Option<Value>,
}

/// One entry of a plan's task list.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanTask {
    pub title: String,
    pub query: Option<String>,
}

/// Agent progress events, one variant per event kind.
///
/// Synonymous wire kinds (`plan`/`planning`, `token`/`chunk`,
/// `source`/`sources`, `done`/`end`, `thinking`/`analysis`) decode into the
/// same variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Agent is reasoning; `generating` marks reasoning still in progress.
    Thinking { content: String, generating: bool },
    /// Agent laid out a plan of sub-tasks.
    Plan { content: String, tasks: Vec<PlanTask> },
    /// Agent is calling a tool.
    ToolCall {
        id: Option<String>,
        name: String,
        arguments: Value,
        queries: Vec<String>,
    },
    /// Tool execution completed.
    ToolResult {
        id: Option<String>,
        content: String,
        count: ResultsCount,
    },
    /// Intermediate progress of the running search.
    SearchProgress { content: String, count: Option<u64> },
    /// Answer synthesis started.
    Generating { content: String },
    /// Answer text being streamed.
    Token { text: String },
    /// Full answer; replaces whatever was streamed.
    Answer { content: String },
    /// Sources backing the answer.
    Sources { sources: Vec<Source> },
    /// Error occurred; the stream is aborted.
    Error { message: String },
    /// Turn finished.
    Done,
    /// Kind this client does not know; ignored by the reducer.
    Unknown { kind: String },
}

impl Event {
    /// Wire kind name, used for logging.
    pub fn kind(&self) -> &str {
        match self {
            Event::Thinking { .. } => "thinking",
            Event::Plan { .. } => "plan",
            Event::ToolCall { .. } => "tool_call",
            Event::ToolResult { .. } => "tool_result",
            Event::SearchProgress { .. } => "search_progress",
            Event::Generating { .. } => "generating",
            Event::Token { .. } => "token",
            Event::Answer { .. } => "answer",
            Event::Sources { .. } => "sources",
            Event::Error { .. } => "error",
            Event::Done => "done",
            Event::Unknown { kind } => kind.as_str(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Event::Error { .. })
    }
}

impl From<Frame> for Event {
    fn from(frame: Frame) -> Self {
        let content = frame.content.as_ref().map(text_of).unwrap_or_default();
        let data = frame.data.unwrap_or(Value::Null);

        match frame.kind.as_str() {
            "thinking" | "analysis" => Event::Thinking {
                generating: data.get("generating").and_then(Value::as_bool) == Some(true)
                    || data.get("status").and_then(Value::as_str) == Some("generating"),
                content,
            },
            "plan" | "planning" => Event::Plan {
                tasks: plan_tasks(&data),
                content,
            },
            "tool_call" => {
                let name = if content.is_empty() {
                    str_field(&data, "name").unwrap_or_default()
                } else {
                    content
                };
                let arguments = parse_arguments(data.get("arguments"));
                Event::ToolCall {
                    id: str_field(&data, "id").or_else(|| str_field(&data, "tool_call_id")),
                    queries: queries_from(&arguments),
                    name,
                    arguments,
                }
            }
            "tool_result" => Event::ToolResult {
                id: str_field(&data, "id").or_else(|| str_field(&data, "tool_call_id")),
                count: extract_count(&data, &content)
                    .map(ResultsCount::Count)
                    .unwrap_or(ResultsCount::Unknown),
                content,
            },
            "search_progress" => Event::SearchProgress {
                count: extract_count(&data, &content),
                content,
            },
            "generating" => Event::Generating { content },
            "token" | "chunk" => Event::Token { text: content },
            "answer" => Event::Answer { content },
            "source" | "sources" => Event::Sources {
                sources: parse_sources(&data),
            },
            "error" => Event::Error {
                message: if content.is_empty() {
                    str_field(&data, "message").unwrap_or_else(|| "Unknown error".to_string())
                } else {
                    content
                },
            },
            "done" | "end" => Event::Done,
            other => Event::Unknown {
                kind: other.to_string(),
            },
        }
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn str_field(data: &Value, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Tool arguments arrive either as an object or as a JSON-encoded string.
fn parse_arguments(raw: Option<&Value>) -> Value {
    match raw {
        Some(Value::String(s)) => serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone())),
        Some(v) => v.clone(),
        None => Value::Null,
    }
}

fn queries_from(arguments: &Value) -> Vec<String> {
    let mut queries = Vec::new();
    if let Some(q) = arguments.get("query").and_then(Value::as_str) {
        queries.push(q.to_string());
    }
    if let Some(list) = arguments.get("queries").and_then(Value::as_array) {
        queries.extend(list.iter().filter_map(Value::as_str).map(str::to_string));
    }
    queries
}

fn plan_tasks(data: &Value) -> Vec<PlanTask> {
    let list = ["tasks", "steps", "sub_questions"]
        .iter()
        .find_map(|key| data.get(*key).and_then(Value::as_array));
    let Some(list) = list else {
        return Vec::new();
    };

    list.iter()
        .filter_map(|entry| match entry {
            Value::String(title) => Some(PlanTask {
                title: title.clone(),
                query: None,
            }),
            Value::Object(_) => {
                let title = ["title", "task", "description"]
                    .iter()
                    .find_map(|key| str_field(entry, key))?;
                Some(PlanTask {
                    title,
                    query: str_field(entry, "query"),
                })
            }
            _ => None,
        })
        .collect()
}

/// Numeric result count: explicit field, then `results=N` in the preview,
/// then the first integer of the human-readable content.
fn extract_count(data: &Value, content: &str) -> Option<u64> {
    for key in ["count", "results_count"] {
        if let Some(n) = data.get(key).and_then(Value::as_u64) {
            return Some(n);
        }
    }
    if let Some(preview) = data.get("preview").and_then(Value::as_str) {
        if let Some(caps) = RESULTS_PATTERN.captures(preview) {
            if let Ok(n) = caps[1].parse() {
                return Some(n);
            }
        }
    }
    FIRST_INTEGER
        .find(content)
        .and_then(|m| m.as_str().parse().ok())
}

fn parse_sources(data: &Value) -> Vec<Source> {
    let list = match data {
        Value::Array(list) => Some(list),
        other => other.get("sources").and_then(Value::as_array),
    };
    list.map(|list| {
        list.iter()
            .filter_map(|s| serde_json::from_value(s.clone()).ok())
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(json: &str) -> Event {
        let frame: Frame = serde_json::from_str(json).unwrap();
        Event::from(frame)
    }

    #[test]
    fn test_tool_call_with_arguments() {
        let event = decode(
            r#"{"type":"tool_call","content":"rag_search","data":{"arguments":{"query":"x"}}}"#,
        );
        match event {
            Event::ToolCall { name, queries, id, .. } => {
                assert_eq!(name, "rag_search");
                assert_eq!(queries, vec!["x".to_string()]);
                assert!(id.is_none());
            }
            other => panic!("Expected ToolCall, got {:?}", other),
        }
    }

    #[test]
    fn test_tool_call_string_arguments() {
        let event = decode(
            r#"{"type":"tool_call","content":"rag_search_multiple","data":{"arguments":"{\"queries\":[\"a\",\"b\"]}"}}"#,
        );
        match event {
            Event::ToolCall { queries, .. } => assert_eq!(queries, vec!["a", "b"]),
            other => panic!("Expected ToolCall, got {:?}", other),
        }
    }

    #[test]
    fn test_tool_result_count_sources() {
        let from_preview = decode(r#"{"type":"tool_result","data":{"preview":"results=3"}}"#);
        assert!(matches!(
            from_preview,
            Event::ToolResult { count: ResultsCount::Count(3), .. }
        ));

        let from_content = decode(r#"{"type":"tool_result","content":"found 5 passages"}"#);
        assert!(matches!(
            from_content,
            Event::ToolResult { count: ResultsCount::Count(5), .. }
        ));

        let unknown = decode(r#"{"type":"tool_result","content":"no count","data":{"preview":"n/a"}}"#);
        assert!(matches!(
            unknown,
            Event::ToolResult { count: ResultsCount::Unknown, .. }
        ));
    }

    #[test]
    fn test_synonyms_decode_alike() {
        assert_eq!(
            decode(r#"{"type":"chunk","content":"a"}"#),
            decode(r#"{"type":"token","content":"a"}"#)
        );
        assert_eq!(decode(r#"{"type":"end"}"#), Event::Done);
        assert!(matches!(
            decode(r#"{"type":"analysis","content":"c","data":{"status":"generating"}}"#),
            Event::Thinking { generating: true, .. }
        ));
    }

    #[test]
    fn test_plan_tasks_mixed_entries() {
        let event = decode(
            r#"{"type":"planning","content":"plan","data":{"tasks":["first",{"title":"second","query":"q2"},{"task":"third"},42]}}"#,
        );
        match event {
            Event::Plan { tasks, .. } => {
                assert_eq!(tasks.len(), 3);
                assert_eq!(tasks[1].query.as_deref(), Some("q2"));
                assert_eq!(tasks[2].title, "third");
            }
            other => panic!("Expected Plan, got {:?}", other),
        }
    }

    #[test]
    fn test_sources_shapes() {
        let event = decode(
            r#"{"type":"source","content":"2 sources","data":{"sources":[{"file_name":"a.pdf","page_label":"1"},{"file_name":"b.pdf"}]}}"#,
        );
        match event {
            Event::Sources { sources } => assert_eq!(sources.len(), 2),
            other => panic!("Expected Sources, got {:?}", other),
        }

        let bare = decode(r#"{"type":"sources","data":[{"file_name":"c.pdf"}]}"#);
        assert!(matches!(bare, Event::Sources { sources } if sources.len() == 1));
    }

    #[test]
    fn test_unknown_kind_kept() {
        let event = decode(r#"{"type":"heartbeat"}"#);
        assert_eq!(event.kind(), "heartbeat");
    }

    #[test]
    fn test_error_message_fallbacks() {
        assert_eq!(
            decode(r#"{"type":"error","data":{"message":"quota"}}"#),
            Event::Error { message: "quota".to_string() }
        );
        assert_eq!(
            decode(r#"{"type":"error"}"#),
            Event::Error { message: "Unknown error".to_string() }
        );
    }
}

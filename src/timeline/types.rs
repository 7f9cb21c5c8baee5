//! Timeline data model: steps, sources and the per-turn answer buffer.
//!
//! # Invariants
//! - Step ids are unique within a `Timeline`; generated ids skip any id
//!   already taken by a backend-supplied one
//! - A step is never replaced by a step of a different kind
//! - Steps are only ever appended; existing steps are mutated in place and
//!   never reordered or removed (until `reset_turn`)
//! - `StepIndex` positions always point at a step of the recorded kind/id

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Category of a timeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Thinking,
    Plan,
    ToolCall,
    Search,
    Generating,
    Error,
    /// Step reported by a polled task.
    Task,
}

/// Status of a step.
///
/// # State Machine
/// ```text
/// Pending -> Running -> Completed
///        \          \-> Error
///         \-> Completed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Error)
    }
}

/// Number of results a tool step produced.
///
/// `Unknown` is the marker used when a result arrived but carried no
/// extractable count; it serializes as `"?"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultsCount {
    Count(u64),
    Unknown,
}

impl fmt::Display for ResultsCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultsCount::Count(n) => write!(f, "{}", n),
            ResultsCount::Unknown => write!(f, "?"),
        }
    }
}

impl Serialize for ResultsCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ResultsCount::Count(n) => serializer.serialize_u64(*n),
            ResultsCount::Unknown => serializer.serialize_str("?"),
        }
    }
}

/// A retrieved passage backing the answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(default, alias = "source")]
    pub file_name: String,
    #[serde(default, alias = "page", deserialize_with = "page_label")]
    pub page_label: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default, alias = "content")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Pages arrive as either numbers or strings ("iv", "12").
fn page_label<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// One entry of a plan step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubStep {
    pub title: String,
    pub status: StepStatus,
}

/// One UI-facing unit of progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub kind: StepKind,
    pub title: String,
    pub summary: String,
    pub status: StepStatus,
    pub queries: Vec<String>,
    pub sub_steps: Vec<SubStep>,
    pub sources: Vec<Source>,
    pub results_count: Option<ResultsCount>,
    pub auto_expand: bool,
}

impl Step {
    pub fn new(id: impl Into<String>, kind: StepKind, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            title: title.into(),
            summary: String::new(),
            status: StepStatus::Pending,
            queries: Vec::new(),
            sub_steps: Vec::new(),
            sources: Vec::new(),
            results_count: None,
            auto_expand: false,
        }
    }

    pub fn with_status(mut self, status: StepStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Move to `Completed` unless the step already ended in an error.
    pub fn complete(&mut self) {
        if self.status != StepStatus::Error {
            self.status = StepStatus::Completed;
        }
        self.auto_expand = false;
    }
}

/// Explicit lookup from step kind and id to list position.
///
/// Replaces a backward scan over the step list: positions are recorded on
/// insert and consulted on mutate, so "most recent step of kind K" is O(1).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepIndex {
    by_kind: HashMap<StepKind, usize>,
    by_id: HashMap<String, usize>,
}

impl StepIndex {
    pub fn record(&mut self, position: usize, step: &Step) {
        self.by_kind.insert(step.kind, position);
        self.by_id.insert(step.id.clone(), position);
    }

    pub fn by_id(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    /// Most recently inserted step whose kind is one of `kinds`.
    pub fn latest_of(&self, kinds: &[StepKind]) -> Option<usize> {
        kinds
            .iter()
            .filter_map(|kind| self.by_kind.get(kind).copied())
            .max()
    }

    pub fn clear(&mut self) {
        self.by_kind.clear();
        self.by_id.clear();
    }
}

/// Ordered steps plus the answer accumulator for one conversational turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Timeline {
    steps: Vec<Step>,
    answer: String,
    sources: Vec<Source>,
    finished: bool,
    failure: Option<String>,
    #[serde(skip)]
    next_seq: u64,
    #[serde(skip)]
    index: StepIndex,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Set once a terminal sweep has run.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Error message from an `error` event or a failed fallback.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.index.by_id(id).map(|pos| &self.steps[pos])
    }

    /// Clear everything for the next conversational turn.
    pub fn reset_turn(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn next_step_id(&mut self) -> String {
        loop {
            self.next_seq += 1;
            let id = format!("step-{}", self.next_seq);
            if self.index.by_id(&id).is_none() {
                return id;
            }
        }
    }

    /// Append a step, or replace the step already holding the same id.
    ///
    /// Returns `None` (and leaves the timeline untouched) when that id belongs
    /// to a step of another kind.
    pub(crate) fn upsert_step(&mut self, step: Step) -> Option<usize> {
        if let Some(pos) = self.index.by_id(&step.id) {
            if self.steps[pos].kind != step.kind {
                return None;
            }
            let latest = self.index.by_kind.entry(step.kind).or_insert(pos);
            *latest = (*latest).max(pos);
            self.steps[pos] = step;
            return Some(pos);
        }
        let pos = self.steps.len();
        self.index.record(pos, &step);
        self.steps.push(step);
        Some(pos)
    }

    pub(crate) fn latest_mut(&mut self, kinds: &[StepKind]) -> Option<&mut Step> {
        let pos = self.index.latest_of(kinds)?;
        self.steps.get_mut(pos)
    }

    pub(crate) fn by_id_mut(&mut self, id: &str) -> Option<&mut Step> {
        let pos = self.index.by_id(id)?;
        self.steps.get_mut(pos)
    }

    pub(crate) fn steps_mut(&mut self) -> impl Iterator<Item = &mut Step> {
        self.steps.iter_mut()
    }

    pub(crate) fn append_answer(&mut self, text: &str) {
        self.answer.push_str(text);
    }

    pub(crate) fn replace_answer(&mut self, content: String) {
        self.answer = content;
    }

    pub(crate) fn set_sources(&mut self, sources: Vec<Source>) {
        self.sources = sources;
    }

    pub(crate) fn mark_finished(&mut self) {
        self.finished = true;
    }

    pub(crate) fn set_failure(&mut self, message: impl Into<String>) {
        self.failure = Some(message.into());
    }
}

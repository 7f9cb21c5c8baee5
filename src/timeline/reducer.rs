//! Folds events into a timeline.
//!
//! `apply` is a pure state transition: no I/O, no clocks, no randomness.
//! Applying events one by one yields the same timeline as `fold` over the
//! whole sequence.
//!
//! "Update the current step" rules always target the most recently inserted
//! step of the expected kind, looked up through the timeline's `StepIndex`.

use super::tools::display_name;
use super::types::{ResultsCount, Step, StepKind, StepStatus, SubStep, Timeline};
use crate::feed::Event;

/// Step kinds a tool result or source list attaches to.
const TOOL_KINDS: &[StepKind] = &[StepKind::ToolCall, StepKind::Search];

/// What applying one event meant for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// The timeline changed; keep consuming.
    Updated,
    /// The event had nothing to act on (unknown kind, no target step).
    Ignored,
    /// The event was an error; the stream should be aborted.
    Abort { message: String },
}

/// Apply one event to the timeline in place.
pub fn apply(timeline: &mut Timeline, event: &Event) -> Applied {
    match event {
        Event::Thinking {
            content,
            generating,
        } => {
            let status = if *generating {
                StepStatus::Running
            } else {
                StepStatus::Completed
            };
            let id = timeline.next_step_id();
            timeline.upsert_step(
                Step::new(id, StepKind::Thinking, "Thinking")
                    .with_summary(content.as_str())
                    .with_status(status),
            );
            Applied::Updated
        }
        Event::Plan { content, tasks } => {
            let id = timeline.next_step_id();
            let mut step = Step::new(id, StepKind::Plan, "Plan")
                .with_summary(content.as_str())
                .with_status(StepStatus::Completed);
            step.queries = tasks
                .iter()
                .map(|t| t.query.clone().unwrap_or_else(|| t.title.clone()))
                .collect();
            step.sub_steps = tasks
                .iter()
                .map(|t| SubStep {
                    title: t.title.clone(),
                    status: StepStatus::Pending,
                })
                .collect();
            step.auto_expand = !step.sub_steps.is_empty();
            timeline.upsert_step(step);
            Applied::Updated
        }
        Event::ToolCall {
            id, name, queries, ..
        } => {
            // Backend ids never take over a step of another kind.
            let id = match id {
                Some(id) if timeline.step(id).map_or(true, |s| s.kind == StepKind::ToolCall) => {
                    id.clone()
                }
                _ => timeline.next_step_id(),
            };
            let mut step = Step::new(id, StepKind::ToolCall, display_name(name))
                .with_summary(queries.join(", "))
                .with_status(StepStatus::Running);
            step.queries = queries.clone();
            step.auto_expand = true;
            timeline.upsert_step(step);
            Applied::Updated
        }
        Event::ToolResult { id, content, count } => {
            let target = match id.as_deref() {
                Some(id) if timeline.step(id).is_some_and(|s| TOOL_KINDS.contains(&s.kind)) => {
                    timeline.by_id_mut(id)
                }
                _ => timeline.latest_mut(TOOL_KINDS),
            };
            let Some(step) = target else {
                return Applied::Ignored;
            };
            step.complete();
            step.results_count = Some(*count);
            if !content.is_empty() {
                step.summary = content.clone();
            }
            Applied::Updated
        }
        Event::SearchProgress { content, count } => {
            match timeline.latest_mut(TOOL_KINDS) {
                Some(step) => {
                    if !content.is_empty() {
                        step.summary = content.clone();
                    }
                    if let Some(n) = count {
                        step.results_count = Some(ResultsCount::Count(*n));
                    }
                }
                None => {
                    let id = timeline.next_step_id();
                    let mut step = Step::new(id, StepKind::Search, "Searching")
                        .with_summary(content.as_str())
                        .with_status(StepStatus::Running);
                    step.results_count = count.map(ResultsCount::Count);
                    timeline.upsert_step(step);
                }
            }
            Applied::Updated
        }
        Event::Generating { content } => {
            let id = timeline.next_step_id();
            timeline.upsert_step(
                Step::new(id, StepKind::Generating, "Generating answer")
                    .with_summary(content.as_str())
                    .with_status(StepStatus::Running),
            );
            Applied::Updated
        }
        Event::Token { text } => {
            timeline.append_answer(text);
            if timeline.latest_mut(&[StepKind::Generating]).is_none() {
                let id = timeline.next_step_id();
                timeline.upsert_step(
                    Step::new(id, StepKind::Generating, "Generating answer")
                        .with_status(StepStatus::Running),
                );
            }
            Applied::Updated
        }
        Event::Answer { content } => {
            timeline.replace_answer(content.clone());
            if let Some(step) = timeline.latest_mut(&[StepKind::Generating]) {
                step.complete();
            }
            Applied::Updated
        }
        Event::Sources { sources } => {
            timeline.set_sources(sources.clone());
            if let Some(step) = timeline.latest_mut(TOOL_KINDS) {
                step.sources = sources.clone();
            }
            Applied::Updated
        }
        Event::Error { message } => {
            let id = timeline.next_step_id();
            timeline.upsert_step(
                Step::new(id, StepKind::Error, "Error")
                    .with_summary(message.as_str())
                    .with_status(StepStatus::Error),
            );
            timeline.set_failure(message.as_str());
            Applied::Abort {
                message: message.clone(),
            }
        }
        Event::Done => {
            finish(timeline);
            Applied::Updated
        }
        Event::Unknown { .. } => Applied::Ignored,
    }
}

/// Terminal sweep: every step (and plan entry) ends `Completed` unless it
/// already ended in an error. Idempotent.
pub fn finish(timeline: &mut Timeline) {
    for step in timeline.steps_mut() {
        step.complete();
        for sub in step.sub_steps.iter_mut() {
            if sub.status != StepStatus::Error {
                sub.status = StepStatus::Completed;
            }
        }
    }
    timeline.mark_finished();
}

/// Value-in, value-out form of [`apply`].
pub fn reduce(mut timeline: Timeline, event: &Event) -> (Timeline, Applied) {
    let applied = apply(&mut timeline, event);
    (timeline, applied)
}

/// Fold a whole event sequence into a fresh timeline.
pub fn fold<'a>(events: impl IntoIterator<Item = &'a Event>) -> Timeline {
    let mut timeline = Timeline::new();
    for event in events {
        apply(&mut timeline, event);
    }
    timeline
}

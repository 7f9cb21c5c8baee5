//! Push-path orchestration: transport → frame reader → reducer → observers.
//!
//! # State Machine (per turn)
//! ```text
//! Idle -> Streaming -> Completed
//!                  \-> FailedStreaming -> FallbackPending -> Completed
//!                                     \                  \-> Failed
//!                                      \-> Failed
//! (any non-terminal) -> Cancelled
//! ```
//!
//! The synchronous fallback runs at most once per turn, and only when the
//! stream produced nothing but errors (or nothing at all). A turn that
//! already showed progress or a partial answer is never retried.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ChatRequest, ChatTransport};
use crate::error::FeedError;
use crate::feed::{Event, FrameReader};
use crate::timeline::{self, Applied, Timeline};

/// Phase of one conversational turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Idle,
    Streaming,
    FailedStreaming,
    FallbackPending,
    Completed,
    Failed,
    Cancelled,
}

impl TurnState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TurnState::Completed | TurnState::Failed | TurnState::Cancelled
        )
    }
}

/// Snapshot published after every state change or applied event.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineUpdate {
    pub state: TurnState,
    pub timeline: Timeline,
}

/// Terminal result of a turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub state: TurnState,
    pub timeline: Timeline,
    /// User-visible failure message when `state == Failed`.
    pub error: Option<String>,
}

/// Handle to a running turn.
pub struct StreamHandle {
    updates: mpsc::Receiver<TimelineUpdate>,
    cancel: CancellationToken,
    join: JoinHandle<TurnOutcome>,
}

impl StreamHandle {
    /// Next timeline snapshot; `None` once the turn finished and all
    /// snapshots were consumed.
    pub async fn next_update(&mut self) -> Option<TimelineUpdate> {
        self.updates.recv().await
    }

    /// Abort the transport. No event arriving afterwards is applied.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// True once the turn reached a terminal state and its task exited.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the terminal outcome, discarding unread snapshots.
    pub async fn join(self) -> TurnOutcome {
        let StreamHandle { updates, join, .. } = self;
        drop(updates);
        match join.await {
            Ok(outcome) => outcome,
            Err(e) => TurnOutcome {
                state: TurnState::Failed,
                timeline: Timeline::new(),
                error: Some(format!("stream task aborted: {}", e)),
            },
        }
    }
}

/// Runs streamed chat turns.
#[derive(Clone)]
pub struct StreamCoordinator {
    transport: Arc<dyn ChatTransport>,
    fallback_enabled: bool,
}

impl StreamCoordinator {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            transport,
            fallback_enabled: true,
        }
    }

    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }

    /// Start one turn. Snapshots arrive on the returned handle.
    pub fn run(&self, request: ChatRequest) -> StreamHandle {
        let (tx, rx) = mpsc::channel(256);
        let cancel = CancellationToken::new();
        let turn = Turn {
            transport: Arc::clone(&self.transport),
            fallback_enabled: self.fallback_enabled,
            request,
            updates: tx,
            cancel: cancel.clone(),
            timeline: Timeline::new(),
            state: TurnState::Idle,
        };
        let join = tokio::spawn(turn.drive());
        StreamHandle {
            updates: rx,
            cancel,
            join,
        }
    }
}

/// What the stream produced before it ended.
#[derive(Debug, Default)]
struct StreamStats {
    events: u64,
    /// Events other than errors that changed the timeline.
    progress_events: u64,
}

struct Turn {
    transport: Arc<dyn ChatTransport>,
    fallback_enabled: bool,
    request: ChatRequest,
    updates: mpsc::Sender<TimelineUpdate>,
    cancel: CancellationToken,
    timeline: Timeline,
    state: TurnState,
}

impl Turn {
    async fn drive(mut self) -> TurnOutcome {
        self.transition(TurnState::Streaming).await;

        let mut stats = StreamStats::default();
        let failure = match self.consume(&mut stats).await {
            Ok(()) if stats.events == 0 => {
                FeedError::Stream("stream closed without any events".to_string())
            }
            Ok(()) => {
                timeline::finish(&mut self.timeline);
                self.transition(TurnState::Completed).await;
                debug!(events = stats.events, "Stream turn completed");
                return self.outcome(None);
            }
            Err(FeedError::Cancelled) => return self.cancelled(),
            Err(e) => e,
        };

        warn!(error = %failure, events = stats.events, "Chat stream failed");
        self.transition(TurnState::FailedStreaming).await;

        if !self.fallback_enabled || stats.progress_events > 0 || !allows_fallback(&failure) {
            let message = self
                .timeline
                .failure()
                .map(str::to_string)
                .unwrap_or_else(|| failure.to_string());
            self.timeline.set_failure(message.as_str());
            self.transition(TurnState::Failed).await;
            return self.outcome(Some(message));
        }

        self.fallback().await
    }

    /// Read the stream until it closes cleanly. Cancellation surfaces as
    /// `FeedError::Cancelled`.
    async fn consume(&mut self, stats: &mut StreamStats) -> Result<(), FeedError> {
        let cancel = self.cancel.clone();
        let mut body = tokio::select! {
            _ = cancel.cancelled() => return Err(FeedError::Cancelled),
            opened = self.transport.open_stream(&self.request) => opened?,
        };
        let mut reader = FrameReader::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FeedError::Cancelled),
                chunk = body.next() => chunk,
            };
            let (events, closed) = match next {
                Some(Ok(chunk)) => (reader.feed(&chunk), false),
                Some(Err(e)) => return Err(e),
                None => (reader.close(), true),
            };

            for event in &events {
                if cancel.is_cancelled() {
                    return Err(FeedError::Cancelled);
                }
                stats.events += 1;
                if let Some(message) = self.apply(event, stats).await {
                    return Err(FeedError::Stream(message));
                }
            }

            if closed {
                if reader.dropped() > 0 {
                    debug!(dropped = reader.dropped(), "Dropped malformed frames");
                }
                return Ok(());
            }
        }
    }

    /// Fold one event and publish the result. Returns the abort message for
    /// `error` events.
    async fn apply(&mut self, event: &Event, stats: &mut StreamStats) -> Option<String> {
        match timeline::apply(&mut self.timeline, event) {
            Applied::Updated => {
                stats.progress_events += 1;
                self.publish().await;
                None
            }
            Applied::Ignored => {
                debug!(kind = %event.kind(), "Event ignored");
                None
            }
            Applied::Abort { message } => {
                self.publish().await;
                Some(message)
            }
        }
    }

    async fn fallback(mut self) -> TurnOutcome {
        self.transition(TurnState::FallbackPending).await;
        info!("Falling back to synchronous chat");

        let cancel = self.cancel.clone();
        let response = tokio::select! {
            _ = cancel.cancelled() => return self.cancelled(),
            response = self.transport.chat(&self.request) => response,
        };

        match response {
            Ok(response) => {
                // The failed stream contributed nothing usable.
                self.timeline.reset_turn();
                let events = [
                    Event::Sources {
                        sources: response.sources,
                    },
                    Event::Answer {
                        content: response.answer,
                    },
                    Event::Done,
                ];
                for event in &events {
                    timeline::apply(&mut self.timeline, event);
                }
                self.transition(TurnState::Completed).await;
                self.outcome(None)
            }
            Err(e) => {
                warn!(error = %e, "Fallback chat failed");
                let message = format!("The assistant is unavailable right now ({})", e);
                self.timeline.set_failure(message.as_str());
                self.transition(TurnState::Failed).await;
                self.outcome(Some(message))
            }
        }
    }

    fn cancelled(mut self) -> TurnOutcome {
        debug!("Stream turn cancelled");
        self.state = TurnState::Cancelled;
        self.outcome(None)
    }

    async fn transition(&mut self, state: TurnState) {
        self.state = state;
        self.publish().await;
    }

    async fn publish(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        let update = TimelineUpdate {
            state: self.state,
            timeline: self.timeline.clone(),
        };
        // Receiver gone means nobody renders; keep folding for the outcome.
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = self.updates.send(update) => {}
        }
    }

    fn outcome(self, error: Option<String>) -> TurnOutcome {
        TurnOutcome {
            state: self.state,
            timeline: self.timeline,
            error,
        }
    }
}

/// Transport failures and error-only streams may be retried through `/chat`;
/// anything else (undecodable bodies) is reported as is.
fn allows_fallback(error: &FeedError) -> bool {
    error.is_transport() || matches!(error, FeedError::Stream(_))
}

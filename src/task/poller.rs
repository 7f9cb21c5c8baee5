//! Poll-until-terminal lifecycle for long-running tasks.
//!
//! One fetch is issued immediately on `start`, then one per interval, until
//! the task reports `completed` or `failed`. Fetch failures are logged and
//! retried at the next tick; they never stop the poller. Cancelling only
//! stops the timer: a fetch already in flight completes and its result is
//! discarded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::history::TaskHistory;
use super::task::Task;
use crate::client::{CreateTaskRequest, TaskTransport};
use crate::error::Result;

/// Handle to one polling loop.
#[derive(Debug, Clone)]
pub struct PollHandle {
    task_id: String,
    cancel: CancellationToken,
    updates: watch::Receiver<Task>,
}

impl PollHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Stop polling. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Latest mapped task, updated after every successful poll.
    pub fn updates(&self) -> watch::Receiver<Task> {
        self.updates.clone()
    }
}

struct ActivePoll {
    generation: u64,
    handle: PollHandle,
}

/// Starts and tracks polling loops, at most one per task id.
#[derive(Clone)]
pub struct TaskPoller {
    transport: Arc<dyn TaskTransport>,
    history: TaskHistory,
    interval: Duration,
    active: Arc<StdMutex<HashMap<String, ActivePoll>>>,
    generation: Arc<AtomicU64>,
}

impl TaskPoller {
    pub fn new(transport: Arc<dyn TaskTransport>, history: TaskHistory, interval: Duration) -> Self {
        Self {
            transport,
            history,
            interval,
            active: Arc::new(StdMutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn history(&self) -> &TaskHistory {
        &self.history
    }

    /// Number of polling loops currently running.
    pub fn active_count(&self) -> usize {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|p| !p.handle.is_cancelled())
            .count()
    }

    /// Create a task, record it optimistically in history and start polling it.
    pub async fn create<F>(
        &self,
        topic: &str,
        documents: Vec<String>,
        on_terminal: F,
    ) -> Result<PollHandle>
    where
        F: FnOnce(Task) + Send + 'static,
    {
        let request = CreateTaskRequest {
            topic: topic.to_string(),
            documents: (!documents.is_empty()).then_some(documents),
        };
        let created = self.transport.create_task(&request).await?;
        info!(task_id = %created.task_id, topic = %topic, "Task created");

        self.history.upsert(Task::pending(created.task_id.clone(), topic));
        Ok(self.start(&created.task_id, on_terminal))
    }

    /// Refresh history from the backend listing.
    pub async fn refresh_history(&self) -> Result<Vec<Task>> {
        let summaries = self.transport.list_tasks().await?;
        self.history.merge_summaries(&summaries);
        Ok(self.history.list())
    }

    /// Start polling `task_id`.
    ///
    /// If the task is already being polled this is a no-op: the existing
    /// handle is returned and `on_terminal` is dropped without being called.
    pub fn start<F>(&self, task_id: &str, on_terminal: F) -> PollHandle
    where
        F: FnOnce(Task) + Send + 'static,
    {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = active.get(task_id) {
            if !existing.handle.is_cancelled() {
                debug!(task_id = %task_id, "Task already polling");
                return existing.handle.clone();
            }
        }

        let initial = self
            .history
            .get(task_id)
            .unwrap_or_else(|| Task::pending(task_id, ""));
        let (tx, rx) = watch::channel(initial);
        let handle = PollHandle {
            task_id: task_id.to_string(),
            cancel: CancellationToken::new(),
            updates: rx,
        };
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        active.insert(
            task_id.to_string(),
            ActivePoll {
                generation,
                handle: handle.clone(),
            },
        );
        drop(active);

        let worker = PollWorker {
            task_id: task_id.to_string(),
            transport: Arc::clone(&self.transport),
            history: self.history.clone(),
            interval: self.interval,
            cancel: handle.cancel.clone(),
            updates: tx,
        };
        let registry = Arc::clone(&self.active);
        tokio::spawn(async move {
            let task_id = worker.task_id.clone();
            worker.run(on_terminal).await;
            let mut active = registry.lock().unwrap_or_else(|e| e.into_inner());
            if active.get(&task_id).map(|p| p.generation) == Some(generation) {
                active.remove(&task_id);
            }
        });

        handle
    }
}

struct PollWorker {
    task_id: String,
    transport: Arc<dyn TaskTransport>,
    history: TaskHistory,
    interval: Duration,
    cancel: CancellationToken,
    updates: watch::Sender<Task>,
}

impl PollWorker {
    async fn run<F>(self, on_terminal: F)
    where
        F: FnOnce(Task) + Send + 'static,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut polls: u64 = 0;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(task_id = %self.task_id, polls, "Polling cancelled");
                    return;
                }
                _ = ticker.tick() => {}
            }

            polls += 1;
            let result = self.transport.fetch_task(&self.task_id).await;
            if self.cancel.is_cancelled() {
                debug!(task_id = %self.task_id, "Discarding poll result after cancel");
                return;
            }

            match result {
                Ok(payload) => {
                    let task = self.history.apply_payload(&self.task_id, payload);
                    debug!(
                        task_id = %self.task_id,
                        status = ?task.status,
                        progress = task.progress,
                        "Task polled"
                    );
                    self.updates.send_replace(task.clone());
                    if task.status.is_terminal() {
                        info!(task_id = %self.task_id, status = ?task.status, polls, "Task finished");
                        on_terminal(task);
                        return;
                    }
                }
                Err(e) => {
                    warn!(
                        task_id = %self.task_id,
                        error = %e,
                        "Task status poll failed, retrying at next interval"
                    );
                }
            }
        }
    }
}

//! # Agent Feed
//!
//! Client engine for a research/chat agent backend that reports its
//! progress live.
//!
//! This library provides:
//! - A streamed chat path: framed events over a long-lived HTTP response
//! - A polled task path: long-running research jobs tracked by status polls
//! - One timeline model (steps + answer) that both paths render into
//!
//! ## Architecture
//!
//! ```text
//!   POST /chat/stream                        POST /tasks, GET /tasks/{id}
//!          │                                            │
//!          ▼                                            ▼
//!   ┌─────────────┐   events   ┌──────────────┐   ┌────────────┐
//!   │ FrameReader │──────────▶ │   reducer    │   │ TaskPoller │
//!   └─────────────┘            │ (Timeline)   │   │ (Task)     │
//!          ▲                   └──────┬───────┘   └─────┬──────┘
//!          │                          │ snapshots       │ watch
//!   ┌──────┴────────────┐             ▼                 ▼
//!   │ StreamCoordinator │ ───────▶   UI / CLI renderer (Step list)
//!   │  + /chat fallback │
//!   └───────────────────┘
//! ```
//!
//! ## Modules
//! - `feed`: wire frames and the incremental `FrameReader`
//! - `timeline`: steps, answer buffer and the pure event reducer
//! - `stream`: `StreamCoordinator` with cancellation and fallback
//! - `task`: polled tasks, history and `TaskPoller`
//! - `client`: reqwest transport and the transport traits

pub mod client;
pub mod config;
pub mod error;
pub mod feed;
pub mod stream;
pub mod task;
pub mod timeline;

pub use client::{ChatRequest, FeedClient};
pub use config::Config;
pub use error::FeedError;
pub use feed::{Event, FrameReader};
pub use stream::{StreamCoordinator, StreamHandle, TurnOutcome, TurnState};
pub use task::{Task, TaskHistory, TaskPoller, TaskStatus};
pub use timeline::{Step, StepKind, StepStatus, Timeline};

//! Task module - poll-tracked research tasks and their history.
//!
//! Status payloads are mapped into the same `Step` shape the streamed path
//! produces, so one renderer serves both.

pub mod history;
pub mod poller;
pub mod task;

pub use history::TaskHistory;
pub use poller::{PollHandle, TaskPoller};
pub use task::{Report, Task, TaskStatus};

//! Timeline module - steps, answer accumulation and the event reducer.

pub mod reducer;
pub mod tools;
pub mod types;

pub use reducer::{apply, finish, fold, reduce, Applied};
pub use types::{ResultsCount, Source, Step, StepIndex, StepKind, StepStatus, SubStep, Timeline};

//! Push-feed decoding: wire frames into typed events.

pub mod events;
pub mod frame;

pub use events::{Event, Frame, PlanTask};
pub use frame::{FrameReader, FRAME_PREFIX};

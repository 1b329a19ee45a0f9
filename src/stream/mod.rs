//! Streaming pipeline: chunk buffering, fence detection, multiplexing.

mod backtick_tracker;
mod chunk_buffer;
mod detector;
mod manager;
mod string_tracker;
mod tag_parser;

pub use backtick_tracker::BacktickTracker;
pub use chunk_buffer::ChunkBuffer;
pub use detector::{StreamEvent, StreamingFenceDetector};
pub use manager::{Drain, DrainOutcome, StreamManager};
pub use string_tracker::StringTracker;
pub use tag_parser::{TagFeed, TagParser};

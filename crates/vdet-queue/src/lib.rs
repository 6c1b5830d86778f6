//! Redis Streams dispatch queue.
//!
//! This crate provides:
//! - Detection job enqueueing with per-task deduplication
//! - Consumer-group delivery with pending-message reclaim
//! - Retry counting and a dead-letter stream

pub mod error;
pub mod job;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::{DetectVideoJob, QueueJob};
pub use queue::{JobQueue, QueueConfig};

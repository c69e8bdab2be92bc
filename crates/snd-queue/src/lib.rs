//! Redis Streams work queue.
//!
//! This crate provides:
//! - Fire-and-forget job submission via Redis Streams
//! - Consumer-group consumption with explicit acknowledgement
//! - Reclaiming of jobs left pending by crashed workers
//! - An in-memory queue for tests and tooling

pub mod error;
pub mod job;
pub mod memory;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::{ProcessSoundJob, QueueJob};
pub use memory::MemoryQueue;
pub use queue::{JobQueue, QueueConfig, WorkQueue};

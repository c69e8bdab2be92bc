//! Persistence collaborators for the processing pipeline.
//!
//! This crate provides:
//! - `SoundStore`: load/save of sound records (Redis JSON and in-memory)
//! - `RunLease`: per-sound mutual exclusion for processing runs
//! - Operation metrics for both

pub mod error;
pub mod lease;
pub mod metrics;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use lease::{LeaseToken, MemoryRunLease, RedisRunLease, RunLease};
pub use store::{MemorySoundStore, RedisSoundStore, SoundStore};

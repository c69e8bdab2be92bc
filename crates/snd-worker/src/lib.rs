//! Sound processing worker.
//!
//! This crate provides:
//! - Location resolution across the legacy and canonical storage tiers
//! - Temporary file tracking with guaranteed cleanup
//! - The transcoding pipeline (PCM, stereo, previews, displays, analysis)
//! - The processing state machine entry point called per job
//! - The job dispatcher and the queue-driven executor

pub mod cleanup;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod location;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod processor;
pub mod retry;

pub use cleanup::TempFiles;
pub use config::WorkerConfig;
pub use dispatcher::SoundDispatcher;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use location::{LocationError, LocationResolver, Resolution};
pub use logging::SoundLogger;
pub use pipeline::{Stage, StageError, TranscodingPipeline};
pub use processor::{RunReport, RunStatus, SkipReason, SoundProcessor};

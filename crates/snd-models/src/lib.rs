//! Shared data models for the sound processing pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Sound records and their processing lifecycle
//! - The structured processing log persisted with each sound
//! - The deterministic storage naming scheme
//! - Fixed preview encoding and display rendering parameters

pub mod encoding;
pub mod job;
pub mod locations;
pub mod processing_log;
pub mod sound;

// Re-export common types
pub use encoding::{DisplaySize, PreviewCodec, PreviewPreset, PreviewQuality, FFT_WINDOW_SIZE};
pub use job::JobId;
pub use locations::SoundLocations;
pub use processing_log::{LogEntry, LogKind, ProcessingLog};
pub use sound::{AudioInfo, InvalidTransition, ProcessingState, Sound, SoundId};

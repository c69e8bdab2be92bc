//! FFmpeg CLI wrapper and display rendering for audio processing.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a runner with timeout support
//! - FFprobe-based audio inspection and canonical PCM detection
//! - PCM conversion, stereo normalisation and preview encoding
//! - Native waveform and spectrogram rendering
//! - The analysis collaborator used after a successful run

pub mod analysis;
pub mod command;
pub mod convert;
pub mod display;
pub mod error;
pub mod fs_utils;
pub mod probe;
pub mod processor;

pub use analysis::{AnalysisOutcome, ExtractorAnalyzer, NoopAnalyzer, SoundAnalyzer};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use convert::{convert_to_pcm, encode_preview, stereofy};
pub use display::{render_displays, ColumnSummary, DisplayRenderer};
pub use error::{MediaError, MediaResult};
pub use fs_utils::{copy_file, ensure_dir, ensure_parent};
pub use probe::{is_canonical_pcm, probe_audio, AudioProbe};
pub use processor::{AudioProcessor, FfmpegAudioProcessor};

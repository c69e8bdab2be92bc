//! The audio tool seam used by the transcoding pipeline.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use snd_models::{AudioInfo, DisplaySize, PreviewPreset};

use crate::command::FfmpegRunner;
use crate::convert;
use crate::display;
use crate::error::{MediaError, MediaResult};
use crate::probe;

/// Operations the pipeline stages delegate to external codecs and renderers.
#[async_trait]
pub trait AudioProcessor: Send + Sync {
    /// Whether `path` is already canonical PCM and can be used as-is.
    async fn is_canonical_pcm(&self, path: &Path) -> MediaResult<bool>;

    /// Convert `input` to canonical PCM at `output`.
    async fn convert_to_pcm(&self, input: &Path, output: &Path) -> MediaResult<()>;

    /// Write the stereo working file and return the technical metadata.
    async fn stereofy(&self, input: &Path, output: &Path) -> MediaResult<AudioInfo>;

    /// Encode one preview rendition.
    async fn encode_preview(
        &self,
        input: &Path,
        output: &Path,
        preset: &PreviewPreset,
    ) -> MediaResult<()>;

    /// Render the waveform and spectrogram of one size.
    async fn render_displays(
        &self,
        input: &Path,
        waveform: &Path,
        spectrogram: &Path,
        size: DisplaySize,
    ) -> MediaResult<()>;
}

/// Production processor: ffmpeg for codecs, native rendering for images.
#[derive(Debug, Clone, Default)]
pub struct FfmpegAudioProcessor {
    runner: FfmpegRunner,
}

impl FfmpegAudioProcessor {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self { runner }
    }

    /// Processor whose ffmpeg invocations are killed after `secs`.
    pub fn with_timeout(secs: u64) -> Self {
        Self::new(FfmpegRunner::new().with_timeout(secs))
    }
}

#[async_trait]
impl AudioProcessor for FfmpegAudioProcessor {
    async fn is_canonical_pcm(&self, path: &Path) -> MediaResult<bool> {
        probe::is_canonical_pcm(path).await
    }

    async fn convert_to_pcm(&self, input: &Path, output: &Path) -> MediaResult<()> {
        convert::convert_to_pcm(&self.runner, input, output).await
    }

    async fn stereofy(&self, input: &Path, output: &Path) -> MediaResult<AudioInfo> {
        convert::stereofy(&self.runner, input, output).await
    }

    async fn encode_preview(
        &self,
        input: &Path,
        output: &Path,
        preset: &PreviewPreset,
    ) -> MediaResult<()> {
        convert::encode_preview(&self.runner, input, output, preset).await
    }

    async fn render_displays(
        &self,
        input: &Path,
        waveform: &Path,
        spectrogram: &Path,
        size: DisplaySize,
    ) -> MediaResult<()> {
        let (input, waveform, spectrogram): (PathBuf, PathBuf, PathBuf) =
            (input.into(), waveform.into(), spectrogram.into());

        // Decoding and the FFT are CPU-bound
        match tokio::task::spawn_blocking(move || {
            display::render_displays(&input, &waveform, &spectrogram, size)
        })
        .await
        {
            Ok(result) => result,
            // Surface renderer panics in the calling task
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(MediaError::internal(format!(
                "display rendering task failed: {e}"
            ))),
        }
    }
}

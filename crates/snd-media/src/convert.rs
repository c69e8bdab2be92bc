//! PCM conversion, stereo normalisation and preview encoding.

use std::path::Path;
use tracing::debug;

use snd_models::encoding::{PCM_CODEC, WORKING_CHANNELS};
use snd_models::{AudioInfo, PreviewPreset};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_audio;

/// Build the command converting any input to 16-bit PCM WAV.
pub fn pcm_command(input: &Path, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .no_video()
        .audio_codec(PCM_CODEC)
        .strip_metadata()
        .format("wav")
}

/// Build the command writing the fixed-layout working file.
pub fn stereo_command(input: &Path, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .no_video()
        .audio_codec(PCM_CODEC)
        .audio_channels(WORKING_CHANNELS)
        .strip_metadata()
        .format("wav")
}

/// Build the command encoding a preview rendition.
pub fn preview_command(input: &Path, output: &Path, preset: &PreviewPreset) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .no_video()
        .output_args(preset.ffmpeg_args())
        .strip_metadata()
}

/// Convert an audio file to canonical PCM.
pub async fn convert_to_pcm(runner: &FfmpegRunner, input: &Path, output: &Path) -> MediaResult<()> {
    runner.run(&pcm_command(input, output)).await?;
    ensure_written(output)
}

/// Write the stereo working file and return the input's technical metadata.
pub async fn stereofy(runner: &FfmpegRunner, input: &Path, output: &Path) -> MediaResult<AudioInfo> {
    let probe = probe_audio(input).await?;
    if probe.channels == 0 {
        return Err(MediaError::invalid_audio(format!(
            "{} reports zero channels",
            input.display()
        )));
    }
    debug!(
        "Stereofying {} ({} Hz, {} ch, {} bit)",
        input.display(),
        probe.sample_rate,
        probe.channels,
        probe.bits_per_sample
    );

    runner.run(&stereo_command(input, output)).await?;
    ensure_written(output)?;

    Ok(probe.audio_info())
}

/// Encode a compressed preview.
pub async fn encode_preview(
    runner: &FfmpegRunner,
    input: &Path,
    output: &Path,
    preset: &PreviewPreset,
) -> MediaResult<()> {
    runner.run(&preview_command(input, output, preset)).await?;
    ensure_written(output)
}

/// FFmpeg can exit zero without producing output on some malformed inputs.
fn ensure_written(output: &Path) -> MediaResult<()> {
    match std::fs::metadata(output) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(MediaError::ffmpeg_failed(
            format!("FFmpeg produced an empty file: {}", output.display()),
            None,
            None,
        )),
        Err(_) => Err(MediaError::FileNotFound(output.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_pcm_command_args() {
        let args = pcm_command(Path::new("in.mp3"), Path::new("out.wav")).build_args();
        assert!(args.windows(2).any(|w| w == ["-c:a", "pcm_s16le"]));
        assert!(args.windows(2).any(|w| w == ["-f", "wav"]));
        assert!(!args.contains(&"-ac".to_string()));
    }

    #[test]
    fn test_stereo_command_forces_two_channels() {
        let args = stereo_command(Path::new("in.wav"), Path::new("out.wav")).build_args();
        assert!(args.windows(2).any(|w| w == ["-ac", "2"]));
    }

    #[test]
    fn test_preview_command_uses_preset() {
        let args = preview_command(
            Path::new("in.wav"),
            Path::new("out.mp3"),
            &PreviewPreset::MP3_LQ,
        )
        .build_args();
        assert!(args.windows(2).any(|w| w == ["-c:a", "libmp3lame"]));
        assert!(args.windows(2).any(|w| w == ["-b:a", "70k"]));
    }

    #[test]
    fn test_ensure_written() {
        let dir = tempfile::TempDir::new().unwrap();
        let empty = dir.path().join("empty.wav");
        std::fs::write(&empty, b"").unwrap();
        assert!(ensure_written(&empty).is_err());

        let full = dir.path().join("full.wav");
        std::fs::write(&full, b"RIFF").unwrap();
        assert!(ensure_written(&full).is_ok());

        let missing = PathBuf::from(dir.path()).join("missing.wav");
        assert!(matches!(ensure_written(&missing), Err(MediaError::FileNotFound(_))));
    }
}

//! FFprobe audio information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use snd_models::AudioInfo;

use crate::error::{MediaError, MediaResult};

/// Audio file information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioProbe {
    /// Container format (e.g. "wav", "flac", "mov,mp4,m4a,3gp,3g2,mj2")
    pub format_name: String,
    /// Audio codec (e.g. "pcm_s16le", "mp3")
    pub codec: String,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: u16,
    /// Bits per sample, 0 when the codec does not report one
    pub bits_per_sample: u16,
    /// Duration in seconds
    pub duration: f64,
    /// Bitrate in bits/second
    pub bitrate: u64,
}

impl AudioProbe {
    /// True when the file is uncompressed PCM in a WAVE container.
    pub fn is_canonical_pcm(&self) -> bool {
        self.format_name.split(',').any(|f| f == "wav") && self.codec.starts_with("pcm_")
    }

    /// Technical metadata in the form stored on the sound.
    pub fn audio_info(&self) -> AudioInfo {
        let bitrate_kbps = if self.bitrate > 0 {
            (self.bitrate as f64 / 1000.0).round() as u32
        } else {
            // Uncompressed fallback
            let bits_per_second = u64::from(self.sample_rate)
                * u64::from(self.bits_per_sample)
                * u64::from(self.channels);
            u32::try_from(bits_per_second / 1000).unwrap_or(u32::MAX)
        };
        AudioInfo {
            samplerate: self.sample_rate,
            bitrate: bitrate_kbps,
            bitdepth: self.bits_per_sample,
            channels: self.channels,
            duration: self.duration,
        }
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u16>,
    bits_per_sample: Option<u16>,
    bits_per_raw_sample: Option<String>,
    duration: Option<String>,
}

/// Probe an audio file for information.
pub async fn probe_audio(path: impl AsRef<Path>) -> MediaResult<AudioProbe> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe failed on {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    parse_probe_output(&output.stdout)
}

/// Parse FFprobe JSON into an [`AudioProbe`].
fn parse_probe_output(stdout: &[u8]) -> MediaResult<AudioProbe> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "audio")
        .ok_or_else(|| MediaError::invalid_audio("No audio stream found"))?;

    let sample_rate = stream
        .sample_rate
        .as_ref()
        .and_then(|s| s.parse::<u32>().ok())
        .filter(|rate| *rate > 0)
        .ok_or_else(|| MediaError::invalid_audio("Audio stream has no sample rate"))?;

    let bits_per_sample = stream
        .bits_per_sample
        .filter(|b| *b > 0)
        .or_else(|| {
            stream
                .bits_per_raw_sample
                .as_ref()
                .and_then(|b| b.parse::<u16>().ok())
        })
        .unwrap_or(0);

    let duration = probe
        .format
        .duration
        .as_ref()
        .or(stream.duration.as_ref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let bitrate = probe
        .format
        .bit_rate
        .as_ref()
        .and_then(|b| b.parse::<u64>().ok())
        .unwrap_or(0);

    Ok(AudioProbe {
        format_name: probe.format.format_name.clone().unwrap_or_default(),
        codec: stream.codec_name.clone().unwrap_or_default(),
        sample_rate,
        channels: stream.channels.unwrap_or(0),
        bits_per_sample,
        duration,
        bitrate,
    })
}

/// Check whether a file is already canonical PCM.
pub async fn is_canonical_pcm(path: impl AsRef<Path>) -> MediaResult<bool> {
    Ok(probe_audio(path).await?.is_canonical_pcm())
}

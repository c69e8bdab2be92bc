//! Preview encoding and display rendering parameters.
//!
//! These values are fixed; they are not user-configurable.

use serde::{Deserialize, Serialize};
use std::fmt;

/// FFT window size used for spectrogram rendering (samples).
pub const FFT_WINDOW_SIZE: usize = 2048;

/// Sample format written for canonical PCM working files.
pub const PCM_CODEC: &str = "pcm_s16le";
/// Channel layout of the normalised working file.
pub const WORKING_CHANNELS: u16 = 2;

/// Compressed preview codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewCodec {
    Mp3,
    Ogg,
}

impl PreviewCodec {
    /// File extension of the preview.
    pub fn extension(&self) -> &'static str {
        match self {
            PreviewCodec::Mp3 => "mp3",
            PreviewCodec::Ogg => "ogg",
        }
    }

    /// FFmpeg encoder name.
    pub fn encoder(&self) -> &'static str {
        match self {
            PreviewCodec::Mp3 => "libmp3lame",
            PreviewCodec::Ogg => "libvorbis",
        }
    }
}

impl fmt::Display for PreviewCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Preview quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewQuality {
    Low,
    High,
}

impl PreviewQuality {
    /// Short tag used in file names and logs ("LQ"/"HQ").
    pub fn tag(&self) -> &'static str {
        match self {
            PreviewQuality::Low => "LQ",
            PreviewQuality::High => "HQ",
        }
    }
}

/// One (codec, quality) preview rendition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreviewPreset {
    pub codec: PreviewCodec,
    pub quality: PreviewQuality,
    /// Constant bitrate in kbps for mp3, VBR quality level for ogg
    pub level: u16,
}

impl PreviewPreset {
    pub const MP3_LQ: PreviewPreset = PreviewPreset {
        codec: PreviewCodec::Mp3,
        quality: PreviewQuality::Low,
        level: 70,
    };
    pub const MP3_HQ: PreviewPreset = PreviewPreset {
        codec: PreviewCodec::Mp3,
        quality: PreviewQuality::High,
        level: 192,
    };
    pub const OGG_LQ: PreviewPreset = PreviewPreset {
        codec: PreviewCodec::Ogg,
        quality: PreviewQuality::Low,
        level: 1,
    };
    pub const OGG_HQ: PreviewPreset = PreviewPreset {
        codec: PreviewCodec::Ogg,
        quality: PreviewQuality::High,
        level: 6,
    };

    /// All presets in encoding order (mp3 before ogg).
    pub const ALL: [PreviewPreset; 4] = [
        Self::MP3_LQ,
        Self::MP3_HQ,
        Self::OGG_LQ,
        Self::OGG_HQ,
    ];

    /// FFmpeg output arguments selecting encoder and quality.
    pub fn ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec!["-c:a".to_string(), self.codec.encoder().to_string()];
        match self.codec {
            PreviewCodec::Mp3 => {
                args.push("-b:a".to_string());
                args.push(format!("{}k", self.level));
            }
            PreviewCodec::Ogg => {
                args.push("-q:a".to_string());
                args.push(self.level.to_string());
            }
        }
        args
    }
}

impl fmt::Display for PreviewPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.codec, self.quality.tag(), self.level)
    }
}

/// Display image size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisplaySize {
    /// 120x71
    Medium,
    /// 900x201
    Large,
}

impl DisplaySize {
    /// Rendering order.
    pub const ALL: [DisplaySize; 2] = [DisplaySize::Medium, DisplaySize::Large];

    pub fn tag(&self) -> &'static str {
        match self {
            DisplaySize::Medium => "M",
            DisplaySize::Large => "L",
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            DisplaySize::Medium => 120,
            DisplaySize::Large => 900,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            DisplaySize::Medium => 71,
            DisplaySize::Large => 201,
        }
    }

    /// Human-readable name used in processing logs.
    pub fn label(&self) -> &'static str {
        match self {
            DisplaySize::Medium => "medium",
            DisplaySize::Large => "large",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_order_mp3_before_ogg() {
        let codecs: Vec<_> = PreviewPreset::ALL.iter().map(|p| p.codec).collect();
        assert_eq!(
            codecs,
            vec![PreviewCodec::Mp3, PreviewCodec::Mp3, PreviewCodec::Ogg, PreviewCodec::Ogg]
        );
        let levels: Vec<_> = PreviewPreset::ALL.iter().map(|p| p.level).collect();
        assert_eq!(levels, vec![70, 192, 1, 6]);
    }

    #[test]
    fn test_preset_ffmpeg_args() {
        assert_eq!(
            PreviewPreset::MP3_HQ.ffmpeg_args(),
            vec!["-c:a", "libmp3lame", "-b:a", "192k"]
        );
        assert_eq!(
            PreviewPreset::OGG_LQ.ffmpeg_args(),
            vec!["-c:a", "libvorbis", "-q:a", "1"]
        );
    }

    #[test]
    fn test_display_sizes() {
        assert_eq!((DisplaySize::Medium.width(), DisplaySize::Medium.height()), (120, 71));
        assert_eq!((DisplaySize::Large.width(), DisplaySize::Large.height()), (900, 201));
        assert_eq!(DisplaySize::ALL[0], DisplaySize::Medium);
    }
}

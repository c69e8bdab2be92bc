//! Deterministic storage naming scheme.
//!
//! Every path derived from a sound is computed from its identity and the
//! canonical data root; none of them is stored.

use std::path::{Path, PathBuf};

use crate::encoding::{DisplaySize, PreviewPreset};
use crate::sound::{Sound, SoundId};

/// Paths of a sound's source and derived artifacts in the canonical tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundLocations {
    root: PathBuf,
    sound_id: SoundId,
    user_id: u64,
    file_type: String,
}

impl SoundLocations {
    pub fn new(
        root: impl Into<PathBuf>,
        sound_id: SoundId,
        user_id: u64,
        file_type: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            sound_id,
            user_id,
            file_type: file_type.into(),
        }
    }

    /// Locations for an existing sound record.
    pub fn for_sound(root: impl Into<PathBuf>, sound: &Sound) -> Self {
        Self::new(root, sound.id, sound.user_id, sound.file_type.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn stem(&self) -> String {
        format!("{}_{}", self.sound_id, self.user_id)
    }

    fn bucket(&self, kind: &str) -> PathBuf {
        self.root
            .join(kind)
            .join(self.sound_id.folder().to_string())
    }

    /// Canonical path of the source audio.
    pub fn path(&self) -> PathBuf {
        self.bucket("sounds")
            .join(format!("{}.{}", self.stem(), self.file_type))
    }

    /// Path of a compressed preview.
    pub fn preview(&self, preset: &PreviewPreset) -> PathBuf {
        self.bucket("previews").join(format!(
            "{}-{}.{}",
            self.stem(),
            preset.quality.tag().to_lowercase(),
            preset.codec.extension()
        ))
    }

    /// Path of the waveform image.
    pub fn waveform(&self, size: DisplaySize) -> PathBuf {
        self.bucket("displays")
            .join(format!("{}_wave_{}.png", self.stem(), size.tag()))
    }

    /// Path of the spectrogram image.
    pub fn spectrogram(&self, size: DisplaySize) -> PathBuf {
        self.bucket("displays")
            .join(format!("{}_spec_{}.png", self.stem(), size.tag()))
    }

    /// Path of the analysis output.
    pub fn analysis(&self) -> PathBuf {
        self.bucket("analysis")
            .join(format!("{}.json", self.stem()))
    }

    /// Every derived artifact path, previews first.
    pub fn derived(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = PreviewPreset::ALL.iter().map(|p| self.preview(p)).collect();
        for size in DisplaySize::ALL {
            paths.push(self.waveform(size));
            paths.push(self.spectrogram(size));
        }
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locations() -> SoundLocations {
        SoundLocations::new("/data", SoundId(123_456), 99, "flac")
    }

    #[test]
    fn test_source_path() {
        assert_eq!(
            locations().path(),
            PathBuf::from("/data/sounds/123/123456_99.flac")
        );
    }

    #[test]
    fn test_preview_paths() {
        let loc = locations();
        assert_eq!(
            loc.preview(&PreviewPreset::MP3_LQ),
            PathBuf::from("/data/previews/123/123456_99-lq.mp3")
        );
        assert_eq!(
            loc.preview(&PreviewPreset::OGG_HQ),
            PathBuf::from("/data/previews/123/123456_99-hq.ogg")
        );
    }

    #[test]
    fn test_display_paths() {
        let loc = locations();
        assert_eq!(
            loc.waveform(DisplaySize::Medium),
            PathBuf::from("/data/displays/123/123456_99_wave_M.png")
        );
        assert_eq!(
            loc.spectrogram(DisplaySize::Large),
            PathBuf::from("/data/displays/123/123456_99_spec_L.png")
        );
    }

    #[test]
    fn test_derived_paths_are_distinct() {
        let derived = locations().derived();
        assert_eq!(derived.len(), 8);
        let mut unique = derived.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 8);
    }

    #[test]
    fn test_for_sound_uses_identity() {
        let sound = Sound::new(42, 7, "wav", "/mnt/freesound-data/x.wav");
        let loc = SoundLocations::for_sound("/data", &sound);
        assert_eq!(loc.path(), PathBuf::from("/data/sounds/0/42_7.wav"));
        assert_eq!(loc.analysis(), PathBuf::from("/data/analysis/0/42_7.json"));
    }
}

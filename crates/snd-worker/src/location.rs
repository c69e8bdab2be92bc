//! Location resolution across the two storage tiers.
//!
//! The canonical path is a pure function of the sound's identity (see
//! [`SoundLocations`]). Resolution reconciles it with `original_path`,
//! copying sources that still live in the legacy tier. The legacy copy is
//! never deleted, so a repeated run can always resolve again.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use snd_media::{copy_file, MediaError};
use snd_models::{LogEntry, ProcessingLog, Sound, SoundLocations};

/// Why a sound's source could not be located.
#[derive(Debug, Error)]
pub enum LocationError {
    #[error("The file to be processed can't be found at its legacy nor at its canonical location.")]
    NotFound { canonical: PathBuf, legacy: PathBuf },

    #[error("The file appears to be in an unexpected location and not in '{}'!", .root.display())]
    UnexpectedLocation { path: PathBuf, root: PathBuf },

    #[error("Could not copy {} to {}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: MediaError,
    },
}

impl LocationError {
    /// Processing log entry describing this failure.
    pub fn log_entry(&self) -> LogEntry {
        let detail = match self {
            LocationError::Copy { source, .. } => Some(source.to_string()),
            _ => None,
        };
        LogEntry::failure(self.to_string(), detail)
    }
}

/// Successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Canonical path of the source, now present on disk
    pub path: PathBuf,
    /// The source was copied from the legacy tier during this call
    pub migrated: bool,
    /// `original_path` was updated and needs persisting
    pub path_changed: bool,
}

/// Resolves a sound's source into the canonical tier.
#[derive(Debug, Clone)]
pub struct LocationResolver {
    data_root: PathBuf,
    legacy_root: PathBuf,
}

impl LocationResolver {
    pub fn new(data_root: impl Into<PathBuf>, legacy_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            legacy_root: legacy_root.into(),
        }
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn legacy_root(&self) -> &Path {
        &self.legacy_root
    }

    /// All canonical-tier paths of a sound.
    pub fn locations(&self, sound: &Sound) -> SoundLocations {
        SoundLocations::for_sound(&self.data_root, sound)
    }

    /// Whether `path` lies inside the recognised legacy root.
    pub fn is_legacy_path(&self, path: &Path) -> bool {
        path.is_absolute()
            && !path.components().any(|c| matches!(c, Component::ParentDir))
            && path.starts_with(&self.legacy_root)
    }

    /// Locate the source of `sound`, migrating it to the canonical tier if needed.
    ///
    /// Updates `sound.original_path` on success; the caller persists it.
    pub async fn resolve(
        &self,
        sound: &mut Sound,
        log: &mut ProcessingLog,
    ) -> Result<Resolution, LocationError> {
        let canonical = self.locations(sound).path();

        if exists(&canonical).await {
            log.info(format!(
                "Found the file at its canonical location: {}",
                canonical.display()
            ));
            let path_changed = sound.original_path != canonical;
            if path_changed {
                sound.original_path = canonical.clone();
            }
            return Ok(Resolution {
                path: canonical,
                migrated: false,
                path_changed,
            });
        }

        let legacy = sound.original_path.clone();
        if !exists(&legacy).await {
            return Err(LocationError::NotFound { canonical, legacy });
        }

        log.info(format!(
            "Found the file at its legacy location: {}",
            legacy.display()
        ));
        if !self.is_legacy_path(&legacy) {
            return Err(LocationError::UnexpectedLocation {
                path: legacy,
                root: self.legacy_root.clone(),
            });
        }

        log.info(format!(
            "Copying file from {} to {}",
            legacy.display(),
            canonical.display()
        ));
        copy_file(&legacy, &canonical)
            .await
            .map_err(|source| LocationError::Copy {
                from: legacy.clone(),
                to: canonical.clone(),
                source,
            })?;
        debug!(sound_id = %sound.id, "Migrated source to canonical tier");

        sound.original_path = canonical.clone();
        log.info("Copied file from its legacy to its canonical location.");

        Ok(Resolution {
            path: canonical,
            migrated: true,
            path_changed: true,
        })
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Tiers {
        _dir: TempDir,
        data: PathBuf,
        legacy: PathBuf,
    }

    fn tiers() -> Tiers {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        let legacy = dir.path().join("legacy");
        std::fs::create_dir_all(&legacy).unwrap();
        Tiers {
            data,
            legacy,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_legacy_source_is_copied_not_moved() {
        let t = tiers();
        let legacy_file = t.legacy.join("42.wav");
        std::fs::write(&legacy_file, b"RIFF").unwrap();

        let resolver = LocationResolver::new(&t.data, &t.legacy);
        let mut sound = Sound::new(42, 7, "wav", &legacy_file);
        let mut log = ProcessingLog::new();

        let resolution = resolver.resolve(&mut sound, &mut log).await.unwrap();

        let canonical = t.data.join("sounds/0/42_7.wav");
        assert_eq!(resolution.path, canonical);
        assert!(resolution.migrated && resolution.path_changed);
        assert!(canonical.exists());
        assert!(legacy_file.exists());
        assert_eq!(sound.original_path, canonical);
        assert!(log.render().contains("Copying file from"));
    }

    #[tokio::test]
    async fn test_canonical_source_wins() {
        let t = tiers();
        let canonical = t.data.join("sounds/1/1500_3.flac");
        std::fs::create_dir_all(canonical.parent().unwrap()).unwrap();
        std::fs::write(&canonical, b"fLaC").unwrap();

        let resolver = LocationResolver::new(&t.data, &t.legacy);
        let mut sound = Sound::new(1500, 3, "flac", t.legacy.join("gone.flac"));
        let mut log = ProcessingLog::new();

        let resolution = resolver.resolve(&mut sound, &mut log).await.unwrap();
        assert!(!resolution.migrated);
        assert!(resolution.path_changed);
        assert_eq!(sound.original_path, canonical);

        // Resolving again is a no-op
        let again = resolver.resolve(&mut sound, &mut ProcessingLog::new()).await.unwrap();
        assert!(!again.path_changed);
    }

    #[tokio::test]
    async fn test_missing_everywhere() {
        let t = tiers();
        let resolver = LocationResolver::new(&t.data, &t.legacy);
        let mut sound = Sound::new(7, 1, "wav", t.legacy.join("7.wav"));
        let mut log = ProcessingLog::new();

        let err = resolver.resolve(&mut sound, &mut log).await.unwrap_err();
        assert!(matches!(err, LocationError::NotFound { .. }));
        assert!(log.is_empty());
        assert!(!t.data.exists());
    }

    #[tokio::test]
    async fn test_source_outside_legacy_root_is_rejected() {
        let t = tiers();
        let stray_dir = t._dir.path().join("elsewhere");
        std::fs::create_dir_all(&stray_dir).unwrap();
        let stray = stray_dir.join("9.wav");
        std::fs::write(&stray, b"RIFF").unwrap();

        let resolver = LocationResolver::new(&t.data, &t.legacy);
        let mut sound = Sound::new(9, 1, "wav", &stray);

        let err = resolver
            .resolve(&mut sound, &mut ProcessingLog::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LocationError::UnexpectedLocation { .. }));
        assert_eq!(sound.original_path, stray);
        assert!(!t.data.join("sounds/0/9_1.wav").exists());
    }

    #[test]
    fn test_legacy_root_check() {
        let resolver = LocationResolver::new("/data", "/mnt/freesound-data/");
        assert!(resolver.is_legacy_path(Path::new("/mnt/freesound-data/1/a.wav")));
        assert!(!resolver.is_legacy_path(Path::new("/mnt/freesound-data-old/a.wav")));
        assert!(!resolver.is_legacy_path(Path::new("/mnt/freesound-data/../etc/passwd")));
        assert!(!resolver.is_legacy_path(Path::new("relative/a.wav")));
    }

    #[test]
    fn test_not_found_log_entry() {
        let err = LocationError::NotFound {
            canonical: "/data/a".into(),
            legacy: "/mnt/b".into(),
        };
        let entry = err.log_entry();
        assert!(entry.is_failure());
        assert_eq!(
            entry.to_string(),
            "failed:The file to be processed can't be found at its legacy nor at its canonical location.\n"
        );
    }
}

//! Temporary working file tracking.
//!
//! Only files created through [`TempFiles::create`] are ever tracked, so a
//! source that is already canonical PCM can never be deleted by cleanup.
//! Tracked files left behind by an early return or a panic are still
//! removed when the tracker is dropped.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tracing::debug;

use snd_models::{ProcessingLog, SoundId};

/// Ordered set of temporary files created during one run.
#[derive(Debug)]
pub struct TempFiles {
    dir: PathBuf,
    prefix: String,
    files: Vec<TempPath>,
}

impl TempFiles {
    pub fn new(dir: impl Into<PathBuf>, sound_id: SoundId) -> Self {
        Self {
            dir: dir.into(),
            prefix: format!("{}_", sound_id),
            files: Vec::new(),
        }
    }

    /// Create an empty temporary file in the work directory and track it.
    ///
    /// The work directory must already exist.
    pub fn create(&mut self, suffix: &str) -> io::Result<PathBuf> {
        let path = tempfile::Builder::new()
            .prefix(&self.prefix)
            .suffix(suffix)
            .tempfile_in(&self.dir)?
            .into_temp_path();
        let owned = path.to_path_buf();
        self.files.push(path);
        Ok(owned)
    }

    /// Tracked paths in creation order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|p| p.to_path_buf()).collect()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.iter().any(|p| &**p == path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Log the cleanup, then delete every tracked file in order.
    ///
    /// Deletion failures are ignored. Returns the paths that were tracked.
    pub fn cleanup(&mut self, log: &mut ProcessingLog) -> Vec<PathBuf> {
        let paths = self.paths();
        log.info(format!(
            "cleaning up files after processing: {}",
            paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ));

        for file in self.files.drain(..) {
            let path = file.to_path_buf();
            if let Err(e) = file.close() {
                debug!("Ignoring failure to remove {}: {}", path.display(), e);
            }
        }
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_tracks_in_order() {
        let dir = TempDir::new().unwrap();
        let mut temps = TempFiles::new(dir.path(), SoundId(42));

        let first = temps.create(".wav").unwrap();
        let second = temps.create(".wav").unwrap();

        assert!(first.exists() && second.exists());
        assert_eq!(temps.paths(), vec![first.clone(), second]);
        assert!(temps.contains(&first));
        assert!(first
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("42_"));
    }

    #[test]
    fn test_cleanup_logs_then_removes() {
        let dir = TempDir::new().unwrap();
        let mut temps = TempFiles::new(dir.path(), SoundId(1));
        let a = temps.create(".wav").unwrap();
        let b = temps.create(".wav").unwrap();

        let mut log = ProcessingLog::new();
        let removed = temps.cleanup(&mut log);

        assert_eq!(removed, vec![a.clone(), b.clone()]);
        assert!(!a.exists() && !b.exists());
        assert!(temps.is_empty());
        assert_eq!(
            log.render(),
            format!(
                "cleaning up files after processing: {}, {}\n",
                a.display(),
                b.display()
            )
        );
    }

    #[test]
    fn test_cleanup_tolerates_already_removed_files() {
        let dir = TempDir::new().unwrap();
        let mut temps = TempFiles::new(dir.path(), SoundId(1));
        let a = temps.create(".wav").unwrap();
        std::fs::remove_file(&a).unwrap();

        let mut log = ProcessingLog::new();
        assert_eq!(temps.cleanup(&mut log), vec![a]);
    }

    #[test]
    fn test_drop_removes_tracked_files() {
        let dir = TempDir::new().unwrap();
        let path = {
            let mut temps = TempFiles::new(dir.path(), SoundId(1));
            temps.create(".wav").unwrap()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_work_dir_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut temps = TempFiles::new(dir.path().join("absent"), SoundId(1));
        assert!(temps.create(".wav").is_err());
        assert!(temps.is_empty());
    }

    #[test]
    fn test_untracked_files_are_left_alone() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.wav");
        std::fs::write(&source, b"RIFF").unwrap();

        let mut temps = TempFiles::new(dir.path(), SoundId(1));
        temps.create(".wav").unwrap();
        temps.cleanup(&mut ProcessingLog::new());

        assert!(source.exists());
    }
}

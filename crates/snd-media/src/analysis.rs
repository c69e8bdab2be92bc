//! Best-effort content analysis.
//!
//! Analysis runs after all mandatory stages. Its result never decides the
//! outcome of a run; callers log it and move on.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use snd_models::Sound;

use crate::error::{MediaError, MediaResult};
use crate::fs_utils::ensure_parent;

/// Result of an analysis pass that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    /// Features were written to the given path
    Completed(PathBuf),
    /// No analyzer is configured
    Skipped,
}

/// Feature-extraction collaborator.
#[async_trait]
pub trait SoundAnalyzer: Send + Sync {
    /// Analyse the working file of `sound`, writing features to `output`.
    async fn analyze(&self, sound: &Sound, input: &Path, output: &Path)
        -> MediaResult<AnalysisOutcome>;
}

/// Analyzer used when no extractor is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAnalyzer;

#[async_trait]
impl SoundAnalyzer for NoopAnalyzer {
    async fn analyze(
        &self,
        _sound: &Sound,
        _input: &Path,
        _output: &Path,
    ) -> MediaResult<AnalysisOutcome> {
        Ok(AnalysisOutcome::Skipped)
    }
}

/// Runs an external extractor as `<program> <input> <output>`.
#[derive(Debug, Clone)]
pub struct ExtractorAnalyzer {
    program: PathBuf,
    timeout: Duration,
}

impl ExtractorAnalyzer {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl SoundAnalyzer for ExtractorAnalyzer {
    async fn analyze(
        &self,
        sound: &Sound,
        input: &Path,
        output: &Path,
    ) -> MediaResult<AnalysisOutcome> {
        ensure_parent(output).await?;
        debug!(
            sound_id = %sound.id,
            "Running extractor {} on {}",
            self.program.display(),
            input.display()
        );

        let child = Command::new(&self.program)
            .arg(input)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let result = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| MediaError::Timeout(self.timeout.as_secs()))??;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            return Err(MediaError::analyzer_failed(
                format!(
                    "{} exited with {}",
                    self.program.display(),
                    result
                        .status
                        .code()
                        .map_or_else(|| "signal".to_string(), |c| c.to_string())
                ),
                (!stderr.is_empty()).then_some(stderr),
            ));
        }

        if !output.exists() {
            return Err(MediaError::analyzer_failed(
                format!("{} produced no output", self.program.display()),
                None,
            ));
        }

        Ok(AnalysisOutcome::Completed(output.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sound() -> Sound {
        Sound::new(42, 7, "wav", "/data/sounds/0/42_7.wav")
    }

    #[tokio::test]
    async fn test_noop_analyzer_skips() {
        let outcome = NoopAnalyzer
            .analyze(&sound(), Path::new("in.wav"), Path::new("out.json"))
            .await
            .unwrap();
        assert_eq!(outcome, AnalysisOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_missing_extractor_is_an_error() {
        let dir = TempDir::new().unwrap();
        let analyzer = ExtractorAnalyzer::new(
            dir.path().join("no-such-extractor"),
            Duration::from_secs(5),
        );
        let result = analyzer
            .analyze(&sound(), Path::new("in.wav"), &dir.path().join("out.json"))
            .await;
        assert!(matches!(result, Err(MediaError::Io(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_extractor_writes_output() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let script = dir.path().join("extract.sh");
        std::fs::write(&script, "#!/bin/sh\necho '{\"ok\":true}' > \"$2\"\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let output = dir.path().join("analysis").join("0").join("42_7.json");
        let outcome = ExtractorAnalyzer::new(&script, Duration::from_secs(5))
            .analyze(&sound(), Path::new("in.wav"), &output)
            .await
            .unwrap();

        assert_eq!(outcome, AnalysisOutcome::Completed(output.clone()));
        assert!(output.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_extractor_failure_keeps_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let script = dir.path().join("extract.sh");
        std::fs::write(&script, "#!/bin/sh\necho 'bad frame' >&2\nexit 3\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let err = ExtractorAnalyzer::new(&script, Duration::from_secs(5))
            .analyze(&sound(), Path::new("in.wav"), &dir.path().join("out.json"))
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::AnalyzerFailed { .. }));
        assert_eq!(err.stderr(), Some("bad frame"));
        assert!(err.to_string().contains("exited with 3"));
    }
}

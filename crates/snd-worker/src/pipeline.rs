//! The transcoding pipeline.
//!
//! Stages run strictly in order:
//!
//! 1. PCM conversion (skipped when the source already is canonical PCM)
//! 2. Stereo normalisation and metadata extraction
//! 3. Preview encodings, mp3 before ogg, low before high quality
//! 4. Medium waveform and spectrogram
//! 5. Large waveform and spectrogram
//! 6. Analysis (best-effort)
//!
//! Each stage runs inside its own failure boundary. Tool errors become
//! [`StageError::Processing`], panics become [`StageError::Unhandled`].
//! A failure in stages 1-5 aborts the run; an analysis failure is only
//! logged. Temporary files are cleaned up on every exit.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::FutureExt;
use thiserror::Error;
use tracing::{debug, error, warn};

use snd_media::{ensure_dir, ensure_parent, AnalysisOutcome, AudioProcessor, MediaError, MediaResult, SoundAnalyzer};
use snd_models::{DisplaySize, LogEntry, PreviewPreset, ProcessingLog, Sound, SoundLocations};

use crate::cleanup::TempFiles;
use crate::metrics::record_stage_failure;

/// A pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    PcmConversion,
    Stereofy,
    Preview(PreviewPreset),
    Displays(DisplaySize),
    Analysis,
}

impl Stage {
    /// Metric label.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::PcmConversion => "pcm_conversion",
            Stage::Stereofy => "stereofy",
            Stage::Preview(_) => "preview",
            Stage::Displays(_) => "displays",
            Stage::Analysis => "analysis",
        }
    }

    /// Whether a failure of this stage fails the run.
    pub fn is_mandatory(&self) -> bool {
        !matches!(self, Stage::Analysis)
    }

    /// Processing log message for an expected failure of this stage.
    pub fn failure_message(&self) -> String {
        match self {
            Stage::PcmConversion => "conversion to pcm has failed".to_string(),
            Stage::Stereofy => "stereofy has failed".to_string(),
            Stage::Preview(preset) => {
                format!("conversion to {} (preview) has failed", preset.codec.extension())
            }
            Stage::Displays(size) => format!("creation of images ({}) has failed", size.tag()),
            Stage::Analysis => "analyzing sound failed".to_string(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::PcmConversion => write!(f, "conversion to pcm"),
            Stage::Stereofy => write!(f, "stereofy"),
            Stage::Preview(preset) => write!(
                f,
                "{} {} preview",
                preset.codec.extension(),
                preset.quality.tag()
            ),
            Stage::Displays(size) => write!(f, "{} images", size.label()),
            Stage::Analysis => write!(f, "analysis"),
        }
    }
}

/// Failure of a single stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{stage} failed: {source}")]
    Processing {
        stage: Stage,
        #[source]
        source: MediaError,
    },

    #[error("unhandled fault during {stage}: {message}")]
    Unhandled { stage: Stage, message: String },
}

impl StageError {
    pub fn stage(&self) -> Stage {
        match self {
            StageError::Processing { stage, .. } | StageError::Unhandled { stage, .. } => *stage,
        }
    }

    pub fn is_unhandled(&self) -> bool {
        matches!(self, StageError::Unhandled { .. })
    }

    /// Processing log entry describing this failure.
    pub fn log_entry(&self) -> LogEntry {
        match self {
            StageError::Processing { stage, source } => {
                let detail = match source.stderr() {
                    Some(stderr) => format!("{}\n{}", source, stderr),
                    None => source.to_string(),
                };
                LogEntry::failure(stage.failure_message(), Some(detail))
            }
            StageError::Unhandled { stage, message } => {
                LogEntry::unhandled(format!("during {}", stage), Some(message.clone()))
            }
        }
    }

    fn record(&self) {
        let kind = if self.is_unhandled() { "unhandled" } else { "processing" };
        record_stage_failure(self.stage().name(), kind);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run one stage inside its failure boundary.
async fn guarded<T, F>(stage: Stage, fut: F) -> Result<T, StageError>
where
    F: Future<Output = MediaResult<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(StageError::Processing { stage, source }),
        Err(payload) => {
            let message = panic_message(payload);
            error!(stage = %stage, "Unhandled fault in pipeline stage: {}", message);
            Err(StageError::Unhandled { stage, message })
        }
    }
}

async fn ensure_parent_best_effort(path: &Path) {
    if let Err(e) = ensure_parent(path).await {
        debug!("Could not create directory for {}: {}", path.display(), e);
    }
}

/// Outcome of one pipeline execution.
#[derive(Debug)]
pub struct PipelineReport {
    /// `Err` holds the mandatory stage that aborted the run
    pub result: Result<(), StageError>,
    /// Temporary files removed by cleanup, in creation order
    pub removed_temp_files: Vec<PathBuf>,
}

/// Ordered stage sequence over one resolved source.
pub struct TranscodingPipeline {
    processor: Arc<dyn AudioProcessor>,
    analyzer: Arc<dyn SoundAnalyzer>,
    work_dir: PathBuf,
}

impl TranscodingPipeline {
    pub fn new(
        processor: Arc<dyn AudioProcessor>,
        analyzer: Arc<dyn SoundAnalyzer>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            processor,
            analyzer,
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Create the work directory. Called at startup; every run checks again.
    pub async fn prepare(&self) -> MediaResult<()> {
        ensure_dir(&self.work_dir).await
    }

    /// Run all stages for `sound`, whose source has been resolved to `source`.
    ///
    /// Stage results are appended to `log`; technical metadata is written to
    /// `sound` after stereo normalisation. Cleanup runs before returning.
    pub async fn execute(
        &self,
        sound: &mut Sound,
        locations: &SoundLocations,
        source: &Path,
        log: &mut ProcessingLog,
    ) -> PipelineReport {
        // A missing work dir surfaces as a stage 1 failure
        if let Err(e) = self.prepare().await {
            debug!("Could not create work dir {}: {}", self.work_dir.display(), e);
        }
        let mut temps = TempFiles::new(&self.work_dir, sound.id);

        let result = self
            .run_stages(sound, locations, source, log, &mut temps)
            .await;
        if let Err(e) = &result {
            e.record();
            log.push(e.log_entry());
        }

        let removed_temp_files = temps.cleanup(log);
        PipelineReport {
            result,
            removed_temp_files,
        }
    }

    async fn run_stages(
        &self,
        sound: &mut Sound,
        locations: &SoundLocations,
        source: &Path,
        log: &mut ProcessingLog,
        temps: &mut TempFiles,
    ) -> Result<(), StageError> {
        let processor = self.processor.as_ref();

        // Stage 1: canonical PCM, reusing the source when it already is
        let converted = guarded(Stage::PcmConversion, async {
            if processor.is_canonical_pcm(source).await? {
                return Ok::<_, MediaError>(None);
            }
            let tmp = temps.create(".wav")?;
            processor.convert_to_pcm(source, &tmp).await?;
            Ok(Some(tmp))
        })
        .await?;

        let pcm = match converted {
            Some(tmp) => {
                log.info(format!("converted to pcm: {}", tmp.display()));
                tmp
            }
            None => {
                log.info("no need to convert, this file is already pcm data");
                source.to_path_buf()
            }
        };

        // Stage 2: fixed-layout working file shared by every later stage
        let (working, info) = guarded(Stage::Stereofy, async {
            let tmp = temps.create(".wav")?;
            let info = processor.stereofy(&pcm, &tmp).await?;
            Ok::<_, MediaError>((tmp, info))
        })
        .await?;

        log.info(format!("got sound info and stereofied: {}", working.display()));
        sound.apply_audio_info(&info);

        // Stage 3: previews
        for preset in PreviewPreset::ALL {
            let target = locations.preview(&preset);
            ensure_parent_best_effort(&target).await;

            guarded(
                Stage::Preview(preset),
                processor.encode_preview(&working, &target, &preset),
            )
            .await?;
            log.info(format!(
                "created {}: {}",
                preset.codec.extension(),
                target.display()
            ));
        }

        // Stages 4 and 5: both sizes share one directory
        ensure_parent_best_effort(&locations.waveform(DisplaySize::Medium)).await;
        for size in DisplaySize::ALL {
            let waveform = locations.waveform(size);
            let spectrogram = locations.spectrogram(size);

            guarded(
                Stage::Displays(size),
                processor.render_displays(&working, &waveform, &spectrogram, size),
            )
            .await?;
            log.info(format!("created images, {}", size.label()));
        }

        // Stage 6: best-effort
        let output = locations.analysis();
        match guarded(
            Stage::Analysis,
            self.analyzer.analyze(sound, &working, &output),
        )
        .await
        {
            Ok(AnalysisOutcome::Completed(path)) => {
                log.info(format!("analyzed sound: {}", path.display()));
            }
            Ok(AnalysisOutcome::Skipped) => {
                log.info("analysis skipped: no analyzer configured");
            }
            Err(e) => {
                warn!(sound_id = %sound.id, "Analysis failed, run continues: {}", e);
                e.record();
                log.push(e.log_entry());
            }
        }

        Ok(())
    }
}

//! Sound records and their processing lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Unique identifier for an uploaded sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SoundId(pub u64);

impl SoundId {
    /// Get the numeric value.
    pub fn get(&self) -> u64 {
        self.0
    }

    /// Bucket folder used by the storage naming scheme (1000 sounds per folder).
    pub fn folder(&self) -> u64 {
        self.0 / 1000
    }
}

impl fmt::Display for SoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SoundId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::str::FromStr for SoundId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Processing state of a sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    /// Uploaded, never submitted
    #[default]
    Unprocessed,
    /// Submitted to the work queue
    Queued,
    /// A worker is running the pipeline
    Processing,
    /// Last run completed all mandatory stages
    Succeeded,
    /// Last run aborted
    Failed,
}

impl ProcessingState {
    /// Get string representation of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingState::Unprocessed => "unprocessed",
            ProcessingState::Queued => "queued",
            ProcessingState::Processing => "processing",
            ProcessingState::Succeeded => "succeeded",
            ProcessingState::Failed => "failed",
        }
    }

    /// Check if this state ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingState::Succeeded | ProcessingState::Failed)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// `Processing -> Processing` covers queue redelivery of an interrupted run.
    /// `Unprocessed/Failed -> Processing` covers a run invoked directly by an operator.
    pub fn can_transition_to(&self, next: ProcessingState) -> bool {
        use ProcessingState::*;
        matches!(
            (self, next),
            (Unprocessed, Queued)
                | (Unprocessed, Processing)
                | (Queued, Queued)
                | (Queued, Processing)
                | (Processing, Processing)
                | (Processing, Succeeded)
                | (Processing, Failed)
                | (Succeeded, Queued)
                | (Failed, Queued)
                | (Failed, Processing)
        )
    }
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("sound {sound_id}: cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub sound_id: SoundId,
    pub from: ProcessingState,
    pub to: ProcessingState,
}

/// Technical metadata extracted during stereo normalisation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioInfo {
    /// Sample rate in Hz
    pub samplerate: u32,
    /// Bitrate in kbps
    pub bitrate: u32,
    /// Bits per sample
    pub bitdepth: u16,
    /// Channel count
    pub channels: u16,
    /// Duration in seconds
    pub duration: f64,
}

/// A sound record as persisted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sound {
    /// Unique sound ID
    pub id: SoundId,
    /// Uploading user
    pub user_id: u64,
    /// Extension of the uploaded file (e.g. "wav", "flac")
    pub file_type: String,
    /// Authoritative on-disk location of the source audio
    pub original_path: PathBuf,
    /// Current processing state
    #[serde(default)]
    pub processing_state: ProcessingState,
    /// Last processing state change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_date: Option<DateTime<Utc>>,
    /// Text audit trail of the last run
    #[serde(default)]
    pub processing_log: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samplerate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitdepth: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl Sound {
    /// Create a freshly uploaded sound.
    pub fn new(
        id: impl Into<SoundId>,
        user_id: u64,
        file_type: impl Into<String>,
        original_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id,
            file_type: file_type.into(),
            original_path: original_path.into(),
            processing_state: ProcessingState::Unprocessed,
            processing_date: None,
            processing_log: String::new(),
            samplerate: None,
            bitrate: None,
            bitdepth: None,
            channels: None,
            duration: None,
        }
    }

    fn transition(&mut self, to: ProcessingState) -> Result<(), InvalidTransition> {
        if !self.processing_state.can_transition_to(to) {
            return Err(InvalidTransition {
                sound_id: self.id,
                from: self.processing_state,
                to,
            });
        }
        self.processing_state = to;
        self.processing_date = Some(Utc::now());
        Ok(())
    }

    /// Mark the sound as submitted to the work queue.
    pub fn mark_queued(&mut self) -> Result<(), InvalidTransition> {
        self.transition(ProcessingState::Queued)
    }

    /// Start a run: only the last attempt's log is kept.
    pub fn begin_processing(&mut self) -> Result<(), InvalidTransition> {
        self.transition(ProcessingState::Processing)?;
        self.processing_log.clear();
        Ok(())
    }

    /// Mark the current run as successful.
    pub fn mark_succeeded(&mut self) -> Result<(), InvalidTransition> {
        self.transition(ProcessingState::Succeeded)
    }

    /// Mark the current run as failed.
    pub fn mark_failed(&mut self) -> Result<(), InvalidTransition> {
        self.transition(ProcessingState::Failed)
    }

    /// Store technical metadata, replacing values from earlier runs.
    pub fn apply_audio_info(&mut self, info: &AudioInfo) {
        self.samplerate = Some(info.samplerate);
        self.bitrate = Some(info.bitrate);
        self.bitdepth = Some(info.bitdepth);
        self.channels = Some(info.channels);
        self.duration = Some(info.duration);
    }

    /// True once technical metadata has been extracted.
    pub fn has_audio_info(&self) -> bool {
        self.samplerate.is_some()
            && self.bitrate.is_some()
            && self.bitdepth.is_some()
            && self.channels.is_some()
            && self.duration.is_some()
    }
}

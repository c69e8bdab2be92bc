//! Job types for the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snd_models::{JobId, SoundId};

/// Job to run the processing pipeline for one sound.
///
/// The sound id is the only argument the worker needs; everything else is
/// loaded from the store when the job runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSoundJob {
    /// Unique job ID
    pub job_id: JobId,
    /// Sound to process
    pub sound_id: SoundId,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl ProcessSoundJob {
    /// Create a new process job.
    pub fn new(sound_id: impl Into<SoundId>) -> Self {
        Self {
            job_id: JobId::new(),
            sound_id: sound_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// Generic job wrapper for queue storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    /// Run the processing pipeline for a sound
    ProcessSound(ProcessSoundJob),
}

impl QueueJob {
    /// Job name as stored in the `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            QueueJob::ProcessSound(_) => "process_sound",
        }
    }

    pub fn job_id(&self) -> &JobId {
        match self {
            QueueJob::ProcessSound(j) => &j.job_id,
        }
    }

    pub fn sound_id(&self) -> SoundId {
        match self {
            QueueJob::ProcessSound(j) => j.sound_id,
        }
    }
}

impl From<ProcessSoundJob> for QueueJob {
    fn from(job: ProcessSoundJob) -> Self {
        QueueJob::ProcessSound(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_job_wire_format() {
        let job = QueueJob::from(ProcessSoundJob::new(42));
        let value = serde_json::to_value(&job).expect("serialize QueueJob");

        assert_eq!(value["type"], "process_sound");
        assert_eq!(value["sound_id"], 42);
        assert_eq!(value["job_id"], job.job_id().as_str());
        assert_eq!(job.name(), "process_sound");
    }

    #[test]
    fn queue_job_parses_stored_payload() {
        let json = r#"{
            "type": "process_sound",
            "job_id": "abc",
            "sound_id": 7,
            "created_at": "2024-01-01T00:00:00Z"
        }"#;
        let job: QueueJob = serde_json::from_str(json).expect("deserialize QueueJob");
        assert_eq!(job.sound_id(), SoundId(7));
        assert_eq!(job.job_id().as_str(), "abc");
    }

    #[test]
    fn queue_job_rejects_unknown_type() {
        let json = r#"{"type": "render_clip", "job_id": "x"}"#;
        assert!(serde_json::from_str::<QueueJob>(json).is_err());
    }
}

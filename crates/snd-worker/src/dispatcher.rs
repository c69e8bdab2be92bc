//! Job dispatcher.
//!
//! Marks a sound as queued, persists it and hands its id to the work queue.
//! Submission is fire-and-forget: the run happens later in a worker.

use std::sync::Arc;

use tracing::info;

use snd_models::{ProcessingState, Sound, SoundId};
use snd_queue::{ProcessSoundJob, WorkQueue};
use snd_store::{RunLease, SoundStore};

use crate::error::WorkerResult;
use crate::logging::SoundLogger;
use crate::metrics::record_submitted;

/// Submits sounds for processing.
pub struct SoundDispatcher {
    store: Arc<dyn SoundStore>,
    queue: Arc<dyn WorkQueue>,
    lease: Option<Arc<dyn RunLease>>,
}

impl SoundDispatcher {
    pub fn new(store: Arc<dyn SoundStore>, queue: Arc<dyn WorkQueue>) -> Self {
        Self {
            store,
            queue,
            lease: None,
        }
    }

    /// Consult run leases so a sound left `processing` by a dead run can be
    /// queued again.
    pub fn with_lease(mut self, lease: Arc<dyn RunLease>) -> Self {
        self.lease = Some(lease);
        self
    }

    /// Queue `sound` for processing.
    ///
    /// Rejects a sound that is currently being processed. A `processing`
    /// sound whose run lease has expired is treated as abandoned and queued
    /// again. The record is saved before the job is enqueued, so a worker
    /// never sees a job for a sound that is not yet `queued`.
    pub async fn submit(&self, sound: &mut Sound) -> WorkerResult<()> {
        let logger = SoundLogger::new(sound.id, "submit");

        if sound.processing_state == ProcessingState::Processing {
            if let Some(lease) = &self.lease {
                if !lease.is_active(sound.id).await? {
                    logger.log_warning("previous run holds no lease, treating it as abandoned");
                    sound.mark_failed()?;
                }
            }
        }
        sound.mark_queued()?;
        self.store.save(sound).await?;

        let job = ProcessSoundJob::new(sound.id);
        let job_id = job.job_id.clone();
        let message_id = self.queue.submit(job.into()).await?;

        record_submitted();
        info!(
            sound_id = %sound.id,
            job_id = %job_id,
            message_id = %message_id,
            "Submitted sound for processing"
        );
        logger.log_progress("queued");
        Ok(())
    }

    /// Load a sound by id and queue it.
    pub async fn submit_id(&self, sound_id: SoundId) -> WorkerResult<Sound> {
        let mut sound = self.store.load(sound_id).await?;
        self.submit(&mut sound).await?;
        Ok(sound)
    }
}

//! Processing state machine entry point.
//!
//! [`SoundProcessor::run`] is what the executor calls for every delivered
//! job. A run holds the sound's lease for its whole duration, renewing it
//! in the background, resets the
//! processing log, resolves the source, executes the pipeline and records
//! exactly one terminal state. Nothing inside a run propagates an error to
//! the caller; every failure ends up in the persisted log.

use std::convert::Infallible;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tracing::{debug, Instrument};

use snd_models::{ProcessingLog, ProcessingState, Sound, SoundId};
use snd_store::{LeaseToken, RunLease, SoundStore, StoreResult};

use crate::location::LocationResolver;
use crate::logging::SoundLogger;
use crate::metrics::record_run;
use crate::pipeline::TranscodingPipeline;
use crate::retry::{retry_async, RetryConfig};

/// Why a delivered job did not start a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another run holds the lease for this sound
    LeaseHeld,
    /// The lease backend could not be reached
    LeaseUnavailable,
    /// The sound record could not be loaded
    LoadFailed,
    /// Stale redelivery for a sound that already succeeded
    AlreadySucceeded,
    /// The `processing` transition could not be recorded
    StartFailed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::LeaseHeld => "another run holds the lease",
            SkipReason::LeaseUnavailable => "lease backend unavailable",
            SkipReason::LoadFailed => "sound record could not be loaded",
            SkipReason::AlreadySucceeded => "sound already processed",
            SkipReason::StartFailed => "processing state could not be saved",
        };
        write!(f, "{}", reason)
    }
}

impl SkipReason {
    /// Whether the job should stay pending so the queue delivers it again.
    ///
    /// A held lease may belong to a worker that died; once it expires the
    /// redelivered job takes over the run.
    pub fn wants_redelivery(&self) -> bool {
        matches!(
            self,
            SkipReason::LeaseHeld | SkipReason::LeaseUnavailable | SkipReason::StartFailed
        )
    }
}

/// Outcome of one delivered job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    Failed,
    Skipped(SkipReason),
}

impl RunStatus {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Skipped(_) => "skipped",
        }
    }

    /// Whether the executor should ack the job that produced this status.
    pub fn should_ack(&self) -> bool {
        match self {
            RunStatus::Skipped(reason) => !reason.wants_redelivery(),
            _ => true,
        }
    }
}

/// Detailed result of a run.
#[derive(Debug)]
pub struct RunReport {
    pub sound_id: SoundId,
    pub status: RunStatus,
    /// Structured processing log of this run (empty when skipped)
    pub log: ProcessingLog,
    /// Temporary files removed by cleanup, in creation order
    pub removed_temp_files: Vec<PathBuf>,
    pub duration: Duration,
}

impl RunReport {
    fn skipped(sound_id: SoundId, reason: SkipReason, started: Instant) -> Self {
        Self {
            sound_id,
            status: RunStatus::Skipped(reason),
            log: ProcessingLog::new(),
            removed_temp_files: Vec::new(),
            duration: started.elapsed(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

/// Drives a sound through one processing run.
pub struct SoundProcessor {
    store: Arc<dyn SoundStore>,
    lease: Arc<dyn RunLease>,
    resolver: LocationResolver,
    pipeline: TranscodingPipeline,
    save_retry: RetryConfig,
    lease_renewal: Duration,
}

impl SoundProcessor {
    pub fn new(
        store: Arc<dyn SoundStore>,
        lease: Arc<dyn RunLease>,
        resolver: LocationResolver,
        pipeline: TranscodingPipeline,
    ) -> Self {
        Self {
            store,
            lease,
            resolver,
            pipeline,
            save_retry: RetryConfig::new("save_sound"),
            lease_renewal: Duration::from_secs(60),
        }
    }

    /// How often a running job renews its lease. Keep it well below the lease TTL.
    pub fn with_lease_renewal(mut self, interval: Duration) -> Self {
        self.lease_renewal = interval.max(Duration::from_millis(1));
        self
    }

    /// Override the retry policy for record saves.
    pub fn with_save_retry(mut self, config: RetryConfig) -> Self {
        self.save_retry = config;
        self
    }

    pub fn resolver(&self) -> &LocationResolver {
        &self.resolver
    }

    /// Process one sound. Returns `true` only when the run succeeded.
    pub async fn run(&self, sound_id: SoundId) -> bool {
        self.run_with_report(sound_id).await.succeeded()
    }

    /// Process one sound and return what happened.
    pub async fn run_with_report(&self, sound_id: SoundId) -> RunReport {
        let logger = SoundLogger::new(sound_id, "process_sound");
        let span = logger.create_span();

        async move {
            let started = Instant::now();

            let lease = match self.lease.try_acquire(sound_id).await {
                Ok(Some(lease)) => lease,
                Ok(None) => {
                    logger.log_warning("another run holds the lease, skipping");
                    return self.finish(RunReport::skipped(sound_id, SkipReason::LeaseHeld, started));
                }
                Err(e) => {
                    logger.log_error(&format!("could not acquire run lease: {}", e));
                    return self.finish(RunReport::skipped(
                        sound_id,
                        SkipReason::LeaseUnavailable,
                        started,
                    ));
                }
            };

            let report = tokio::select! {
                biased;
                report = self.run_leased(sound_id, &logger, started) => report,
                never = self.keep_lease(&lease, &logger) => match never {},
            };

            if let Err(e) = self.lease.release(&lease).await {
                logger.log_warning(&format!("could not release run lease: {}", e));
            }
            self.finish(report)
        }
        .instrument(span)
        .await
    }

    /// Renew `lease` until dropped.
    async fn keep_lease(&self, lease: &LeaseToken, logger: &SoundLogger) -> Infallible {
        let mut ticker = tokio::time::interval(self.lease_renewal);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match self.lease.renew(lease).await {
                Ok(true) => debug!(sound_id = %lease.sound_id, "Run lease renewed"),
                Ok(false) => logger.log_warning("run lease expired, another run may take over"),
                Err(e) => logger.log_warning(&format!("could not renew run lease: {}", e)),
            }
        }
    }

    fn finish(&self, report: RunReport) -> RunReport {
        record_run(report.status.label(), report.duration.as_secs_f64());
        report
    }

    async fn run_leased(&self, sound_id: SoundId, logger: &SoundLogger, started: Instant) -> RunReport {
        let mut sound = match self.store.load(sound_id).await {
            Ok(sound) => sound,
            Err(e) => {
                logger.log_error(&format!("could not load sound: {}", e));
                return RunReport::skipped(sound_id, SkipReason::LoadFailed, started);
            }
        };

        if sound.processing_state == ProcessingState::Succeeded {
            logger.log_warning("sound already processed, ignoring stale job");
            return RunReport::skipped(sound_id, SkipReason::AlreadySucceeded, started);
        }

        let mut log = ProcessingLog::new();
        if let Err(e) = sound.begin_processing() {
            logger.log_error(&e.to_string());
            return RunReport::skipped(sound_id, SkipReason::StartFailed, started);
        }
        if let Err(e) = self.persist(&mut sound, &log).await {
            logger.log_error(&format!("could not record processing state: {}", e));
            return RunReport::skipped(sound_id, SkipReason::StartFailed, started);
        }
        logger.log_start(&sound.original_path.display().to_string());

        let mut removed_temp_files = Vec::new();
        let status = match self.resolver.resolve(&mut sound, &mut log).await {
            Err(e) => {
                logger.log_error(&e.to_string());
                log.push(e.log_entry());
                RunStatus::Failed
            }
            Ok(resolution) => {
                if resolution.path_changed {
                    if let Err(e) = self.persist(&mut sound, &log).await {
                        logger.log_warning(&format!("could not record new source path: {}", e));
                    }
                }

                let locations = self.resolver.locations(&sound);
                let report = self
                    .pipeline
                    .execute(&mut sound, &locations, &resolution.path, &mut log)
                    .await;
                removed_temp_files = report.removed_temp_files;

                match report.result {
                    Ok(()) => RunStatus::Succeeded,
                    Err(e) => {
                        logger.log_error(&e.to_string());
                        RunStatus::Failed
                    }
                }
            }
        };

        let transition = match status {
            RunStatus::Succeeded => sound.mark_succeeded(),
            _ => sound.mark_failed(),
        };
        if let Err(e) = transition {
            logger.log_error(&e.to_string());
        }
        if let Err(e) = self.persist(&mut sound, &log).await {
            logger.log_error(&format!("could not record run outcome: {}", e));
        }

        match status {
            RunStatus::Succeeded => logger.log_completion("succeeded"),
            _ => logger.log_warning("run failed, see processing log"),
        }

        RunReport {
            sound_id,
            status,
            log,
            removed_temp_files,
            duration: started.elapsed(),
        }
    }

    /// Render the log into the record and save it, retrying transient failures.
    async fn persist(&self, sound: &mut Sound, log: &ProcessingLog) -> StoreResult<()> {
        sound.processing_log = log.render();
        let snapshot: &Sound = sound;
        retry_async(&self.save_retry, || self.store.save(snapshot))
            .await
            .into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_terminal_outcomes_are_acked() {
        assert!(RunStatus::Succeeded.should_ack());
        assert!(RunStatus::Failed.should_ack());
        assert!(RunStatus::Skipped(SkipReason::AlreadySucceeded).should_ack());
        assert!(RunStatus::Skipped(SkipReason::LoadFailed).should_ack());

        assert!(!RunStatus::Skipped(SkipReason::LeaseHeld).should_ack());
        assert!(!RunStatus::Skipped(SkipReason::LeaseUnavailable).should_ack());
        assert!(!RunStatus::Skipped(SkipReason::StartFailed).should_ack());
    }
}

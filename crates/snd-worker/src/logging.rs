//! Structured run logging utilities.
//!
//! Tracing events for a processing run carry the sound id and the
//! operation name. This is separate from the processing log persisted on
//! the sound record.

use tracing::{error, info, warn, Span};

use snd_models::SoundId;

/// Logger carrying the context of one sound operation.
#[derive(Debug, Clone)]
pub struct SoundLogger {
    sound_id: SoundId,
    operation: &'static str,
}

impl SoundLogger {
    /// Create a logger for a sound and operation (e.g. "process_sound", "submit").
    pub fn new(sound_id: SoundId, operation: &'static str) -> Self {
        Self {
            sound_id,
            operation,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            sound_id = %self.sound_id,
            operation = self.operation,
            "Run started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            sound_id = %self.sound_id,
            operation = self.operation,
            "Run progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            sound_id = %self.sound_id,
            operation = self.operation,
            "Run warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            sound_id = %self.sound_id,
            operation = self.operation,
            "Run error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            sound_id = %self.sound_id,
            operation = self.operation,
            "Run completed: {}", message
        );
    }

    pub fn sound_id(&self) -> SoundId {
        self.sound_id
    }

    pub fn operation(&self) -> &str {
        self.operation
    }

    /// Span wrapping every event of the run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "sound",
            sound_id = %self.sound_id,
            operation = self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sound_logger_context() {
        let logger = SoundLogger::new(SoundId(42), "process_sound");
        assert_eq!(logger.sound_id(), SoundId(42));
        assert_eq!(logger.operation(), "process_sound");
    }
}

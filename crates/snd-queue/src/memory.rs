//! In-memory work queue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{QueueError, QueueResult};
use crate::job::QueueJob;
use crate::queue::WorkQueue;

/// Queue that keeps submitted jobs in process memory.
///
/// Used by tests and by tooling that drives the pipeline without Redis.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    jobs: Mutex<VecDeque<(String, QueueJob)>>,
    next_id: AtomicU64,
    closed: std::sync::atomic::AtomicBool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<(String, QueueJob)>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reject further submissions, as a disconnected broker would.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Take the oldest job.
    pub fn pop(&self) -> Option<(String, QueueJob)> {
        self.lock().pop_front()
    }

    /// Snapshot of jobs waiting to be consumed.
    pub fn pending(&self) -> Vec<QueueJob> {
        self.lock().iter().map(|(_, job)| job.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn submit(&self, job: QueueJob) -> QueueResult<String> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::connection_failed("queue is closed"));
        }
        let id = format!("{}-0", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.lock().push_back((id.clone(), job));
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ProcessSoundJob;
    use snd_models::SoundId;

    #[tokio::test]
    async fn test_submit_is_fifo() {
        let queue = MemoryQueue::new();
        let first = queue.submit(ProcessSoundJob::new(1).into()).await.unwrap();
        let second = queue.submit(ProcessSoundJob::new(2).into()).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(queue.len(), 2);

        let (id, job) = queue.pop().unwrap();
        assert_eq!(id, first);
        assert_eq!(job.sound_id(), SoundId(1));
        assert_eq!(queue.pending().len(), 1);
    }

    #[tokio::test]
    async fn test_closed_queue_rejects() {
        let queue = MemoryQueue::new();
        queue.close();
        let err = queue.submit(ProcessSoundJob::new(1).into()).await.unwrap_err();
        assert!(matches!(err, QueueError::ConnectionFailed(_)));
        assert!(queue.is_empty());
    }
}

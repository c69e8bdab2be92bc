use std::sync::Arc;

use snd_models::{ProcessingState, Sound, SoundId};
use snd_queue::{MemoryQueue, QueueJob};
use snd_store::{MemoryRunLease, MemorySoundStore, RunLease};
use snd_worker::{SoundDispatcher, WorkerError};

fn setup() -> (Arc<MemorySoundStore>, Arc<MemoryQueue>, SoundDispatcher) {
    let store = Arc::new(MemorySoundStore::new());
    let queue = Arc::new(MemoryQueue::new());
    let dispatcher = SoundDispatcher::new(store.clone(), queue.clone());
    (store, queue, dispatcher)
}

#[tokio::test]
async fn test_submit_persists_then_enqueues() {
    let (store, queue, dispatcher) = setup();
    let mut sound = Sound::new(42, 7, "wav", "/mnt/freesound-data/42.wav");

    dispatcher.submit(&mut sound).await.unwrap();

    assert_eq!(sound.processing_state, ProcessingState::Queued);
    assert!(sound.processing_date.is_some());
    assert_eq!(
        store.get(SoundId(42)).unwrap().processing_state,
        ProcessingState::Queued
    );

    let jobs = queue.pending();
    assert_eq!(jobs.len(), 1);
    assert!(matches!(&jobs[0], QueueJob::ProcessSound(j) if j.sound_id == SoundId(42)));
}

#[tokio::test]
async fn test_resubmit_after_failure() {
    let (store, queue, dispatcher) = setup();
    let mut sound = Sound::new(5, 1, "wav", "/x.wav");
    sound.processing_state = ProcessingState::Failed;
    store.insert(sound);

    let queued = dispatcher.submit_id(SoundId(5)).await.unwrap();
    assert_eq!(queued.processing_state, ProcessingState::Queued);
    assert_eq!(queue.len(), 1);
}

#[tokio::test]
async fn test_sound_in_flight_is_rejected() {
    let (store, queue, dispatcher) = setup();
    let mut sound = Sound::new(9, 1, "wav", "/x.wav");
    sound.begin_processing().unwrap();

    let err = dispatcher.submit(&mut sound).await.unwrap_err();
    assert!(matches!(err, WorkerError::InvalidTransition(_)));
    assert_eq!(sound.processing_state, ProcessingState::Processing);
    assert!(store.history(SoundId(9)).is_empty());
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_queue_outage_is_reported() {
    let (store, queue, dispatcher) = setup();
    queue.close();
    let mut sound = Sound::new(3, 1, "wav", "/x.wav");

    let err = dispatcher.submit(&mut sound).await.unwrap_err();
    assert!(matches!(err, WorkerError::Queue(_)));
    assert!(err.is_retryable());
    // The record was saved first, so resubmitting is safe
    assert_eq!(
        store.get(SoundId(3)).unwrap().processing_state,
        ProcessingState::Queued
    );
}

#[tokio::test]
async fn test_unknown_sound() {
    let (_, queue, dispatcher) = setup();
    let err = dispatcher.submit_id(SoundId(404)).await.unwrap_err();
    assert!(matches!(err, WorkerError::Store(_)));
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_abandoned_run_is_requeued_once_its_lease_is_gone() {
    let (store, queue, dispatcher) = setup();
    let lease = Arc::new(MemoryRunLease::new());
    let dispatcher = dispatcher.with_lease(lease.clone());

    let mut sound = Sound::new(9, 1, "wav", "/x.wav");
    sound.begin_processing().unwrap();
    store.insert(sound);

    // Run still alive
    let held = lease.try_acquire(SoundId(9)).await.unwrap().unwrap();
    let err = dispatcher.submit_id(SoundId(9)).await.unwrap_err();
    assert!(matches!(err, WorkerError::InvalidTransition(_)));
    assert!(queue.is_empty());

    // Run gone
    lease.release(&held).await.unwrap();
    let queued = dispatcher.submit_id(SoundId(9)).await.unwrap();
    assert_eq!(queued.processing_state, ProcessingState::Queued);
    assert_eq!(
        store.get(SoundId(9)).unwrap().processing_state,
        ProcessingState::Queued
    );
    assert_eq!(queue.len(), 1);
}

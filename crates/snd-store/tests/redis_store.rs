//! Redis store and lease integration tests.

use std::time::Duration;

use snd_models::{ProcessingState, Sound, SoundId};
use snd_store::{RedisRunLease, RedisSoundStore, RunLease, SoundStore};

fn redis_url() -> String {
    dotenvy::dotenv().ok();
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_save_and_load_sound() {
    let store = RedisSoundStore::new(&redis_url())
        .expect("Failed to create store")
        .with_prefix("snd:test:sound");

    let mut sound = Sound::new(900_001, 5, "flac", "/mnt/freesound-data/900001.flac");
    sound.mark_queued().expect("queue transition");
    store.save(&sound).await.expect("Failed to save");

    let loaded = store.load(SoundId(900_001)).await.expect("Failed to load");
    assert_eq!(loaded.processing_state, ProcessingState::Queued);
    assert_eq!(loaded.original_path, sound.original_path);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_lease_is_exclusive_and_expires() {
    let leases = RedisRunLease::new(&redis_url(), Duration::from_millis(300))
        .expect("Failed to create lease client");
    let id = SoundId(900_002);

    let lease = leases
        .try_acquire(id)
        .await
        .expect("acquire")
        .expect("lease should be free");
    assert!(leases.try_acquire(id).await.expect("acquire").is_none());

    tokio::time::sleep(Duration::from_millis(400)).await;
    let second = leases
        .try_acquire(id)
        .await
        .expect("acquire")
        .expect("lease should have expired");

    // The expired token no longer owns the key
    leases.release(&lease).await.expect("release");
    assert!(leases.try_acquire(id).await.expect("acquire").is_none());

    leases.release(&second).await.expect("release");
}

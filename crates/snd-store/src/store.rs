//! Sound record persistence.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;

use snd_models::{Sound, SoundId};

use crate::error::{StoreError, StoreResult};
use crate::metrics::record_operation;

/// Durable state store for sound records.
///
/// Every state transition is saved before the pipeline proceeds.
#[async_trait]
pub trait SoundStore: Send + Sync {
    /// Load a sound record.
    async fn load(&self, id: SoundId) -> StoreResult<Sound>;

    /// Persist a sound record, replacing any previous version.
    async fn save(&self, sound: &Sound) -> StoreResult<()>;
}

/// Redis-backed store keeping one JSON document per sound.
pub struct RedisSoundStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisSoundStore {
    /// Default key namespace.
    pub const DEFAULT_PREFIX: &'static str = "snd:sound";

    pub fn new(redis_url: &str) -> StoreResult<Self> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
            key_prefix: Self::DEFAULT_PREFIX.to_string(),
        })
    }

    /// Use a different key namespace.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Create from `REDIS_URL`.
    pub fn from_env() -> StoreResult<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        Self::new(&url)
    }

    pub fn key(&self, id: SoundId) -> String {
        format!("{}:{}", self.key_prefix, id)
    }
}

#[async_trait]
impl SoundStore for RedisSoundStore {
    async fn load(&self, id: SoundId) -> StoreResult<Sound> {
        let started = Instant::now();
        let result = async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            let payload: Option<String> = conn.get(self.key(id)).await?;
            let payload = payload.ok_or(StoreError::NotFound(id))?;
            Ok::<Sound, StoreError>(serde_json::from_str(&payload)?)
        }
        .await;

        record_operation("load", result.is_ok(), started.elapsed().as_secs_f64());
        result
    }

    async fn save(&self, sound: &Sound) -> StoreResult<()> {
        let started = Instant::now();
        let result = async {
            let payload = serde_json::to_string(sound)?;
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            conn.set::<_, _, ()>(self.key(sound.id), payload).await?;
            debug!(
                sound_id = %sound.id,
                state = %sound.processing_state,
                "Saved sound record"
            );
            Ok::<(), StoreError>(())
        }
        .await;

        record_operation("save", result.is_ok(), started.elapsed().as_secs_f64());
        result
    }
}

/// Store that keeps records in process memory.
///
/// Every successful save is also appended to a history so callers can
/// inspect the sequence of persisted states.
#[derive(Debug, Default)]
pub struct MemorySoundStore {
    sounds: Mutex<HashMap<SoundId, Sound>>,
    history: Mutex<Vec<Sound>>,
    failing_saves: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl MemorySoundStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with a record without recording history.
    pub fn insert(&self, sound: Sound) {
        lock(&self.sounds).insert(sound.id, sound);
    }

    /// Current record, if present.
    pub fn get(&self, id: SoundId) -> Option<Sound> {
        lock(&self.sounds).get(&id).cloned()
    }

    /// Every record saved for `id`, oldest first.
    pub fn history(&self, id: SoundId) -> Vec<Sound> {
        lock(&self.history)
            .iter()
            .filter(|s| s.id == id)
            .cloned()
            .collect()
    }

    /// Make the next `count` saves fail with a retryable error.
    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl SoundStore for MemorySoundStore {
    async fn load(&self, id: SoundId) -> StoreResult<Sound> {
        self.get(id).ok_or(StoreError::NotFound(id))
    }

    async fn save(&self, sound: &Sound) -> StoreResult<()> {
        let injected = self
            .failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::unavailable("injected save failure"));
        }

        lock(&self.sounds).insert(sound.id, sound.clone());
        lock(&self.history).push(sound.clone());
        Ok(())
    }
}

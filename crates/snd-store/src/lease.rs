//! Per-sound run leases.
//!
//! At-least-once delivery means a job can be redelivered while the first
//! run is still in flight. A run only starts once it holds the lease for
//! its sound id. The holder renews it while the run is in flight and it
//! expires on its own if the holder dies, so a redelivered job can take
//! over a crashed run.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::Script;
use tracing::debug;

use snd_models::SoundId;

use crate::error::StoreResult;
use crate::metrics::record_lease;

const LEASE_KEY_PREFIX: &str = "snd:lease";

/// Proof of holding the lease for one sound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseToken {
    pub sound_id: SoundId,
    token: String,
}

impl LeaseToken {
    fn new(sound_id: SoundId) -> Self {
        Self {
            sound_id,
            token: format!("worker:{}", uuid::Uuid::new_v4()),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Mutual exclusion for processing runs of the same sound.
#[async_trait]
pub trait RunLease: Send + Sync {
    /// Try to take the lease. `None` means another run holds it.
    async fn try_acquire(&self, sound_id: SoundId) -> StoreResult<Option<LeaseToken>>;

    /// Push the expiry of a held lease back by a full TTL.
    ///
    /// `false` means the lease expired or was taken over.
    async fn renew(&self, lease: &LeaseToken) -> StoreResult<bool>;

    /// Whether some run currently holds the lease for `sound_id`.
    async fn is_active(&self, sound_id: SoundId) -> StoreResult<bool>;

    /// Give the lease back. Releasing a lease that expired or was taken over is a no-op.
    async fn release(&self, lease: &LeaseToken) -> StoreResult<()>;
}

/// Redis lease: `SET key token NX PX ttl`, released by a token-checked delete.
pub struct RedisRunLease {
    client: redis::Client,
    ttl: Duration,
}

impl RedisRunLease {
    pub fn new(redis_url: &str, ttl: Duration) -> StoreResult<Self> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
            ttl,
        })
    }

    pub fn key(sound_id: SoundId) -> String {
        format!("{}:{}", LEASE_KEY_PREFIX, sound_id)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[async_trait]
impl RunLease for RedisRunLease {
    async fn try_acquire(&self, sound_id: SoundId) -> StoreResult<Option<LeaseToken>> {
        let lease = LeaseToken::new(sound_id);
        let key = Self::key(sound_id);
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // SET NX PX (only if not exists, with expiry)
        let result: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(lease.token())
            .arg("NX")
            .arg("PX")
            .arg(self.ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;

        let acquired = result.is_some();
        record_lease(acquired);
        debug!(lease_key = %key, acquired = acquired, "Run lease acquisition attempt");

        Ok(acquired.then_some(lease))
    }

    async fn renew(&self, lease: &LeaseToken) -> StoreResult<bool> {
        let key = Self::key(lease.sound_id);
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let script = Script::new(
            r#"
            if redis.call('GET', KEYS[1]) == ARGV[1] then
                return redis.call('PEXPIRE', KEYS[1], ARGV[2])
            else
                return 0
            end
            "#,
        );
        let renewed: i32 = script
            .key(&key)
            .arg(lease.token())
            .arg(self.ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;

        debug!(lease_key = %key, renewed = renewed == 1, "Run lease renewal");
        Ok(renewed == 1)
    }

    async fn is_active(&self, sound_id: SoundId) -> StoreResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let exists: bool = redis::cmd("EXISTS")
            .arg(Self::key(sound_id))
            .query_async(&mut conn)
            .await?;
        Ok(exists)
    }

    async fn release(&self, lease: &LeaseToken) -> StoreResult<()> {
        let key = Self::key(lease.sound_id);
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let script = Script::new(
            r#"
            if redis.call('GET', KEYS[1]) == ARGV[1] then
                return redis.call('DEL', KEYS[1])
            else
                return 0
            end
            "#,
        );
        let deleted: i32 = script
            .key(&key)
            .arg(lease.token())
            .invoke_async(&mut conn)
            .await?;

        debug!(lease_key = %key, released = deleted == 1, "Run lease released");
        Ok(())
    }
}

/// In-process lease map. Leases never expire unless a TTL is set.
#[derive(Debug, Default)]
pub struct MemoryRunLease {
    ttl: Option<Duration>,
    held: Mutex<HashMap<SoundId, (String, Option<Instant>)>>,
}

impl MemoryRunLease {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leases that expire `ttl` after being taken or last renewed.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            held: Mutex::default(),
        }
    }

    fn expiry(&self) -> Option<Instant> {
        self.ttl.map(|ttl| Instant::now() + ttl)
    }

    /// Current holder's token, dropping an expired entry.
    fn holder(
        held: &mut HashMap<SoundId, (String, Option<Instant>)>,
        sound_id: SoundId,
    ) -> Option<&String> {
        let expired = matches!(
            held.get(&sound_id),
            Some((_, Some(expires_at))) if *expires_at <= Instant::now()
        );
        if expired {
            held.remove(&sound_id);
        }
        held.get(&sound_id).map(|(token, _)| token)
    }

    pub fn is_held(&self, sound_id: SoundId) -> bool {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        Self::holder(&mut held, sound_id).is_some()
    }
}

#[async_trait]
impl RunLease for MemoryRunLease {
    async fn try_acquire(&self, sound_id: SoundId) -> StoreResult<Option<LeaseToken>> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if Self::holder(&mut held, sound_id).is_some() {
            record_lease(false);
            return Ok(None);
        }
        let lease = LeaseToken::new(sound_id);
        held.insert(sound_id, (lease.token.clone(), self.expiry()));
        record_lease(true);
        Ok(Some(lease))
    }

    async fn renew(&self, lease: &LeaseToken) -> StoreResult<bool> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if Self::holder(&mut held, lease.sound_id) != Some(&lease.token) {
            return Ok(false);
        }
        held.insert(lease.sound_id, (lease.token.clone(), self.expiry()));
        Ok(true)
    }

    async fn is_active(&self, sound_id: SoundId) -> StoreResult<bool> {
        Ok(self.is_held(sound_id))
    }

    async fn release(&self, lease: &LeaseToken) -> StoreResult<()> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if Self::holder(&mut held, lease.sound_id) == Some(&lease.token) {
            held.remove(&lease.sound_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_lease_excludes_second_holder() {
        let leases = MemoryRunLease::new();
        let first = leases.try_acquire(SoundId(42)).await.unwrap().unwrap();
        assert!(leases.try_acquire(SoundId(42)).await.unwrap().is_none());

        // Other sounds are independent
        assert!(leases.try_acquire(SoundId(43)).await.unwrap().is_some());

        leases.release(&first).await.unwrap();
        assert!(!leases.is_held(SoundId(42)));
        assert!(leases.try_acquire(SoundId(42)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stale_token_does_not_release() {
        let leases = MemoryRunLease::new();
        let stale = LeaseToken::new(SoundId(1));
        let _current = leases.try_acquire(SoundId(1)).await.unwrap().unwrap();

        leases.release(&stale).await.unwrap();
        assert!(leases.is_held(SoundId(1)));
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_taken_over() {
        let leases = MemoryRunLease::with_ttl(Duration::from_millis(20));
        let dead = leases.try_acquire(SoundId(7)).await.unwrap().unwrap();
        assert!(leases.is_active(SoundId(7)).await.unwrap());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!leases.is_active(SoundId(7)).await.unwrap());

        let current = leases.try_acquire(SoundId(7)).await.unwrap().unwrap();
        // The old holder can neither renew nor release the new lease
        assert!(!leases.renew(&dead).await.unwrap());
        leases.release(&dead).await.unwrap();
        assert!(leases.is_held(SoundId(7)));
        assert!(leases.renew(&current).await.unwrap());
    }

    #[tokio::test]
    async fn test_renewal_extends_expiry() {
        let leases = MemoryRunLease::with_ttl(Duration::from_millis(60));
        let lease = leases.try_acquire(SoundId(8)).await.unwrap().unwrap();

        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(25)).await;
            assert!(leases.renew(&lease).await.unwrap());
        }
        assert!(leases.try_acquire(SoundId(8)).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_redis_lease_lifecycle() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into());
        let leases = RedisRunLease::new(&url, Duration::from_secs(5)).unwrap();
        let id = SoundId(9_999_001);

        let lease = leases.try_acquire(id).await.unwrap().unwrap();
        assert!(leases.is_active(id).await.unwrap());
        assert!(leases.renew(&lease).await.unwrap());
        leases.release(&lease).await.unwrap();
        assert!(!leases.is_active(id).await.unwrap());
        assert!(!leases.renew(&lease).await.unwrap());
    }

    #[test]
    fn test_redis_lease_key() {
        assert_eq!(RedisRunLease::key(SoundId(42)), "snd:lease:42");
    }
}

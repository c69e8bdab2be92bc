//! Operator tool: queue sounds for (re)processing.
//!
//! ```text
//! sound-submit <sound_id>...
//! ```
//!
//! A sound stuck in `processing` is only re-queued once its run lease has
//! expired.

use std::sync::Arc;

use anyhow::Context;

use snd_models::SoundId;
use snd_queue::JobQueue;
use snd_store::{RedisRunLease, RedisSoundStore};
use snd_worker::{SoundDispatcher, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let ids = std::env::args()
        .skip(1)
        .map(|arg| {
            arg.parse::<u64>()
                .map(SoundId)
                .with_context(|| format!("invalid sound id '{}'", arg))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    if ids.is_empty() {
        anyhow::bail!("usage: sound-submit <sound_id>...");
    }

    let queue = JobQueue::from_env().context("failed to create job queue")?;
    queue.init().await.context("failed to initialise job queue")?;
    let store = RedisSoundStore::new(&queue.config().redis_url)
        .context("failed to create sound store")?;

    let lease = RedisRunLease::new(&queue.config().redis_url, WorkerConfig::from_env().lease_ttl)
        .context("failed to create run lease")?;

    let dispatcher =
        SoundDispatcher::new(Arc::new(store), Arc::new(queue)).with_lease(Arc::new(lease));

    let mut failures = 0usize;
    for id in ids {
        match dispatcher.submit_id(id).await {
            Ok(sound) => println!("sound-submit: {} {}", id, sound.processing_state),
            Err(e) => {
                eprintln!("sound-submit: {} not queued: {}", id, e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} sound(s) could not be queued", failures);
    }
    Ok(())
}

//! Sound processing worker binary.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use snd_media::{ExtractorAnalyzer, FfmpegAudioProcessor, NoopAnalyzer, SoundAnalyzer};
use snd_queue::JobQueue;
use snd_store::{RedisRunLease, RedisSoundStore};
use snd_worker::metrics::install_exporter;
use snd_worker::{JobExecutor, LocationResolver, SoundProcessor, TranscodingPipeline, WorkerConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("snd=info".parse().expect("static directive"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting snd-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Ok(addr) = std::env::var("METRICS_ADDR") {
        match addr.parse() {
            Ok(addr) => match install_exporter(addr) {
                Ok(()) => info!("Serving metrics on {}", addr),
                Err(e) => warn!("Metrics disabled: {}", e),
            },
            Err(e) => warn!("Invalid METRICS_ADDR '{}': {}", addr, e),
        }
    }

    let queue = match JobQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };
    let redis_url = queue.config().redis_url.clone();

    let store = match RedisSoundStore::new(&redis_url) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create sound store: {}", e);
            std::process::exit(1);
        }
    };
    let visibility_timeout = queue.config().visibility_timeout;
    let lease_ttl = config.lease_ttl_within(visibility_timeout);
    if lease_ttl < config.lease_ttl {
        warn!(
            "Lease TTL {:?} exceeds the queue visibility timeout, using {:?}",
            config.lease_ttl, lease_ttl
        );
    }
    let lease = match RedisRunLease::new(&redis_url, lease_ttl) {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to create run lease: {}", e);
            std::process::exit(1);
        }
    };

    let analyzer: Arc<dyn SoundAnalyzer> = match &config.analyzer_path {
        Some(program) => {
            info!("Analysis enabled with {}", program.display());
            Arc::new(ExtractorAnalyzer::new(program, config.tool_timeout))
        }
        None => {
            info!("ANALYZER_PATH not set, analysis will be skipped");
            Arc::new(NoopAnalyzer)
        }
    };

    let pipeline = TranscodingPipeline::new(
        Arc::new(FfmpegAudioProcessor::with_timeout(config.tool_timeout.as_secs())),
        analyzer,
        &config.work_dir,
    );
    if let Err(e) = pipeline.prepare().await {
        error!("Failed to create work dir {}: {}", config.work_dir.display(), e);
        std::process::exit(1);
    }

    let processor = SoundProcessor::new(
        Arc::new(store),
        Arc::new(lease),
        LocationResolver::new(&config.data_root, &config.legacy_root),
        pipeline,
    )
    .with_lease_renewal(WorkerConfig::lease_renewal_interval(lease_ttl));

    let executor = Arc::new(JobExecutor::new(config, queue, processor));

    // Setup signal handler
    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent runs
    pub max_concurrent_jobs: usize,
    /// Root of the canonical storage tier
    pub data_root: PathBuf,
    /// Recognised legacy storage root; sources elsewhere are rejected
    pub legacy_root: PathBuf,
    /// Work directory for temporary files
    pub work_dir: PathBuf,
    /// Per-sound run lease TTL, renewed while the run is in flight
    pub lease_ttl: Duration,
    /// Timeout applied to each ffmpeg and analyzer invocation
    pub tool_timeout: Duration,
    /// External feature extractor; `None` disables analysis
    pub analyzer_path: Option<PathBuf>,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// How often the worker scans for jobs left pending by crashed workers
    pub claim_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            data_root: PathBuf::from("/var/lib/sounds"),
            legacy_root: PathBuf::from("/mnt/freesound-data/"),
            work_dir: PathBuf::from("/tmp/snd"),
            lease_ttl: Duration::from_secs(300), // 5 minutes
            tool_timeout: Duration::from_secs(600),
            analyzer_path: None,
            shutdown_timeout: Duration::from_secs(60),
            claim_interval: Duration::from_secs(30),
        }
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            data_root: std::env::var("SOUNDS_DATA_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_root),
            legacy_root: std::env::var("SOUNDS_LEGACY_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.legacy_root),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            lease_ttl: env_secs("WORKER_LEASE_TTL_SECS").unwrap_or(defaults.lease_ttl),
            tool_timeout: env_secs("WORKER_FFMPEG_TIMEOUT_SECS").unwrap_or(defaults.tool_timeout),
            analyzer_path: std::env::var("ANALYZER_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            shutdown_timeout: env_secs("WORKER_SHUTDOWN_TIMEOUT")
                .unwrap_or(defaults.shutdown_timeout),
            claim_interval: defaults.claim_interval,
        }
    }

    /// Lease TTL capped at the queue's visibility timeout, so a crashed
    /// run's lease is gone by the time its job is redelivered.
    pub fn lease_ttl_within(&self, visibility_timeout: Duration) -> Duration {
        self.lease_ttl.min(visibility_timeout)
    }

    /// How often a running job renews its lease for a given TTL.
    pub fn lease_renewal_interval(lease_ttl: Duration) -> Duration {
        lease_ttl / 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.legacy_root, PathBuf::from("/mnt/freesound-data/"));
        assert!(config.analyzer_path.is_none());
    }

    #[test]
    fn test_lease_expires_before_redelivery() {
        let mut config = WorkerConfig::default();
        let visibility = Duration::from_secs(900);
        assert!(config.lease_ttl_within(visibility) <= visibility);

        config.lease_ttl = Duration::from_secs(3600);
        assert_eq!(config.lease_ttl_within(visibility), visibility);

        let ttl = config.lease_ttl_within(visibility);
        assert!(WorkerConfig::lease_renewal_interval(ttl) < ttl);
    }
}

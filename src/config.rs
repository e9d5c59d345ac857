use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::downloader::DownloadOptions;
use crate::services::prober::ProbeOptions;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub port: u16,

    // Persistence
    pub snapshot_path: PathBuf,
    pub download_dir: PathBuf,

    // Parsing
    pub parse_progress_every: usize,

    // Probing
    pub probe_concurrency: usize,
    pub probe_connect_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    pub probe_slow_threshold_ms: u64,
    pub probe_grace_ms: u64,

    // Download
    pub download_timeout_ms: u64,
    pub download_connect_timeout_ms: u64,

    // Misc
    pub user_agent: String,
}

/// Read an env var and parse it, falling back to `default` when unset or invalid
fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            // Server
            port: env_or("PORT", 3001),

            // Persistence
            snapshot_path: env::var("SNAPSHOT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("last_playlist.json")),
            download_dir: env::var("DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir().join("tv_ip_playlists")),

            // Parsing
            parse_progress_every: env_or("PARSE_PROGRESS_EVERY", 10),

            // Probing
            probe_concurrency: env_or("PROBE_CONCURRENCY", 10),
            probe_connect_timeout_ms: env_or("PROBE_CONNECT_TIMEOUT_MS", 3_000),
            probe_timeout_ms: env_or("PROBE_TIMEOUT_MS", 5_000),
            probe_slow_threshold_ms: env_or("PROBE_SLOW_THRESHOLD_MS", 2_000),
            probe_grace_ms: env_or("PROBE_GRACE_MS", 5_000),

            // Download
            download_timeout_ms: env_or("DOWNLOAD_TIMEOUT_MS", 30_000),
            download_connect_timeout_ms: env_or("DOWNLOAD_CONNECT_TIMEOUT_MS", 10_000),

            // Use VLC user agent to avoid IPTV server blocks
            user_agent: env::var("USER_AGENT")
                .unwrap_or_else(|_| "VLC/3.0.20 LibVLC/3.0.20".to_string()),
        }
    }

    pub fn probe_options(&self) -> ProbeOptions {
        ProbeOptions {
            concurrency: self.probe_concurrency.max(1),
            connect_timeout: Duration::from_millis(self.probe_connect_timeout_ms),
            timeout: Duration::from_millis(self.probe_timeout_ms),
            slow_threshold: Duration::from_millis(self.probe_slow_threshold_ms),
            grace: Duration::from_millis(self.probe_grace_ms),
            user_agent: self.user_agent.clone(),
        }
    }

    pub fn download_options(&self) -> DownloadOptions {
        DownloadOptions {
            download_dir: self.download_dir.clone(),
            timeout: Duration::from_millis(self.download_timeout_ms),
            connect_timeout: Duration::from_millis(self.download_connect_timeout_ms),
            user_agent: self.user_agent.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

//! Configuration management for the Monster Siren archiver.
//!
//! Configuration values come from three places, in order of priority:
//! 1. Command-line flags (applied by the binary on top of [`Config`])
//! 2. Environment variables, including a `.env` file in the local data directory
//! 3. Application defaults
//!
//! Unlike credentials, every value here has a sensible default, so a missing or
//! malformed variable never stops the program.

use std::{env, path::PathBuf, str::FromStr, time::Duration};

pub const DEFAULT_OUTPUT_DIR: &str = "./MonsterSiren";
pub const DEFAULT_API_URL: &str = "https://monster-siren.hypergryph.com/api";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CACHE_TTL_HOURS: i64 = 24;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

pub const ALBUM_CACHE_FILE: &str = "albums_cache.json";
pub const COMPLETED_ALBUMS_FILE: &str = "completed_albums.json";

/// Loads environment variables from a `.env` file in the local data directory.
///
/// The file lives at:
/// - Linux: `~/.local/share/msrcli/.env`
/// - macOS: `~/Library/Application Support/msrcli/.env`
/// - Windows: `%LOCALAPPDATA%/msrcli/.env`
///
/// A missing file is not an error; a file that exists but cannot be parsed is.
pub async fn load_env() -> Result<(), String> {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("msrcli/.env");
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent)
            .await
            .map_err(|e| e.to_string())?;
    }

    if !path.is_file() {
        return Ok(());
    }

    dotenv::from_path(&path)
        .map(|_| ())
        .map_err(|e| format!("cannot load {}: {}", path.display(), e))
}

/// Runtime options for a download or listing run.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub output_dir: PathBuf,
    pub workers: usize,
    pub http_timeout: Duration,
    pub album_cache_path: Option<PathBuf>,
    /// Hours a cached catalog counts as fresh; zero or less disables the TTL.
    pub cache_ttl_hours: i64,
    pub refresh_albums: bool,
    pub retry_attempts: u32,
    pub albums: Option<String>,
    pub api_url: String,
    pub ffmpeg: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            workers: default_workers(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            album_cache_path: None,
            cache_ttl_hours: DEFAULT_CACHE_TTL_HOURS,
            refresh_albums: false,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            albums: None,
            api_url: DEFAULT_API_URL.to_string(),
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}

impl Config {
    /// Builds a configuration from `MSR_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            output_dir: env::var("MSR_OUTPUT_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            workers: env_parse("MSR_WORKERS").unwrap_or(defaults.workers),
            http_timeout: env_parse("MSR_HTTP_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
            album_cache_path: env::var("MSR_ALBUM_CACHE")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            cache_ttl_hours: env_parse("MSR_CACHE_TTL_HOURS").unwrap_or(defaults.cache_ttl_hours),
            refresh_albums: false,
            retry_attempts: env_parse("MSR_RETRY_ATTEMPTS").unwrap_or(defaults.retry_attempts),
            albums: None,
            api_url: env::var("MSR_API_URL").unwrap_or(defaults.api_url),
            ffmpeg: env::var("MSR_FFMPEG").unwrap_or(defaults.ffmpeg),
        }
        .normalized()
    }

    /// Coerces counts below one up to one.
    pub fn normalized(mut self) -> Self {
        self.workers = self.workers.max(1);
        self.retry_attempts = self.retry_attempts.max(1);
        self
    }

    /// Album cache location, defaulting to a file inside the output directory.
    pub fn album_cache_path(&self) -> PathBuf {
        match &self.album_cache_path {
            Some(path) if !path.as_os_str().is_empty() => path.clone(),
            _ => self.output_dir.join(ALBUM_CACHE_FILE),
        }
    }

    pub fn completed_albums_path(&self) -> PathBuf {
        self.output_dir.join(COMPLETED_ALBUMS_FILE)
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::try_hours(self.cache_ttl_hours).unwrap_or(chrono::Duration::MAX)
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(2)
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

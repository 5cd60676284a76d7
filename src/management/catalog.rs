use std::{
    fmt, io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{logging::SharedLogger, management::persist, types::Album};

#[derive(Debug)]
pub enum CacheError {
    IoError(PathBuf, io::Error),
    SerdeError(PathBuf, serde_json::Error),
    TimestampError(PathBuf, chrono::ParseError),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::IoError(path, e) => write!(f, "album cache {}: {}", path.display(), e),
            CacheError::SerdeError(path, e) => {
                write!(f, "parse album cache {}: {}", path.display(), e)
            }
            CacheError::TimestampError(path, e) => {
                write!(f, "parse fetchedAt in album cache {}: {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::IoError(_, e) => Some(e),
            CacheError::SerdeError(_, e) => Some(e),
            CacheError::TimestampError(_, e) => Some(e),
        }
    }
}

/// A persisted copy of the remote album list.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSnapshot {
    /// `None` for snapshots without a timestamp; those are never fresh.
    pub fetched_at: Option<DateTime<Utc>>,
    pub albums: Vec<Album>,
}

#[derive(Serialize, Deserialize)]
struct Payload {
    #[serde(rename = "fetchedAt", default, skip_serializing_if = "String::is_empty")]
    fetched_at: String,
    #[serde(default)]
    albums: Vec<Album>,
}

/// Album catalog cache backed by a single JSON file.
pub struct CatalogCache {
    path: PathBuf,
    lock: Mutex<()>,
    logger: SharedLogger,
}

impl CatalogCache {
    /// Creates a cache handle; nothing is read until [`CatalogCache::load`].
    ///
    /// # Arguments
    ///
    /// * `path` - Location of the JSON cache file
    /// * `logger` - Receives load and save notices
    pub fn new(path: impl Into<PathBuf>, logger: SharedLogger) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            logger,
        }
    }

    /// # Returns
    ///
    /// The location of the cache file, whether or not it exists yet.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the snapshot.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when the cache file does not exist.
    ///
    /// # Errors
    ///
    /// Unreadable files, malformed JSON and unparsable `fetchedAt` values.
    pub async fn load(&self) -> Result<Option<CacheSnapshot>, CacheError> {
        let _guard = self.lock.lock().await;

        let content = match async_fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::IoError(self.path.clone(), e)),
        };

        let payload: Payload = serde_json::from_str(&content)
            .map_err(|e| CacheError::SerdeError(self.path.clone(), e))?;

        let fetched_at = if payload.fetched_at.is_empty() {
            self.logger.warn(&format!(
                "Album cache {} has no timestamp; treating it as stale",
                self.path.display()
            ));
            None
        } else {
            let parsed = DateTime::parse_from_rfc3339(&payload.fetched_at)
                .map_err(|e| CacheError::TimestampError(self.path.clone(), e))?;
            Some(parsed.with_timezone(&Utc))
        };

        Ok(Some(CacheSnapshot {
            fetched_at,
            albums: payload.albums,
        }))
    }

    /// Atomically replaces the snapshot, stamping it with the current time.
    pub async fn save(&self, albums: &[Album]) -> Result<(), CacheError> {
        let payload = Payload {
            fetched_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            albums: albums.to_vec(),
        };
        let json = serde_json::to_vec_pretty(&payload)
            .map_err(|e| CacheError::SerdeError(self.path.clone(), e))?;

        let _guard = self.lock.lock().await;
        persist::write_atomic(&self.path, &json)
            .await
            .map_err(|e| CacheError::IoError(self.path.clone(), e))
    }
}

/// Whether a snapshot fetched at `fetched_at` may still be used at `now`.
///
/// A TTL of zero or less disables expiry. Snapshots without a timestamp are
/// stale. A timestamp in the future (clock skew) counts as fresh.
pub fn is_fresh(fetched_at: Option<DateTime<Utc>>, ttl: Duration, now: DateTime<Utc>) -> bool {
    if ttl <= Duration::zero() {
        return true;
    }

    let Some(fetched_at) = fetched_at else {
        return false;
    };

    let elapsed = now.signed_duration_since(fetched_at);
    if elapsed < Duration::zero() {
        return true;
    }
    elapsed <= ttl
}

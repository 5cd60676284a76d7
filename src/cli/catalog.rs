use chrono::{Local, Utc};
use tokio_util::sync::CancellationToken;

use crate::{
    engine::{RetryError, RetryPolicy},
    logging::SharedLogger,
    management::{CacheSnapshot, CatalogCache, is_fresh},
    siren::{ApiError, Catalog},
    types::Album,
    utils,
};

/// How the album catalog should be resolved.
#[derive(Debug, Clone, Copy)]
pub struct CatalogPolicy {
    pub refresh: bool,
    pub ttl: chrono::Duration,
}

/// Returns the album catalog, preferring a fresh cache over the network.
///
/// A failed network fetch falls back to any cached snapshot regardless of its
/// age. A successful fetch always overwrites the cache; failing to write it is
/// only a warning.
pub async fn load_albums<C: Catalog>(
    policy: CatalogPolicy,
    logger: &SharedLogger,
    catalog: &C,
    cache: &CatalogCache,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<Vec<Album>, RetryError<ApiError>> {
    let cached: Option<CacheSnapshot> = match cache.load().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            logger.warn(&format!("Read album cache failed: {}", e));
            None
        }
    };

    if let Some(snapshot) = &cached {
        if !policy.refresh && is_fresh(snapshot.fetched_at, policy.ttl, Utc::now()) {
            logger.info(&format!(
                "Loaded {} albums from cache: {}",
                snapshot.albums.len(),
                cache.path().display()
            ));
            if let Some(fetched_at) = snapshot.fetched_at {
                logger.info(&format!(
                    "Album cache timestamp: {}",
                    fetched_at.with_timezone(&Local).to_rfc3339()
                ));
            }
            return Ok(snapshot.albums.clone());
        }
    }

    logger.info("Fetching album catalog from API");
    let fetched = retry
        .run(cancel, "Fetch albums", || catalog.albums())
        .await;

    let mut albums = match fetched {
        Ok(albums) => albums,
        Err(e) => match cached {
            Some(snapshot) if !e.is_cancelled() => {
                logger.warn(&format!(
                    "Fetch albums failed ({}); using cached catalog with {} albums",
                    e,
                    snapshot.albums.len()
                ));
                return Ok(snapshot.albums);
            }
            _ => return Err(e),
        },
    };

    utils::remove_duplicate_albums(&mut albums);
    logger.info(&format!("Fetched {} albums from API", albums.len()));

    match cache.save(&albums).await {
        Ok(()) => logger.info(&format!("Updated album cache: {}", cache.path().display())),
        Err(e) => logger.warn(&format!("Persist album cache failed: {}", e)),
    }

    Ok(albums)
}

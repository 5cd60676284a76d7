use std::{collections::HashSet, sync::Arc};

use tabled::Table;
use tokio_util::sync::CancellationToken;

use crate::{
    Res,
    cli::{
        catalog::{CatalogPolicy, load_albums},
        download::http_client,
    },
    config::Config,
    engine::RetryPolicy,
    logging::SharedLogger,
    management::{CatalogCache, CompletionStore},
    siren::SirenClient,
    types::{Album, AlbumTableRow},
    utils,
};

/// Prints the album catalog as a table, optionally filtered by a search term
/// matched against name and CID.
pub async fn albums(
    config: &Config,
    logger: SharedLogger,
    cancel: CancellationToken,
    search: Option<String>,
) -> Res<()> {
    let client = http_client(config)?;
    let catalog = Arc::new(SirenClient::new(client, config.api_url.clone()));
    let cache = CatalogCache::new(config.album_cache_path(), logger.clone());
    let retry = RetryPolicy::new(config.retry_attempts).with_logger(logger.clone());

    let mut albums = load_albums(
        CatalogPolicy {
            refresh: config.refresh_albums,
            ttl: config.cache_ttl(),
        },
        &logger,
        catalog.as_ref(),
        &cache,
        &retry,
        &cancel,
    )
    .await
    .map_err(|e| format!("load albums: {}", e))?;

    // a missing state file just means nothing is archived yet
    let store = CompletionStore::open(config.completed_albums_path(), logger.clone()).await?;

    if let Some(term) = search {
        filter_albums(&mut albums, &term);
    }

    if albums.is_empty() {
        logger.warn("No albums match");
        return Ok(());
    }

    let completed = store.snapshot().await;
    let done = albums.iter().filter(|a| completed.contains(&a.name)).count();
    let mut rows = table_rows(albums, &completed);
    utils::sort_album_table_rows(&mut rows);

    let total = rows.len();
    println!("{}", Table::new(rows));
    logger.info(&format!("{} albums, {} archived", total, done));
    Ok(())
}

pub fn filter_albums(albums: &mut Vec<Album>, term: &str) {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return;
    }
    albums.retain(|a| {
        a.name.to_lowercase().contains(&term) || a.cid.to_lowercase().contains(&term)
    });
}

fn table_rows(albums: Vec<Album>, completed: &HashSet<String>) -> Vec<AlbumTableRow> {
    albums
        .into_iter()
        .map(|a| AlbumTableRow {
            done: if completed.contains(&a.name) { "✓" } else { "" }.to_string(),
            cid: a.cid,
            name: a.name,
            artists: a.artistes.join(", "),
        })
        .collect()
}

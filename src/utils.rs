use std::{cmp::Ordering, collections::HashSet, time::Duration};

use rand::{Rng, distr::Alphanumeric};

use crate::types::{Album, AlbumTableRow};

const UNSAFE_FILENAME_CHARS: [char; 10] = [':', '/', '<', '>', '\'', '\\', '|', '?', '*', ' '];

/// Normalizes a display name into a filesystem-safe file name.
pub fn make_valid(name: &str) -> String {
    name.chars()
        .map(|c| {
            if UNSAFE_FILENAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

pub fn random_suffix(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Human readable size in binary units, e.g. `1.5 MiB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: f64 = 1024.0;
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut idx = 0;
    while value >= UNIT && idx < UNITS.len() - 1 {
        value /= UNIT;
        idx += 1;
    }
    format!("{:.1} {}", value, UNITS[idx])
}

pub fn format_rate(bytes: u64, duration: Duration) -> String {
    if duration.is_zero() {
        return "n/a".to_string();
    }
    let per_second = (bytes as f64 / duration.as_secs_f64()) as u64;
    format!("{}/s", format_bytes(per_second))
}

pub fn remove_duplicate_albums(albums: &mut Vec<Album>) {
    let mut seen_ids = HashSet::new();
    albums.retain(|album| seen_ids.insert(album.cid.clone()));
}

/// Selects albums from a comma-separated list of names or CIDs.
///
/// `all` selects the whole catalog. Every other entry must resolve to exactly
/// one album; see [`resolve_album_query`].
pub fn select_albums_by_query(albums: &[Album], raw: &str) -> Result<Vec<Album>, String> {
    let queries: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .collect();
    if queries.is_empty() {
        return Err("no valid album query provided".to_string());
    }

    let mut seen = HashSet::new();
    let mut selected = Vec::with_capacity(queries.len());
    for query in queries {
        if query.eq_ignore_ascii_case("all") {
            return Ok(albums.to_vec());
        }

        let album = resolve_album_query(albums, query)?;
        if seen.insert(album.cid.clone()) {
            selected.push(album.clone());
        }
    }

    Ok(selected)
}

/// Resolves one query: exact CID or name match first, then substring match.
pub fn resolve_album_query<'a>(albums: &'a [Album], query: &str) -> Result<&'a Album, String> {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return Err("empty album query".to_string());
    }

    let exact: Vec<&Album> = albums
        .iter()
        .filter(|a| a.cid.to_lowercase() == q || a.name.to_lowercase() == q)
        .collect();
    match exact.as_slice() {
        [album] => return Ok(*album),
        [] => {}
        _ => {
            return Err(format!(
                "album query {:?} matched multiple albums exactly; use CID",
                query
            ));
        }
    }

    let contains: Vec<&Album> = albums
        .iter()
        .filter(|a| a.name.to_lowercase().contains(&q) || a.cid.to_lowercase().contains(&q))
        .collect();
    match contains.as_slice() {
        [album] => Ok(*album),
        [] => Err(format!("album query {:?} not found", query)),
        _ => {
            let mut labels: Vec<String> = contains
                .iter()
                .map(|a| format!("{} ({})", a.name, a.cid))
                .collect();
            labels.sort();
            Err(format!(
                "album query {:?} is ambiguous: {}",
                query,
                labels.join(", ")
            ))
        }
    }
}

pub fn sort_album_table_rows(rows: &mut Vec<AlbumTableRow>) {
    rows.sort_by(|a, b| match a.name.to_lowercase().cmp(&b.name.to_lowercase()) {
        Ordering::Equal => a.cid.cmp(&b.cid),
        other => other,
    });
}

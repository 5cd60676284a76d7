//! # Monster Siren API Module
//!
//! Thin client for the public Monster Siren Records REST API. Every endpoint
//! answers with a JSON envelope of the form `{"code": 0, "data": ...}`; only the
//! `data` member is used.
//!
//! ## Endpoints
//!
//! - `GET /albums` - every album with its cover URL and artists
//! - `GET /album/{cid}/detail` - album detail including its song list
//! - `GET /song/{cid}` - song detail with source and lyric URLs
//!
//! ## Testing
//!
//! The [`Catalog`] trait abstracts the three calls so that the catalog
//! resolution policy and album jobs can run against an in-memory fake.

use std::{fmt, future::Future};

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use crate::types::{Album, AlbumDetail, ApiResponse, Song, SongDetail};

#[derive(Debug)]
pub enum ApiError {
    Request { url: String, source: reqwest::Error },
    Status { url: String, status: StatusCode },
    Decode { url: String, source: reqwest::Error },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Request { url, source } => write!(f, "request {}: {}", url, source),
            ApiError::Status { url, status } => {
                write!(f, "request {}: unexpected status {}", url, status.as_u16())
            }
            ApiError::Decode { url, source } => write!(f, "decode {}: {}", url, source),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::Request { source, .. } | ApiError::Decode { source, .. } => Some(source),
            ApiError::Status { .. } => None,
        }
    }
}

/// Remote album catalog.
pub trait Catalog: Send + Sync {
    fn albums(&self) -> impl Future<Output = Result<Vec<Album>, ApiError>> + Send;

    fn album_songs(&self, album_cid: &str)
    -> impl Future<Output = Result<Vec<Song>, ApiError>> + Send;

    fn song_detail(&self, song_cid: &str)
    -> impl Future<Output = Result<SongDetail, ApiError>> + Send;
}

/// `reqwest`-based client for the Monster Siren API.
#[derive(Debug, Clone)]
pub struct SirenClient {
    client: Client,
    base_url: String,
}

impl SirenClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|source| ApiError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status { url, status });
        }

        let envelope = response
            .json::<ApiResponse<T>>()
            .await
            .map_err(|source| ApiError::Decode { url, source })?;
        Ok(envelope.data)
    }
}

impl Catalog for SirenClient {
    async fn albums(&self) -> Result<Vec<Album>, ApiError> {
        self.get_json("/albums").await
    }

    async fn album_songs(&self, album_cid: &str) -> Result<Vec<Song>, ApiError> {
        let detail: AlbumDetail = self
            .get_json(&format!("/album/{}/detail", album_cid))
            .await?;
        Ok(detail.songs)
    }

    async fn song_detail(&self, song_cid: &str) -> Result<SongDetail, ApiError> {
        self.get_json(&format!("/song/{}", song_cid)).await
    }
}

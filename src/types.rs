use serde::{Deserialize, Serialize};
use tabled::Tabled;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub cid: String,
    pub name: String,
    #[serde(default)]
    pub cover_url: String,
    #[serde(default)]
    pub artistes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub cid: String,
    pub name: String,
    #[serde(default)]
    pub artistes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongDetail {
    #[serde(default)]
    pub lyric_url: Option<String>,
    pub source_url: String,
}

impl SongDetail {
    /// Lyric location, if the song has one. Blank URLs count as missing.
    pub fn lyric(&self) -> Option<&str> {
        self.lyric_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumDetail {
    #[serde(default)]
    pub songs: Vec<Song>,
}

#[derive(Tabled)]
pub struct AlbumTableRow {
    pub done: String,
    pub cid: String,
    pub name: String,
    pub artists: String,
}

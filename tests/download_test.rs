use futures_util::future::BoxFuture;
use msrcli::cli::{AlbumJob, DownloadError, finalize_song, progress_logger};
use msrcli::engine::{
    ByteSource, ProgressSample, RetryPolicy, SourceProvider, SourceReader, Transfer,
    TransferError,
};
use msrcli::logging::{Level, Logger, NullLogger};
use msrcli::management::CompletionStore;
use msrcli::media::Ffmpeg;
use msrcli::siren::{ApiError, Catalog};
use msrcli::types::{Album, Song, SongDetail};
use reqwest::StatusCode;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct RecordingLogger {
    lines: Mutex<Vec<(Level, String)>>,
}

impl RecordingLogger {
    fn count(&self, level: Level) -> usize {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .count()
    }
}

impl Logger for RecordingLogger {
    fn log(&self, level: Level, message: &str) {
        self.lines.lock().unwrap().push((level, message.to_string()));
    }
}

struct StaticSource {
    body: Vec<u8>,
    content_type: String,
}

impl ByteSource for StaticSource {
    fn declared_length(&self) -> Option<u64> {
        Some(self.body.len() as u64)
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn open(self: Box<Self>) -> SourceReader {
        Box::pin(futures_util::io::Cursor::new(self.body))
    }
}

#[derive(Default)]
struct StaticProvider {
    bodies: HashMap<String, (String, Vec<u8>)>,
}

impl SourceProvider for StaticProvider {
    fn fetch<'a>(
        &'a self,
        locator: &'a str,
    ) -> BoxFuture<'a, Result<Box<dyn ByteSource>, TransferError>> {
        Box::pin(async move {
            let (content_type, body) = self.bodies.get(locator).cloned().ok_or_else(|| {
                TransferError::Status {
                    locator: locator.to_string(),
                    status: 404,
                }
            })?;
            Ok(Box::new(StaticSource { body, content_type }) as Box<dyn ByteSource>)
        })
    }
}

struct FakeCatalog {
    songs: Vec<Song>,
}

impl Catalog for FakeCatalog {
    async fn albums(&self) -> Result<Vec<Album>, ApiError> {
        Ok(Vec::new())
    }

    async fn album_songs(&self, _album_cid: &str) -> Result<Vec<Song>, ApiError> {
        Ok(self.songs.clone())
    }

    async fn song_detail(&self, song_cid: &str) -> Result<SongDetail, ApiError> {
        Err(ApiError::Status {
            url: format!("https://example.com/api/song/{}", song_cid),
            status: StatusCode::NOT_FOUND,
        })
    }
}

fn png_bytes() -> Vec<u8> {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(2, 2));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn album(cover_url: &str) -> Album {
    Album {
        cid: "1001".to_string(),
        name: "Test: Album".to_string(),
        cover_url: cover_url.to_string(),
        artistes: vec!["MSR".to_string()],
    }
}

async fn album_job(
    root: &Path,
    songs: Vec<Song>,
) -> (AlbumJob<FakeCatalog>, Arc<CompletionStore>) {
    let provider = StaticProvider {
        bodies: HashMap::from([(
            "mem://cover".to_string(),
            ("image/png".to_string(), png_bytes()),
        )]),
    };
    let store = Arc::new(
        CompletionStore::open(root.join("completed_albums.json"), NullLogger::shared())
            .await
            .unwrap(),
    );
    let job = AlbumJob::new(
        Arc::new(FakeCatalog { songs }),
        Transfer::new(Arc::new(provider), NullLogger::shared()),
        Arc::clone(&store),
        Ffmpeg::new("ffmpeg"),
        RetryPolicy::new(1),
        root,
        NullLogger::shared(),
    );
    (job, store)
}

#[tokio::test]
async fn test_album_without_songs_is_completed() {
    let dir = tempfile::tempdir().unwrap();
    let (job, store) = album_job(dir.path(), Vec::new()).await;
    let album = album("mem://cover");

    job.run(&CancellationToken::new(), &album).await.unwrap();

    let album_dir = dir.path().join("Test__Album");
    assert!(album_dir.join("cover.png").exists());
    assert!(!album_dir.join("cover.jpg").exists());
    assert!(store.is_completed("Test: Album").await);
}

#[tokio::test]
async fn test_completed_album_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let (job, store) = album_job(dir.path(), Vec::new()).await;
    store.mark_completed("Test: Album").await.unwrap();

    // the cover locator does not exist, so any work would fail
    job.run(&CancellationToken::new(), &album("mem://missing"))
        .await
        .unwrap();

    assert!(!dir.path().join("Test__Album").exists());
}

#[tokio::test]
async fn test_failing_song_is_reported_and_not_completed() {
    let dir = tempfile::tempdir().unwrap();
    let songs = vec![Song {
        cid: "s1".to_string(),
        name: "Broken Song".to_string(),
        artistes: Vec::new(),
    }];
    let (job, store) = album_job(dir.path(), songs).await;

    let failure = job
        .run(&CancellationToken::new(), &album(""))
        .await
        .unwrap_err();

    assert_eq!(failure.album, "Test: Album");
    assert_eq!(failure.step, "fetch song detail Broken Song");
    assert!(matches!(failure.cause, DownloadError::Api(_)));
    assert!(!failure.is_cancelled());
    assert!(!store.is_completed("Test: Album").await);
}

#[tokio::test]
async fn test_cancelled_album_reports_cancellation() {
    let dir = tempfile::tempdir().unwrap();
    let (job, store) = album_job(dir.path(), Vec::new()).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let failure = job.run(&cancel, &album("mem://cover")).await.unwrap_err();

    assert!(failure.is_cancelled());
    assert_eq!(failure.step, "download cover");
    assert!(!store.is_completed("Test: Album").await);
}

#[tokio::test]
async fn test_finalize_mpeg_renames_to_mp3() {
    let dir = tempfile::tempdir().unwrap();
    let wav = dir.path().join("Song.wav");
    std::fs::write(&wav, b"ID3").unwrap();

    let (path, ext) = finalize_song(&Ffmpeg::new("ffmpeg"), &wav, "audio/mpeg; charset=binary")
        .await
        .unwrap();

    assert_eq!(ext, ".mp3");
    assert_eq!(path, dir.path().join("Song.mp3"));
    assert!(!wav.exists());
    assert_eq!(std::fs::read(&path).unwrap(), b"ID3");
}

#[tokio::test]
async fn test_finalize_reports_missing_encoder() {
    let dir = tempfile::tempdir().unwrap();
    let wav = dir.path().join("Song.wav");
    std::fs::write(&wav, b"RIFF").unwrap();

    let err = finalize_song(
        &Ffmpeg::new("msrcli-test-no-such-binary"),
        &wav,
        "audio/wav",
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DownloadError::Media(_)));
    assert!(wav.exists());
}

#[test]
fn test_progress_logs_each_ten_percent_bucket() {
    let logger = Arc::new(RecordingLogger::default());
    let progress = progress_logger(logger.clone(), "song".to_string());

    for bytes in [0, 50, 150, 160, 250, 350, 450, 550, 650, 750, 850, 950, 1000] {
        progress(ProgressSample {
            bytes_written: bytes,
            total_bytes: Some(1000),
        });
    }
    // 0%, then one line per bucket from 10% up to 100%
    assert_eq!(logger.count(Level::Info), 11);

    // a retry restarts from zero and logs again
    progress(ProgressSample {
        bytes_written: 120,
        total_bytes: Some(1000),
    });
    assert_eq!(logger.count(Level::Info), 12);
}

#[test]
fn test_progress_logs_first_sample_below_ten_percent() {
    let logger = Arc::new(RecordingLogger::default());
    let progress = progress_logger(logger.clone(), "song".to_string());

    progress(ProgressSample {
        bytes_written: 50,
        total_bytes: Some(1000),
    });
    progress(ProgressSample {
        bytes_written: 80,
        total_bytes: Some(1000),
    });

    let lines = logger.lines.lock().unwrap();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].1.contains("5%"));
}

#[test]
fn test_progress_always_logs_completion() {
    let logger = Arc::new(RecordingLogger::default());
    let progress = progress_logger(logger.clone(), "song".to_string());

    // the throttled last chunk and the end-of-stream report both hit 100%
    for _ in 0..2 {
        progress(ProgressSample {
            bytes_written: 1000,
            total_bytes: Some(1000),
        });
    }
    assert_eq!(logger.count(Level::Info), 2);
}

#[test]
fn test_progress_unknown_total_is_time_throttled() {
    let logger = Arc::new(RecordingLogger::default());
    let progress = progress_logger(logger.clone(), "song".to_string());

    for bytes in [0, 100, 200, 300] {
        progress(ProgressSample {
            bytes_written: bytes,
            total_bytes: None,
        });
    }
    assert_eq!(logger.count(Level::Info), 1);
}

use std::{
    fmt, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::{
    Res,
    cli::catalog::{CatalogPolicy, load_albums},
    config::Config,
    engine::{
        Job, PoolError, ProgressFn, ProgressSample, RetryError, RetryPolicy, Transfer,
        TransferError, WorkerPool, job,
    },
    logging::SharedLogger,
    management::{CatalogCache, CompletionStore, StateError},
    media::{self, Ffmpeg, MediaError, MetadataInput},
    siren::{ApiError, Catalog, SirenClient},
    types::{Album, Song},
    utils,
};

/// Unknown-length downloads log at most this often.
const UNKNOWN_TOTAL_LOG_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub enum DownloadError {
    Cancelled,
    Api(ApiError),
    Transfer(TransferError),
    Media(MediaError),
    Io(PathBuf, io::Error),
    State(StateError),
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadError::Cancelled => write!(f, "operation cancelled"),
            DownloadError::Api(e) => write!(f, "{}", e),
            DownloadError::Transfer(e) => write!(f, "{}", e),
            DownloadError::Media(e) => write!(f, "{}", e),
            DownloadError::Io(path, e) => write!(f, "{}: {}", path.display(), e),
            DownloadError::State(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for DownloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DownloadError::Cancelled => None,
            DownloadError::Api(e) => Some(e),
            DownloadError::Transfer(e) => Some(e),
            DownloadError::Media(e) => Some(e),
            DownloadError::Io(_, e) => Some(e),
            DownloadError::State(e) => Some(e),
        }
    }
}

impl From<RetryError<ApiError>> for DownloadError {
    fn from(err: RetryError<ApiError>) -> Self {
        match err {
            RetryError::Cancelled => DownloadError::Cancelled,
            RetryError::Failed(e) => DownloadError::Api(e),
        }
    }
}

impl From<RetryError<TransferError>> for DownloadError {
    fn from(err: RetryError<TransferError>) -> Self {
        match err {
            RetryError::Cancelled | RetryError::Failed(TransferError::Cancelled) => {
                DownloadError::Cancelled
            }
            RetryError::Failed(e) => DownloadError::Transfer(e),
        }
    }
}

impl From<MediaError> for DownloadError {
    fn from(err: MediaError) -> Self {
        DownloadError::Media(err)
    }
}

impl From<StateError> for DownloadError {
    fn from(err: StateError) -> Self {
        DownloadError::State(err)
    }
}

/// One album that could not be archived.
#[derive(Debug)]
pub struct AlbumFailure {
    pub album: String,
    pub step: String,
    pub cause: DownloadError,
}

impl AlbumFailure {
    fn new(album: &Album, step: impl Into<String>, cause: impl Into<DownloadError>) -> Self {
        Self {
            album: album.name.clone(),
            step: step.into(),
            cause: cause.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.cause, DownloadError::Cancelled)
    }
}

impl fmt::Display for AlbumFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "album {:?}: {}: {}", self.album, self.step, self.cause)
    }
}

impl std::error::Error for AlbumFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// Everything an album job needs, shared by all workers.
pub struct AlbumJob<C> {
    catalog: Arc<C>,
    transfer: Transfer,
    store: Arc<CompletionStore>,
    ffmpeg: Ffmpeg,
    retry: RetryPolicy,
    output_dir: PathBuf,
    logger: SharedLogger,
}

impl<C: Catalog> AlbumJob<C> {
    /// Bundles the shared collaborators of an album job.
    ///
    /// # Arguments
    ///
    /// * `catalog` - Source of album songs and song details
    /// * `transfer` - Downloads covers, lyrics and audio
    /// * `store` - Completion records shared by every worker
    /// * `ffmpeg` - Encoder used for FLAC conversion and tagging
    /// * `retry` - Policy applied to each network step
    /// * `output_dir` - Root under which one directory per album is created
    /// * `logger` - Receives per-album and per-song progress
    pub fn new(
        catalog: Arc<C>,
        transfer: Transfer,
        store: Arc<CompletionStore>,
        ffmpeg: Ffmpeg,
        retry: RetryPolicy,
        output_dir: impl Into<PathBuf>,
        logger: SharedLogger,
    ) -> Self {
        Self {
            catalog,
            transfer,
            store,
            ffmpeg,
            retry,
            output_dir: output_dir.into(),
            logger,
        }
    }

    /// Archives one album: cover, every song with lyrics and tags, then marks it
    /// completed. Already completed albums are skipped.
    pub async fn run(&self, cancel: &CancellationToken, album: &Album) -> Result<(), AlbumFailure> {
        if self.store.is_completed(&album.name).await {
            self.logger
                .info(&format!("Skipping completed album: {}", album.name));
            return Ok(());
        }

        self.logger.info(&format!("Processing album: {}", album.name));

        let album_dir = self.output_dir.join(utils::make_valid(&album.name));
        if let Err(e) = async_fs::create_dir_all(&album_dir).await {
            let cause = DownloadError::Io(album_dir.clone(), e);
            return Err(AlbumFailure::new(album, "create album dir", cause));
        }

        let cover_path = self.fetch_cover(cancel, album, &album_dir).await?;

        let songs = self
            .retry
            .run(cancel, &format!("Fetch songs of {}", album.name), || {
                self.catalog.album_songs(&album.cid)
            })
            .await
            .map_err(|e| AlbumFailure::new(album, "fetch songs", e))?;

        if songs.is_empty() {
            self.logger
                .warn(&format!("Album {} has no songs", album.name));
        }

        for (idx, song) in songs.iter().enumerate() {
            self.process_song(cancel, album, &album_dir, cover_path.as_deref(), song, idx + 1)
                .await?;
        }

        self.store
            .mark_completed(&album.name)
            .await
            .map_err(|e| AlbumFailure::new(album, "mark completed", e))?;

        self.logger
            .success(&format!("Completed album: {} ({} songs)", album.name, songs.len()));
        Ok(())
    }

    async fn fetch_cover(
        &self,
        cancel: &CancellationToken,
        album: &Album,
        album_dir: &Path,
    ) -> Result<Option<PathBuf>, AlbumFailure> {
        if album.cover_url.trim().is_empty() {
            self.logger
                .warn(&format!("Album {} has no cover", album.name));
            return Ok(None);
        }

        let jpg_path = album_dir.join("cover.jpg");
        let png_path = album_dir.join("cover.png");

        self.retry
            .run(cancel, &format!("Download cover of {}", album.name), || {
                self.transfer.download(cancel, &album.cover_url, &jpg_path)
            })
            .await
            .map_err(|e| AlbumFailure::new(album, "download cover", e))?;

        media::convert_to_png(&jpg_path, &png_path)
            .await
            .map_err(|e| AlbumFailure::new(album, "convert cover", e))?;

        if let Err(e) = async_fs::remove_file(&jpg_path).await {
            self.logger
                .warn(&format!("Remove {} failed: {}", jpg_path.display(), e));
        }

        Ok(Some(png_path))
    }

    async fn process_song(
        &self,
        cancel: &CancellationToken,
        album: &Album,
        album_dir: &Path,
        cover_path: Option<&Path>,
        song: &Song,
        track_number: usize,
    ) -> Result<(), AlbumFailure> {
        let detail = self
            .retry
            .run(cancel, &format!("Fetch song {}", song.name), || {
                self.catalog.song_detail(&song.cid)
            })
            .await
            .map_err(|e| AlbumFailure::new(album, format!("fetch song detail {}", song.name), e))?;

        let base_name = utils::make_valid(&song.name);

        let lyric_path = match detail.lyric() {
            Some(lyric_url) => {
                let path = album_dir.join(format!("{}.lrc", base_name));
                self.retry
                    .run(cancel, &format!("Download lyric of {}", song.name), || {
                        self.transfer.download(cancel, lyric_url, &path)
                    })
                    .await
                    .map_err(|e| {
                        AlbumFailure::new(album, format!("download lyric {}", song.name), e)
                    })?;
                Some(path)
            }
            None => None,
        };

        let label = format!("{} / {:02}. {}", album.name, track_number, song.name);
        let wav_path = album_dir.join(format!("{}.wav", base_name));
        let progress = progress_logger(self.logger.clone(), label.clone());

        let outcome = self
            .retry
            .run(cancel, &format!("Download {}", label), || {
                self.transfer.download_with_progress(
                    cancel,
                    &detail.source_url,
                    &wav_path,
                    Some(Arc::clone(&progress)),
                )
            })
            .await
            .map_err(|e| AlbumFailure::new(album, format!("download song {}", song.name), e))?;

        self.logger.success(&format!(
            "Downloaded {} ({}, {})",
            label,
            utils::format_bytes(outcome.bytes_written),
            utils::format_rate(outcome.bytes_written, outcome.duration)
        ));

        let (file_path, file_type) = finalize_song(&self.ffmpeg, &wav_path, &outcome.content_type)
            .await
            .map_err(|e| AlbumFailure::new(album, format!("finalize song {}", song.name), e))?;

        let input = MetadataInput {
            file_path,
            file_type: file_type.to_string(),
            album: album.name.clone(),
            title: song.name.clone(),
            album_artists: album.artistes.clone(),
            artists: song.artistes.clone(),
            track_number,
            cover_path: cover_path.map(Path::to_path_buf),
            lyric_path,
        };
        self.ffmpeg
            .apply_metadata(&input)
            .await
            .map_err(|e| AlbumFailure::new(album, format!("write metadata {}", song.name), e))?;

        Ok(())
    }
}

/// Turns a downloaded `.wav` into its final file and returns the path and
/// extension.
///
/// MPEG audio only needs the right extension; everything else is encoded to
/// FLAC and the intermediate file is removed.
pub async fn finalize_song(
    ffmpeg: &Ffmpeg,
    wav_path: &Path,
    content_type: &str,
) -> Result<(PathBuf, &'static str), DownloadError> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if mime == "audio/mpeg" {
        let mp3_path = wav_path.with_extension("mp3");
        async_fs::rename(wav_path, &mp3_path)
            .await
            .map_err(|e| DownloadError::Io(mp3_path.clone(), e))?;
        return Ok((mp3_path, ".mp3"));
    }

    let flac_path = wav_path.with_extension("flac");
    ffmpeg.wav_to_flac(wav_path, &flac_path).await?;
    async_fs::remove_file(wav_path)
        .await
        .map_err(|e| DownloadError::Io(wav_path.to_path_buf(), e))?;
    Ok((flac_path, ".flac"))
}

#[derive(Default)]
struct ProgressState {
    last_bytes: u64,
    /// `None` until the first line for a known total was logged.
    last_bucket: Option<u64>,
    last_log: Option<Instant>,
}

/// Builds the per-song progress callback.
///
/// With a known total the first sample is logged, then every sample that enters
/// a new 10% bucket, and every sample at 100%. With an unknown total a line is
/// logged at most every two seconds.
/// The callback survives retries: a sample smaller than the previous one starts
/// over.
pub fn progress_logger(logger: SharedLogger, label: String) -> ProgressFn {
    let state = Mutex::new(ProgressState::default());

    Arc::new(move |sample: ProgressSample| {
        let Ok(mut state) = state.lock() else { return };

        if sample.bytes_written < state.last_bytes {
            *state = ProgressState::default();
        }
        state.last_bytes = sample.bytes_written;

        match sample.total_bytes.filter(|total| *total > 0) {
            Some(total) => {
                let percent = (sample.bytes_written.saturating_mul(100) / total).min(100);
                let bucket = percent / 10;
                let new_bucket = state.last_bucket.is_none_or(|last| bucket > last);
                if percent == 100 || new_bucket {
                    state.last_bucket = Some(bucket);
                    logger.info(&format!(
                        "{}: {}% ({}/{})",
                        label,
                        percent,
                        utils::format_bytes(sample.bytes_written),
                        utils::format_bytes(total)
                    ));
                }
            }
            None => {
                if sample.bytes_written == 0 {
                    return;
                }
                let due = state
                    .last_log
                    .is_none_or(|at| at.elapsed() >= UNKNOWN_TOTAL_LOG_INTERVAL);
                if due {
                    state.last_log = Some(Instant::now());
                    logger.info(&format!(
                        "{}: {}",
                        label,
                        utils::format_bytes(sample.bytes_written)
                    ));
                }
            }
        }
    })
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }
    pb
}

pub(crate) fn http_client(config: &Config) -> Res<Client> {
    Ok(Client::builder().timeout(config.http_timeout).build()?)
}

/// Resolves the catalog and archives every selected album on the worker pool.
///
/// Returns an error when any album failed or the run was cancelled.
pub async fn download(config: &Config, logger: SharedLogger, cancel: CancellationToken) -> Res<()> {
    let ffmpeg = Ffmpeg::new(config.ffmpeg.clone());
    ffmpeg.check().await?;

    async_fs::create_dir_all(&config.output_dir)
        .await
        .map_err(|e| format!("create output dir {}: {}", config.output_dir.display(), e))?;

    let store =
        Arc::new(CompletionStore::open(config.completed_albums_path(), logger.clone()).await?);

    let client = http_client(config)?;
    let catalog = Arc::new(SirenClient::new(client.clone(), config.api_url.clone()));
    let cache = CatalogCache::new(config.album_cache_path(), logger.clone());
    let retry = RetryPolicy::new(config.retry_attempts).with_logger(logger.clone());

    let pb = spinner("Resolving album catalog...");
    let albums = load_albums(
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
    .await;
    pb.finish_and_clear();
    let albums = albums.map_err(|e| format!("load albums: {}", e))?;

    let selected = match &config.albums {
        Some(raw) => utils::select_albums_by_query(&albums, raw)?,
        None => albums,
    };
    let completed = store.snapshot().await;
    let pending = selected
        .iter()
        .filter(|a| !completed.contains(&a.name))
        .count();
    logger.info(&format!(
        "Selected {} albums, {} pending, {} workers",
        selected.len(),
        pending,
        config.workers
    ));

    let album_job = Arc::new(AlbumJob::new(
        catalog,
        Transfer::http(client, logger.clone()),
        store,
        ffmpeg,
        retry,
        config.output_dir.clone(),
        logger.clone(),
    ));

    let jobs: Vec<Job<AlbumFailure>> = selected
        .into_iter()
        .map(|album| {
            let album_job = Arc::clone(&album_job);
            job(move |cancel: CancellationToken| async move {
                album_job.run(&cancel, &album).await
            })
        })
        .collect();

    let pool = WorkerPool::new(config.workers, logger.clone());
    match pool.run(&cancel, jobs).await {
        Ok(()) => {
            logger.success("All selected albums are archived");
            Ok(())
        }
        Err(err) => {
            report_failures(&logger, &err);
            Err(err.into())
        }
    }
}

fn report_failures(logger: &SharedLogger, err: &PoolError<AlbumFailure>) {
    let failed: Vec<&AlbumFailure> = err.failures.iter().filter(|f| !f.is_cancelled()).collect();
    if !failed.is_empty() {
        logger.error(&format!("{} album(s) failed:", failed.len()));
        for failure in failed {
            logger.error(&format!("  {}", failure));
        }
    }
    if err.is_cancelled() {
        logger.warn("Download cancelled; completed albums are kept");
    }
}

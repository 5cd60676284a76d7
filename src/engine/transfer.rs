use std::{
    fmt, io,
    path::{Path, PathBuf},
    pin::Pin,
    sync::Arc,
    time::{Duration, Instant},
};

use futures_util::{
    TryStreamExt,
    future::BoxFuture,
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
};
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::logging::SharedLogger;

/// Minimum wall time between two throttled progress callbacks.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(700);

/// Size of the copy buffer; memory use does not grow with the file size.
pub const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Bytes copied so far in one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSample {
    pub bytes_written: u64,
    /// `None` when the source did not declare a length.
    pub total_bytes: Option<u64>,
}

pub type ProgressFn = Arc<dyn Fn(ProgressSample) + Send + Sync>;

/// Result of one completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub content_type: String,
    pub bytes_written: u64,
    pub duration: Duration,
}

#[derive(Debug)]
pub enum TransferError {
    Request { locator: String, message: String },
    Status { locator: String, status: u16 },
    Read { locator: String, source: io::Error },
    Write { path: PathBuf, source: io::Error },
    Cancelled,
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::Request { locator, message } => {
                write!(f, "download {}: {}", locator, message)
            }
            TransferError::Status { locator, status } => {
                write!(f, "download {}: unexpected status {}", locator, status)
            }
            TransferError::Read { locator, source } => {
                write!(f, "read {}: {}", locator, source)
            }
            TransferError::Write { path, source } => {
                write!(f, "write file {}: {}", path.display(), source)
            }
            TransferError::Cancelled => write!(f, "download cancelled"),
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransferError::Read { source, .. } | TransferError::Write { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}

pub type SourceReader = Pin<Box<dyn AsyncRead + Send>>;

/// An opened remote resource that has not been read yet.
pub trait ByteSource: Send {
    fn declared_length(&self) -> Option<u64>;

    fn content_type(&self) -> &str;

    fn open(self: Box<Self>) -> SourceReader;
}

/// Resolves locators into byte sources.
pub trait SourceProvider: Send + Sync {
    fn fetch<'a>(
        &'a self,
        locator: &'a str,
    ) -> BoxFuture<'a, Result<Box<dyn ByteSource>, TransferError>>;
}

/// HTTP implementation backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: Client,
}

impl HttpProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

struct HttpSource {
    content_type: String,
    length: Option<u64>,
    response: reqwest::Response,
}

impl ByteSource for HttpSource {
    fn declared_length(&self) -> Option<u64> {
        self.length
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn open(self: Box<Self>) -> SourceReader {
        let stream = Box::pin(self.response.bytes_stream().map_err(io::Error::other));
        Box::pin(stream.into_async_read())
    }
}

impl SourceProvider for HttpProvider {
    fn fetch<'a>(
        &'a self,
        locator: &'a str,
    ) -> BoxFuture<'a, Result<Box<dyn ByteSource>, TransferError>> {
        Box::pin(async move {
            let response = self.client.get(locator).send().await.map_err(|e| {
                TransferError::Request {
                    locator: locator.to_string(),
                    message: e.to_string(),
                }
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(TransferError::Status {
                    locator: locator.to_string(),
                    status: status.as_u16(),
                });
            }

            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let length = response.content_length().filter(|len| *len > 0);

            Ok(Box::new(HttpSource {
                content_type,
                length,
                response,
            }) as Box<dyn ByteSource>)
        })
    }
}

/// Streams remote resources to disk with throttled progress reporting.
///
/// Partial files are left in place on failure: the caller usually retries
/// into the same path.
#[derive(Clone)]
pub struct Transfer {
    provider: Arc<dyn SourceProvider>,
    logger: SharedLogger,
}

impl Transfer {
    /// Creates a transfer that resolves locators through `provider`.
    ///
    /// # Arguments
    ///
    /// * `provider` - Source of the remote bytes; tests plug in an in-memory one
    /// * `logger` - Receives length mismatch warnings
    pub fn new(provider: Arc<dyn SourceProvider>, logger: SharedLogger) -> Self {
        Self { provider, logger }
    }

    /// Creates a transfer over HTTP using the shared `reqwest` client.
    pub fn http(client: Client, logger: SharedLogger) -> Self {
        Self::new(Arc::new(HttpProvider::new(client)), logger)
    }

    /// Downloads `locator` to `dst` without progress reporting.
    pub async fn download(
        &self,
        cancel: &CancellationToken,
        locator: &str,
        dst: &Path,
    ) -> Result<TransferOutcome, TransferError> {
        self.download_with_progress(cancel, locator, dst, None).await
    }

    /// Streams `locator` into `dst`, creating missing parent directories.
    ///
    /// The destination is truncated first. Bytes are copied in
    /// [`COPY_BUFFER_SIZE`] chunks while `progress` is called for the first
    /// chunk, then at most once per [`PROGRESS_INTERVAL`], and always once more
    /// after the last byte.
    ///
    /// # Arguments
    ///
    /// * `cancel` - Aborts the fetch or the in-flight read when fired
    /// * `locator` - Remote resource to download
    /// * `dst` - Destination file
    /// * `progress` - Optional callback receiving [`ProgressSample`]s
    ///
    /// # Returns
    ///
    /// The content type, the number of bytes written and the elapsed time.
    ///
    /// # Errors
    ///
    /// * [`TransferError::Status`] / [`TransferError::Request`] - the source
    ///   could not be opened
    /// * [`TransferError::Read`] / [`TransferError::Write`] - an I/O failure
    ///   mid-stream; the partial file is left in place
    /// * [`TransferError::Cancelled`] - `cancel` fired
    pub async fn download_with_progress(
        &self,
        cancel: &CancellationToken,
        locator: &str,
        dst: &Path,
        progress: Option<ProgressFn>,
    ) -> Result<TransferOutcome, TransferError> {
        let started = Instant::now();

        let source = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            source = self.provider.fetch(locator) => source?,
        };

        let write_err = |source: io::Error| TransferError::Write {
            path: dst.to_path_buf(),
            source,
        };

        if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
            async_fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let mut file = async_fs::File::create(dst).await.map_err(write_err)?;

        let total_bytes = source.declared_length();
        let content_type = source.content_type().to_string();
        let mut reader = source.open();

        let copied = copy_with_progress(
            cancel,
            &mut reader,
            &mut file,
            total_bytes,
            progress.as_deref(),
            locator,
            dst,
        )
        .await;
        // a failed copy still leaves every byte written so far on disk
        let flushed = file.flush().await;
        let bytes_written = copied?;
        flushed.map_err(write_err)?;

        if let Some(total) = total_bytes {
            if total != bytes_written {
                self.logger.warn(&format!(
                    "{}: expected {} bytes but received {}",
                    locator, total, bytes_written
                ));
            }
        }

        Ok(TransferOutcome {
            content_type,
            bytes_written,
            duration: started.elapsed(),
        })
    }
}

async fn copy_with_progress<R, W>(
    cancel: &CancellationToken,
    reader: &mut R,
    writer: &mut W,
    total_bytes: Option<u64>,
    progress: Option<&(dyn Fn(ProgressSample) + Send + Sync)>,
    locator: &str,
    dst: &Path,
) -> Result<u64, TransferError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut bytes_written: u64 = 0;
    let mut last_progress: Option<Instant> = None;

    loop {
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            read = reader.read(&mut buf) => read.map_err(|source| TransferError::Read {
                locator: locator.to_string(),
                source,
            })?,
        };

        if n == 0 {
            if let Some(report) = progress {
                report(ProgressSample {
                    bytes_written,
                    total_bytes,
                });
            }
            return Ok(bytes_written);
        }

        writer
            .write_all(&buf[..n])
            .await
            .map_err(|source| TransferError::Write {
                path: dst.to_path_buf(),
                source,
            })?;
        bytes_written += n as u64;

        if let Some(report) = progress {
            let now = Instant::now();
            let due =
                last_progress.is_none_or(|last| now.duration_since(last) >= PROGRESS_INTERVAL);
            if due {
                report(ProgressSample {
                    bytes_written,
                    total_bytes,
                });
                last_progress = Some(now);
            }
        }
    }
}

//! External media tooling: ffmpeg for audio, the `image` crate for covers.

mod cover;
mod ffmpeg;

use std::{fmt, io, path::PathBuf};

pub use cover::convert_to_png;
pub use ffmpeg::Ffmpeg;
pub use ffmpeg::MetadataInput;

#[derive(Debug)]
pub enum MediaError {
    /// The tool could not be started at all.
    Spawn(String, io::Error),
    /// The tool ran and exited unsuccessfully; carries its stderr.
    Failed(String, String),
    Io(PathBuf, io::Error),
    Image(PathBuf, image::ImageError),
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaError::Spawn(what, e) => write!(f, "{}: cannot run ffmpeg: {}", what, e),
            MediaError::Failed(what, stderr) => write!(f, "{} failed: {}", what, stderr.trim()),
            MediaError::Io(path, e) => write!(f, "{}: {}", path.display(), e),
            MediaError::Image(path, e) => write!(f, "image {}: {}", path.display(), e),
        }
    }
}

impl std::error::Error for MediaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MediaError::Spawn(_, e) | MediaError::Io(_, e) => Some(e),
            MediaError::Image(_, e) => Some(e),
            MediaError::Failed(..) => None,
        }
    }
}

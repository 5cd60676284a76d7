use std::path::{Path, PathBuf};

use image::ImageFormat;

use super::MediaError;

/// Decodes any supported image at `src` and writes it to `dst` as PNG.
///
/// Decoding is CPU bound, so it runs on the blocking thread pool.
pub async fn convert_to_png(src: &Path, dst: &Path) -> Result<(), MediaError> {
    let src: PathBuf = src.to_path_buf();
    let dst: PathBuf = dst.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let img = image::ImageReader::open(&src)
            .map_err(|e| MediaError::Io(src.clone(), e))?
            .with_guessed_format()
            .map_err(|e| MediaError::Io(src.clone(), e))?
            .decode()
            .map_err(|e| MediaError::Image(src.clone(), e))?;

        img.save_with_format(&dst, ImageFormat::Png)
            .map_err(|e| MediaError::Image(dst.clone(), e))
    })
    .await
    .map_err(|e| MediaError::Failed("cover conversion".to_string(), e.to_string()))?
}

use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
};

use futures_util::io::AsyncWriteExt;

use crate::utils;

/// Replaces `path` with `contents` so readers see either the old or the new
/// file, never a partial one.
///
/// The data goes to a uniquely named sibling (`<name>.tmp.<suffix>`) that is
/// flushed, synced and renamed over the destination. The temporary file is
/// removed on any failure.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    async_fs::create_dir_all(&dir).await?;

    let tmp_path = dir.join(temp_name(path));
    if let Err(e) = write_synced(&tmp_path, contents).await {
        let _ = async_fs::remove_file(&tmp_path).await;
        return Err(e);
    }

    if let Err(e) = async_fs::rename(&tmp_path, path).await {
        let _ = async_fs::remove_file(&tmp_path).await;
        return Err(e);
    }

    Ok(())
}

async fn write_synced(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = async_fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(contents).await?;
    file.flush().await?;
    file.sync_all().await
}

fn temp_name(path: &Path) -> OsString {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("state"));
    name.push(format!(".tmp.{}", utils::random_suffix(10)));
    name
}

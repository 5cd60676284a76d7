use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
};

use tokio::process::Command;

use super::MediaError;

/// Tag values written into a finished audio file.
#[derive(Debug, Clone, Default)]
pub struct MetadataInput {
    pub file_path: PathBuf,
    /// Extension including the dot, e.g. `.mp3` or `.flac`.
    pub file_type: String,
    pub album: String,
    pub title: String,
    pub album_artists: Vec<String>,
    pub artists: Vec<String>,
    pub track_number: usize,
    pub cover_path: Option<PathBuf>,
    pub lyric_path: Option<PathBuf>,
}

/// Runs the ffmpeg binary. Every invocation is killed if its future is dropped.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    program: String,
}

impl Ffmpeg {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Verifies the binary can be executed.
    pub async fn check(&self) -> Result<(), MediaError> {
        self.run("ffmpeg -version", vec![OsString::from("-version")])
            .await
            .map_err(|e| match e {
                MediaError::Spawn(_, err) => MediaError::Spawn(
                    "ffmpeg is required but unavailable".to_string(),
                    err,
                ),
                other => other,
            })
    }

    pub async fn wav_to_flac(&self, wav_path: &Path, flac_path: &Path) -> Result<(), MediaError> {
        let args: Vec<OsString> = vec![
            "-y".into(),
            "-i".into(),
            wav_path.into(),
            "-vn".into(),
            "-compression_level".into(),
            "12".into(),
            flac_path.into(),
        ];
        self.run("ffmpeg wav->flac", args).await
    }

    /// Remuxes the audio with tags, optional lyrics and an attached cover, then
    /// replaces the original file.
    pub async fn apply_metadata(&self, input: &MetadataInput) -> Result<(), MediaError> {
        let lyrics = match &input.lyric_path {
            Some(path) => async_fs::read_to_string(path)
                .await
                .map_err(|e| MediaError::Io(path.clone(), e))?,
            None => String::new(),
        };

        let file_name = input
            .file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp_path = input
            .file_path
            .with_file_name(format!(".tmp-metadata-{}", file_name));

        let args = metadata_args(input, &lyrics, &tmp_path);
        if let Err(e) = self.run("ffmpeg metadata write", args).await {
            let _ = async_fs::remove_file(&tmp_path).await;
            return Err(e);
        }

        async_fs::rename(&tmp_path, &input.file_path)
            .await
            .map_err(|e| MediaError::Io(input.file_path.clone(), e))
    }

    async fn run(&self, what: &str, args: Vec<OsString>) -> Result<(), MediaError> {
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| MediaError::Spawn(what.to_string(), e))?;

        if !output.status.success() {
            return Err(MediaError::Failed(
                format!("{} ({})", what, output.status),
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        Ok(())
    }
}

fn metadata_args(input: &MetadataInput, lyrics: &str, tmp_path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), input.file_path.clone().into()];

    let cover = input.cover_path.as_ref();
    if let Some(cover) = cover {
        args.push("-i".into());
        args.push(cover.clone().into());
    }

    args.extend(["-map".into(), "0:a".into()]);
    if cover.is_some() {
        args.extend(["-map".into(), "1:v".into()]);
    }
    args.extend(["-c:a".into(), "copy".into()]);

    if cover.is_some() {
        let picture: &[&str] = if input.file_type == ".mp3" {
            &[
                "-c:v",
                "mjpeg",
                "-id3v2_version",
                "3",
                "-disposition:v",
                "attached_pic",
                "-metadata:s:v",
                "title=Cover",
                "-metadata:s:v",
                "comment=Cover (front)",
            ]
        } else {
            &["-c:v", "png", "-disposition:v", "attached_pic"]
        };
        args.extend(picture.iter().map(OsString::from));
    }

    let album_artists = input.album_artists.concat();
    let artists = input.artists.concat();
    let mut tags = vec![
        format!("album={}", input.album),
        format!("title={}", input.title),
        format!("album_artist={}", album_artists),
        format!("albumartist={}", album_artists),
        format!("artist={}", artists),
        format!("track={}", input.track_number),
    ];
    if !lyrics.is_empty() {
        tags.push(format!("lyrics={}", lyrics));
    }
    for tag in tags {
        args.push("-metadata".into());
        args.push(tag.into());
    }

    args.push(tmp_path.into());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(file_type: &str, cover: bool) -> MetadataInput {
        MetadataInput {
            file_path: PathBuf::from("/music/Album/Song.flac"),
            file_type: file_type.to_string(),
            album: "Album".to_string(),
            title: "Song".to_string(),
            album_artists: vec!["A".to_string(), "B".to_string()],
            artists: vec!["C".to_string()],
            track_number: 3,
            cover_path: cover.then(|| PathBuf::from("/music/Album/cover.png")),
            lyric_path: None,
        }
    }

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn mp3_cover_uses_mjpeg_and_id3v23() {
        let args = strings(metadata_args(
            &input(".mp3", true),
            "",
            Path::new("/tmp/out.mp3"),
        ));
        assert!(args.windows(2).any(|w| w == ["-c:v", "mjpeg"]));
        assert!(args.windows(2).any(|w| w == ["-id3v2_version", "3"]));
        assert!(args.windows(2).any(|w| w == ["-map", "1:v"]));
    }

    #[test]
    fn no_cover_maps_audio_only() {
        let args = strings(metadata_args(
            &input(".flac", false),
            "",
            Path::new("/tmp/out.flac"),
        ));
        assert!(!args.iter().any(|a| a == "1:v"));
        assert!(args.contains(&"album_artist=AB".to_string()));
        assert!(args.contains(&"track=3".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out.flac"));
    }

    #[test]
    fn lyrics_are_tagged_when_present() {
        let args = strings(metadata_args(
            &input(".flac", true),
            "[00:01.00]la",
            Path::new("/tmp/out.flac"),
        ));
        assert!(args.contains(&"lyrics=[00:01.00]la".to_string()));
        assert!(args.windows(2).any(|w| w == ["-c:v", "png"]));
    }
}

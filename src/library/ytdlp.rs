//! YouTube (and anything else yt-dlp understands) through the `yt-dlp` CLI.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use url::Url;

use crate::error::ResolutionError;

use super::model::{MediaLocator, Resolution, SourceKey, Track};
use super::resolve::TrackResolver;

/// The subset of yt-dlp's info JSON we read.
#[derive(Debug, Deserialize)]
pub(super) struct InfoEntry {
    id: String,
    #[serde(default)]
    extractor_key: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    playlist_title: Option<String>,
    #[serde(default)]
    requested_downloads: Vec<RequestedDownload>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default, rename = "_filename")]
    legacy_filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RequestedDownload {
    #[serde(default)]
    filepath: Option<String>,
}

impl InfoEntry {
    fn media_path(&self) -> Option<PathBuf> {
        self.requested_downloads
            .iter()
            .find_map(|d| d.filepath.as_deref())
            .or(self.filename.as_deref())
            .or(self.legacy_filename.as_deref())
            .map(PathBuf::from)
    }

    fn into_track(self, path: PathBuf) -> Track {
        let namespace = self.extractor_key.as_deref().unwrap_or("youtube");
        let key = SourceKey::new(namespace, &self.id);
        let title = self.title.unwrap_or_else(|| "Unknown Title".to_string());
        let duration = self
            .duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| d.round() as u64)
            .unwrap_or(0);

        Track::new(key, title, MediaLocator::downloaded(path))
            .with_duration(duration)
            .with_thumbnail(self.thumbnail)
    }
}

/// Parse `--dump-json` output: one info object per line.
pub(super) fn parse_entries(stdout: &str) -> Result<Vec<InfoEntry>, serde_json::Error> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with('{'))
        .map(|l| serde_json::from_str::<InfoEntry>(l))
        .collect()
}

/// Whether a link names a whole playlist rather than one video. A watch link
/// that also carries `list=` (mixes, "play all") stays a single video.
pub(super) fn wants_playlist(link: &str) -> bool {
    let Ok(url) = Url::parse(link) else {
        return false;
    };
    if url.path().starts_with("/playlist") {
        return true;
    }
    if url.host_str() == Some("youtu.be") {
        return false;
    }
    let mut list = false;
    let mut video = false;
    for (key, _) in url.query_pairs() {
        match key.as_ref() {
            "list" => list = true,
            "v" => video = true,
            _ => {}
        }
    }
    list && !video
}

pub struct YtDlpResolver {
    program: String,
    format: String,
}

impl YtDlpResolver {
    pub fn new(program: String, format: String) -> Self {
        Self { program, format }
    }

    pub(super) fn args(&self, target: &str, dest: &Path, playlist: bool) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--no-simulate".into(),
            "--dump-json".into(),
            "--no-progress".into(),
            "--no-warnings".into(),
            "-f".into(),
            self.format.clone().into(),
            "-o".into(),
            dest.join("%(id)s.%(ext)s").into_os_string(),
        ];
        args.push(if playlist {
            "--yes-playlist".into()
        } else {
            "--no-playlist".into()
        });
        args.push("--".into());
        args.push(target.into());
        args
    }

    /// Download `target` (a URL or a `ytsearch` query) into `dest`.
    pub async fn download(
        &self,
        target: &str,
        dest: &Path,
        playlist: bool,
    ) -> Result<Resolution, ResolutionError> {
        tokio::fs::create_dir_all(dest).await?;

        tracing::debug!(program = %self.program, %target, ?dest, "running yt-dlp");
        let output = Command::new(&self.program)
            .args(self.args(target, dest, playlist))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ResolutionError::Tool {
                program: self.program.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let entries = parse_entries(&stdout)?;

        let playlist_title = entries.iter().find_map(|e| e.playlist_title.clone());
        let mut tracks = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(path) = entry.media_path() else {
                tracing::warn!(id = %entry.id, "yt-dlp reported no output file");
                continue;
            };
            // Entries that failed mid-playlist still print JSON.
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                tracing::warn!(id = %entry.id, ?path, "downloaded file is missing");
                continue;
            }
            tracks.push(entry.into_track(path));
        }

        if tracks.is_empty() {
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let reason = stderr
                    .lines()
                    .rev()
                    .find(|l| !l.trim().is_empty())
                    .unwrap_or("yt-dlp exited with an error")
                    .to_string();
                return Err(ResolutionError::Download(reason));
            }
            return Err(ResolutionError::NothingFound(target.to_string()));
        }

        Ok(Resolution {
            playlist_title: if playlist { playlist_title } else { None },
            tracks,
        })
    }

    /// Download the first YouTube search hit for `query`.
    pub async fn search(&self, query: &str, dest: &Path) -> Result<Track, ResolutionError> {
        let mut resolution = self
            .download(&format!("ytsearch1:{query}"), dest, false)
            .await?;
        if resolution.tracks.is_empty() {
            return Err(ResolutionError::NothingFound(query.to_string()));
        }
        Ok(resolution.tracks.swap_remove(0))
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, url: &str, dest: &Path) -> Result<Resolution, ResolutionError> {
        self.download(url, dest, wants_playlist(url)).await
    }
}

//! Turning user supplied links into playable tracks.
//!
//! `PlatformResolver` looks at the link and hands it to the resolver for that
//! platform. Every resolver downloads (or locates) media under the destination
//! directory it is given and reports tracks in source order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::config::{LibrarySettings, ResolverSettings};
use crate::error::ResolutionError;

use super::model::Resolution;
use super::scan::{is_audio_file, read_track, scan};
use super::spotify::SpotifyResolver;
use super::ytdlp::YtDlpResolver;

#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resolve `url` into tracks, writing any downloaded media below `dest`.
    async fn resolve(&self, url: &str, dest: &Path) -> Result<Resolution, ResolutionError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Platform {
    YouTube,
    Spotify,
    Local(PathBuf),
}

/// Classify a link the way the play command accepts them.
pub(super) fn classify(input: &str) -> Result<Platform, ResolutionError> {
    let input = input.trim();

    if let Ok(url) = Url::parse(input) {
        if url.scheme() == "file" {
            return url
                .to_file_path()
                .map(Platform::Local)
                .map_err(|()| ResolutionError::InvalidUrl {
                    platform: "file",
                    url: input.to_string(),
                });
        }

        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host);
        return match host {
            "youtube.com" | "m.youtube.com" | "music.youtube.com" | "youtu.be" => {
                Ok(Platform::YouTube)
            }
            "open.spotify.com" | "spotify.com" => Ok(Platform::Spotify),
            _ => Err(ResolutionError::Unsupported(input.to_string())),
        };
    }

    let path = Path::new(input);
    if path.exists() {
        return Ok(Platform::Local(path.to_path_buf()));
    }

    Err(ResolutionError::Unsupported(input.to_string()))
}

/// Plays files and directories from the local filesystem. Media is borrowed,
/// never copied into the guild directory.
pub struct LocalResolver {
    settings: LibrarySettings,
}

impl LocalResolver {
    pub fn new(settings: LibrarySettings) -> Self {
        Self { settings }
    }

    fn resolve_path(&self, path: &Path) -> Result<Resolution, ResolutionError> {
        if path.is_dir() {
            let tracks = scan(path, &self.settings);
            if tracks.is_empty() {
                return Err(ResolutionError::NothingFound(path.display().to_string()));
            }
            let playlist_title = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .or_else(|| Some(path.display().to_string()));
            return Ok(Resolution {
                playlist_title,
                tracks,
            });
        }

        if path.is_file() && is_audio_file(path, &self.settings) {
            return Ok(Resolution::single(read_track(path, &self.settings)));
        }

        Err(ResolutionError::NothingFound(path.display().to_string()))
    }
}

#[async_trait]
impl TrackResolver for LocalResolver {
    async fn resolve(&self, url: &str, _dest: &Path) -> Result<Resolution, ResolutionError> {
        let Platform::Local(path) = classify(url)? else {
            return Err(ResolutionError::Unsupported(url.to_string()));
        };
        let this = LocalResolver::new(self.settings.clone());
        // Tag reading is blocking IO.
        tokio::task::spawn_blocking(move || this.resolve_path(&path))
            .await
            .map_err(|e| ResolutionError::Download(e.to_string()))?
    }
}

/// Routes each link to the resolver for its platform.
pub struct PlatformResolver {
    youtube: Arc<YtDlpResolver>,
    spotify: Option<SpotifyResolver>,
    local: LocalResolver,
}

impl PlatformResolver {
    pub fn new(resolver: &ResolverSettings, library: &LibrarySettings) -> Self {
        let youtube = Arc::new(YtDlpResolver::new(
            resolver.ytdlp_program.clone(),
            resolver.format.clone(),
        ));
        let spotify = match (&resolver.spotify_client_id, &resolver.spotify_client_secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Some(
                SpotifyResolver::new(id.clone(), secret.clone(), youtube.clone()),
            ),
            _ => None,
        };
        Self {
            youtube,
            spotify,
            local: LocalResolver::new(library.clone()),
        }
    }
}

#[async_trait]
impl TrackResolver for PlatformResolver {
    async fn resolve(&self, url: &str, dest: &Path) -> Result<Resolution, ResolutionError> {
        match classify(url)? {
            Platform::YouTube => self.youtube.resolve(url, dest).await,
            Platform::Spotify => match &self.spotify {
                Some(spotify) => spotify.resolve(url, dest).await,
                None => Err(ResolutionError::Unsupported(
                    "spotify links need resolver.spotify_client_id/secret".to_string(),
                )),
            },
            Platform::Local(_) => self.local.resolve(url, dest).await,
        }
    }
}

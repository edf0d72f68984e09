//! Spotify links. Spotify only provides metadata, so each track is looked up by
//! "name artist" on YouTube and downloaded from there, keeping the album art.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use url::Url;

use crate::error::ResolutionError;

use super::model::{Resolution, SourceKey, Track};
use super::resolve::TrackResolver;
use super::ytdlp::YtDlpResolver;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum SpotifyLink {
    Track(String),
    Playlist(String),
}

/// Extract the kind and id from `https://open.spotify.com/{track|playlist}/<id>`.
pub(super) fn parse_link(input: &str) -> Option<SpotifyLink> {
    let url = Url::parse(input).ok()?;
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    let mut kind = segments.next()?;
    // Localized links look like /intl-de/track/<id>.
    if kind.starts_with("intl-") {
        kind = segments.next()?;
    }
    let id = segments.next()?;
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    match kind {
        "track" => Some(SpotifyLink::Track(id.to_string())),
        "playlist" => Some(SpotifyLink::Playlist(id.to_string())),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
pub(super) struct SpotifyTrack {
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
    #[serde(default)]
    album: Option<SpotifyAlbum>,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyAlbum {
    #[serde(default)]
    images: Vec<SpotifyImage>,
}

#[derive(Debug, Deserialize)]
struct SpotifyImage {
    url: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistResponse {
    name: String,
    tracks: PlaylistPage,
}

#[derive(Debug, Deserialize)]
struct PlaylistPage {
    items: Vec<PlaylistItem>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<SpotifyTrack>,
}

impl SpotifyTrack {
    pub(super) fn search_query(&self) -> String {
        match self.artists.first() {
            Some(artist) => format!("{} {}", self.name, artist.name),
            None => self.name.clone(),
        }
    }

    fn album_art(&self) -> Option<String> {
        self.album
            .as_ref()
            .and_then(|a| a.images.first())
            .map(|i| i.url.clone())
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct SpotifyResolver {
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
    youtube: Arc<YtDlpResolver>,
}

impl SpotifyResolver {
    pub fn new(client_id: String, client_secret: String, youtube: Arc<YtDlpResolver>) -> Self {
        Self {
            client_id,
            client_secret,
            http: reqwest::Client::new(),
            token: Mutex::new(None),
            youtube,
        }
    }

    async fn access_token(&self) -> Result<String, ResolutionError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let response: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        // Refresh a little early so a token never expires mid-request.
        let ttl = Duration::from_secs(response.expires_in.saturating_sub(30));
        *cached = Some(CachedToken {
            value: response.access_token.clone(),
            expires_at: Instant::now() + ttl,
        });
        Ok(response.access_token)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ResolutionError> {
        let token = self.access_token().await?;
        let body = self
            .http
            .get(format!("{API_BASE}{path}"))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body)
    }

    async fn fetch(&self, spotify: &SpotifyTrack, dest: &Path) -> Result<Track, ResolutionError> {
        let found = self.youtube.search(&spotify.search_query(), dest).await?;
        let mut track = found.with_thumbnail(spotify.album_art());
        if let Some(id) = &spotify.id {
            track.key = SourceKey::new("spotify", id);
        }
        Ok(track)
    }
}

#[async_trait]
impl TrackResolver for SpotifyResolver {
    async fn resolve(&self, url: &str, dest: &Path) -> Result<Resolution, ResolutionError> {
        let link = parse_link(url).ok_or_else(|| ResolutionError::InvalidUrl {
            platform: "spotify",
            url: url.to_string(),
        })?;

        match link {
            SpotifyLink::Track(id) => {
                let spotify: SpotifyTrack = self.get(&format!("/tracks/{id}")).await?;
                Ok(Resolution::single(self.fetch(&spotify, dest).await?))
            }
            SpotifyLink::Playlist(id) => {
                let playlist: PlaylistResponse = self.get(&format!("/playlists/{id}")).await?;
                let mut tracks = Vec::new();
                for item in playlist.tracks.items {
                    let Some(spotify) = item.track else { continue };
                    match self.fetch(&spotify, dest).await {
                        Ok(track) => tracks.push(track),
                        Err(e) => {
                            tracing::warn!(track = %spotify.name, "skipping playlist entry: {e}")
                        }
                    }
                }
                if tracks.is_empty() {
                    return Err(ResolutionError::NothingFound(url.to_string()));
                }
                Ok(Resolution {
                    playlist_title: Some(playlist.name),
                    tracks,
                })
            }
        }
    }
}

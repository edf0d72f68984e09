use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique track identity. Never persisted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(u64);

impl TrackId {
    pub fn next() -> Self {
        Self(NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stable identity of the thing a track was resolved from, e.g.
/// `youtube:dQw4w9WgXcQ` or `file:/music/a.mp3`. Queue deduplication keys on this.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey(String);

impl SourceKey {
    pub fn new(namespace: &str, id: &str) -> Self {
        Self(format!("{}:{}", namespace.to_ascii_lowercase(), id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the voice sink reads a track's audio from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaLocator {
    path: PathBuf,
    /// Downloaded on behalf of a guild session and deleted with it. Library files
    /// picked from the local filesystem are never owned.
    owned: bool,
}

impl MediaLocator {
    pub fn downloaded(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            owned: true,
        }
    }

    pub fn borrowed(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            owned: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_owned(&self) -> bool {
        self.owned
    }

    /// Delete owned media. Borrowed media and already-missing files are ignored.
    pub async fn reclaim(&self) {
        if !self.owned {
            return;
        }
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => tracing::debug!(path = ?self.path, "reclaimed media"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = ?self.path, "failed to reclaim media: {e}"),
        }
    }
}

/// One playable item. Immutable once resolved.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: TrackId,
    pub key: SourceKey,
    pub title: String,
    pub media: MediaLocator,
    /// Whole seconds, 0 when unknown.
    pub duration_secs: u64,
    pub thumbnail: Option<String>,
}

impl Track {
    pub fn new(key: SourceKey, title: impl Into<String>, media: MediaLocator) -> Self {
        Self {
            id: TrackId::next(),
            key,
            title: title.into(),
            media,
            duration_secs: 0,
            thumbnail: None,
        }
    }

    pub fn with_duration(mut self, secs: u64) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn with_thumbnail(mut self, url: Option<String>) -> Self {
        self.thumbnail = url;
        self
    }
}

/// What a resolver produced for one URL.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Set when the URL named a playlist or a directory.
    pub playlist_title: Option<String>,
    /// In source order.
    pub tracks: Vec<Track>,
}

impl Resolution {
    pub fn single(track: Track) -> Self {
        Self {
            playlist_title: None,
            tracks: vec![track],
        }
    }
}

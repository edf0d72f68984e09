//! Error types shared by the playback engine and its collaborators.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Turning a user supplied URL into tracks failed.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("unsupported source: {0}")]
    Unsupported(String),

    #[error("invalid {platform} url: {url}")]
    InvalidUrl { platform: &'static str, url: String },

    #[error("nothing playable found for {0}")]
    NothingFound(String),

    #[error("failed to run {program}: {source}")]
    Tool {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("download failed: {0}")]
    Download(String),

    #[error("malformed resolver output: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("metadata request failed: {0}")]
    Api(#[from] reqwest::Error),

    #[error("resolver timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The voice sink could not start or continue playback.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("audio output unavailable: {0}")]
    Unavailable(String),

    #[error("failed to open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {path:?}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("voice connection closed")]
    Closed,
}

/// Updating the chat display failed. Always swallowed after logging.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("no progress message to edit")]
    NoProgressMessage,

    #[error("notification channel closed")]
    Closed,
}

/// A play request did not reach the queue.
#[derive(Debug, Error)]
pub enum PlayError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("could not join voice channel: {0}")]
    Connect(#[source] SinkError),

    #[error("playback was stopped while the request was in flight")]
    Cancelled,

    #[error("music session is gone")]
    SessionClosed,
}

/// A control command (skip, loop, ...) was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("nothing is playing")]
    NothingPlaying,

    #[error("invalid loop mode {0:?}, use 'off', 'track' or 'queue'")]
    InvalidLoopMode(String),

    #[error("music session is gone")]
    SessionClosed,
}

/// A loaded setting the engine cannot run with.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{key} {problem}")]
pub struct InvalidSetting {
    pub key: &'static str,
    pub problem: &'static str,
}

//! Small shared types of the playback engine: identities, loop mode, the
//! playback info shared with the progress reporter, and command replies.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use tokio::time::Instant;

use crate::config::LoopModeSetting;
use crate::error::CommandError;
use crate::library::{Track, TrackId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GuildId(pub u64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u64);

impl fmt::Display for GuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum LoopMode {
    /// Drop a track once it has played.
    #[default]
    Off,
    /// Play the finished track again right away.
    Track,
    /// Send the finished track to the back of the queue.
    Queue,
}

impl LoopMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Track => "track",
            Self::Queue => "queue",
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoopMode {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "track" => Ok(Self::Track),
            "queue" => Ok(Self::Queue),
            _ => Err(CommandError::InvalidLoopMode(s.to_string())),
        }
    }
}

impl From<LoopModeSetting> for LoopMode {
    fn from(s: LoopModeSetting) -> Self {
        match s {
            LoopModeSetting::Off => Self::Off,
            LoopModeSetting::Track => Self::Track,
            LoopModeSetting::Queue => Self::Queue,
        }
    }
}

/// The track that is on air right now.
#[derive(Debug, Clone)]
pub struct NowPlaying {
    pub track: Track,
    /// Identifies one `VoiceSink::play` call. Completions and reporter
    /// signals carrying an older token are stale.
    pub token: u64,
    pub started_at: Instant,
}

/// Playback state mirrored out of the session task for the progress reporter.
/// Only the session writes it.
#[derive(Debug, Clone, Default)]
pub struct PlaybackInfo {
    pub now_playing: Option<NowPlaying>,
    pub loop_mode: LoopMode,
}

pub type PlaybackHandle = Arc<Mutex<PlaybackInfo>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSummary {
    pub id: TrackId,
    pub title: String,
    pub duration_secs: u64,
}

impl From<&Track> for TrackSummary {
    fn from(t: &Track) -> Self {
        Self {
            id: t.id,
            title: t.title.clone(),
            duration_secs: t.duration_secs,
        }
    }
}

/// Read-only view of a guild's queue for the tracklist command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub now_playing: Option<TrackSummary>,
    pub elapsed_secs: u64,
    pub upcoming: Vec<TrackSummary>,
    pub loop_mode: LoopMode,
}

impl QueueSnapshot {
    pub fn is_idle(&self) -> bool {
        self.now_playing.is_none()
    }

    pub fn upcoming_ids(&self) -> Vec<TrackId> {
        self.upcoming.iter().map(|t| t.id).collect()
    }
}

/// Outcome of admitting resolved tracks into the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnqueueReport {
    pub playlist_title: Option<String>,
    pub added: Vec<TrackSummary>,
    pub duplicates: Vec<TrackSummary>,
    /// Set when the session was idle and started playing because of this request.
    pub started: Option<TrackSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopReport {
    /// Whether something was playing when the stop arrived.
    pub was_playing: bool,
    pub cleared: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipReport {
    pub skipped: TrackSummary,
    pub next: Option<TrackSummary>,
}

//! Chat output as seen by the playback engine.
//!
//! The engine only says *what* happened (`Notice`) and hands over a rendered
//! progress view; turning those into embeds or localized text is the
//! notifier's job.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::audio::{GuildId, LoopMode, TrackSummary};
use crate::error::NotifyError;

/// Progress bar plus time text, ready to be put into the now-playing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressView {
    pub bar: String,
    pub time: String,
    pub elapsed_secs: u64,
    pub duration_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveReason {
    /// Stop command.
    Stopped,
    /// Nobody else was left in the voice channel.
    Abandoned,
    /// The voice connection went away underneath us.
    ConnectionLost,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Starts a new progress message; later `edit_progress` calls update it.
    NowPlaying {
        track: TrackSummary,
        thumbnail: Option<String>,
        progress: ProgressView,
    },
    QueueEmpty,
    Skipped {
        track: TrackSummary,
    },
    LoopModeChanged(LoopMode),
    PlaybackFailed {
        track: TrackSummary,
        reason: String,
    },
    Left(LeaveReason),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, guild: GuildId, notice: Notice) -> Result<(), NotifyError>;

    /// Edit the last `NowPlaying` message of `guild` in place.
    async fn edit_progress(&self, guild: GuildId, progress: &ProgressView)
    -> Result<(), NotifyError>;
}

/// Send a notice, logging instead of failing.
pub async fn announce(notifier: &dyn Notifier, guild: GuildId, notice: Notice) {
    if let Err(e) = notifier.send(guild, notice).await {
        tracing::warn!(%guild, "failed to send notice: {e}");
    }
}

pub fn describe(notice: &Notice) -> String {
    match notice {
        Notice::NowPlaying {
            track, progress, ..
        } => format!(
            "Now playing: {} {} {}",
            track.title, progress.bar, progress.time
        ),
        Notice::QueueEmpty => "The queue is empty.".to_string(),
        Notice::Skipped { track } => format!("Skipped {}. Playing next track...", track.title),
        Notice::LoopModeChanged(mode) => format!("Loop mode set to: {mode}."),
        Notice::PlaybackFailed { track, reason } => {
            format!("Could not play {}: {reason}", track.title)
        }
        Notice::Left(LeaveReason::Stopped) => {
            "Music playback has stopped. The bot has left the voice channel.".to_string()
        }
        Notice::Left(LeaveReason::Abandoned) => {
            "Everyone left, so the bot left the voice channel too.".to_string()
        }
        Notice::Left(LeaveReason::ConnectionLost) => {
            "Disconnected. The queue has been cleared.".to_string()
        }
    }
}

/// Prints notices to stdout and keeps the latest progress text per guild.
#[derive(Default)]
pub struct ConsoleNotifier {
    progress: Mutex<HashMap<GuildId, ProgressView>>,
}

impl ConsoleNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_progress(&self, guild: GuildId) -> Option<ProgressView> {
        self.progress.lock().ok()?.get(&guild).cloned()
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn send(&self, guild: GuildId, notice: Notice) -> Result<(), NotifyError> {
        let mut progress = self.progress.lock().map_err(|_| NotifyError::Closed)?;
        match &notice {
            Notice::NowPlaying { progress: p, .. } => {
                progress.insert(guild, p.clone());
            }
            Notice::QueueEmpty | Notice::Left(_) => {
                progress.remove(&guild);
            }
            _ => {}
        }
        println!("[guild {guild}] {}", describe(&notice));
        Ok(())
    }

    async fn edit_progress(
        &self,
        guild: GuildId,
        progress: &ProgressView,
    ) -> Result<(), NotifyError> {
        let mut all = self.progress.lock().map_err(|_| NotifyError::Closed)?;
        match all.get_mut(&guild) {
            Some(slot) => {
                *slot = progress.clone();
                Ok(())
            }
            None => Err(NotifyError::NoProgressMessage),
        }
    }
}

//! Guild → session map and the command surface the chat front-end calls.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{PlaybackSettings, ProgressSettings, Settings};
use crate::error::{CommandError, PlayError};
use crate::library::TrackResolver;
use crate::notify::Notifier;

use super::player::{GuildPlayer, PlayerDeps};
use super::session::SessionConfig;
use super::sink::VoiceSinkFactory;
use super::types::{
    ChannelId, EnqueueReport, GuildId, LoopMode, QueueSnapshot, SkipReport, StopReport,
};

/// The parts of `Settings` the engine uses.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub playback: PlaybackSettings,
    pub progress: ProgressSettings,
    pub media_root: PathBuf,
    pub resolve_timeout: Duration,
}

impl EngineSettings {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            playback: settings.playback.clone(),
            progress: settings.progress.clone(),
            media_root: settings.media.root.clone(),
            resolve_timeout: Duration::from_secs(settings.resolver.timeout_secs),
        }
    }
}

/// Every guild's music session. Sessions are created on first use and live
/// as long as the jukebox.
pub struct Jukebox {
    settings: EngineSettings,
    resolver: Arc<dyn TrackResolver>,
    sinks: Arc<dyn VoiceSinkFactory>,
    notifier: Arc<dyn Notifier>,
    players: Mutex<HashMap<GuildId, Arc<GuildPlayer>>>,
}

impl Jukebox {
    pub fn new(
        settings: EngineSettings,
        resolver: Arc<dyn TrackResolver>,
        sinks: Arc<dyn VoiceSinkFactory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            settings,
            resolver,
            sinks,
            notifier,
            players: Mutex::new(HashMap::new()),
        }
    }

    fn existing(&self, guild: GuildId) -> Option<Arc<GuildPlayer>> {
        let players = self.players.lock().ok()?;
        players.get(&guild).cloned()
    }

    fn player(&self, guild: GuildId) -> Option<Arc<GuildPlayer>> {
        let mut players = self.players.lock().ok()?;
        let player = players.entry(guild).or_insert_with(|| {
            Arc::new(GuildPlayer::spawn(
                guild,
                PlayerDeps {
                    config: SessionConfig::new(&self.settings.playback, &self.settings.progress),
                    sink: self.sinks.open(guild),
                    resolver: self.resolver.clone(),
                    notifier: self.notifier.clone(),
                    media_root: self.settings.media_root.clone(),
                    resolve_timeout: self.settings.resolve_timeout,
                },
            ))
        });
        Some(player.clone())
    }

    /// Join `channel` and queue everything `url` resolves to. Starts playback
    /// when the guild was idle.
    pub async fn play(
        &self,
        guild: GuildId,
        channel: ChannelId,
        url: &str,
    ) -> Result<EnqueueReport, PlayError> {
        let player = self.player(guild).ok_or(PlayError::SessionClosed)?;
        player.play(channel, url).await
    }

    pub async fn stop(&self, guild: GuildId) -> Result<StopReport, CommandError> {
        match self.existing(guild) {
            Some(player) => player.stop().await,
            None => Ok(StopReport {
                was_playing: false,
                cleared: 0,
            }),
        }
    }

    pub async fn skip(&self, guild: GuildId) -> Result<SkipReport, CommandError> {
        match self.existing(guild) {
            Some(player) => player.skip().await,
            None => Err(CommandError::NothingPlaying),
        }
    }

    /// Parse and apply a loop mode. An unknown mode leaves the current one alone.
    pub async fn set_loop_mode(&self, guild: GuildId, mode: &str) -> Result<LoopMode, CommandError> {
        let mode: LoopMode = mode.parse()?;
        let player = self.player(guild).ok_or(CommandError::SessionClosed)?;
        player.set_loop_mode(mode).await?;
        Ok(mode)
    }

    pub async fn list_queue(&self, guild: GuildId) -> Result<QueueSnapshot, CommandError> {
        match self.existing(guild) {
            Some(player) => player.snapshot().await,
            None => Ok(QueueSnapshot {
                loop_mode: self.settings.playback.loop_mode.into(),
                ..QueueSnapshot::default()
            }),
        }
    }

    /// Shuffle the pending tracks; returns how many were reordered.
    pub async fn shuffle(&self, guild: GuildId) -> Result<usize, CommandError> {
        match self.existing(guild) {
            Some(player) => player.shuffle().await,
            None => Ok(0),
        }
    }

    /// Report how many members besides the bot are in its voice channel.
    pub fn voice_members(&self, guild: GuildId, listeners: usize) {
        if let Some(player) = self.existing(guild) {
            player.listeners(listeners);
        }
    }

    pub fn voice_lost(&self, guild: GuildId) {
        if let Some(player) = self.existing(guild) {
            player.voice_lost();
        }
    }
}

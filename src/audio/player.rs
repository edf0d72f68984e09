use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::sync::Mutex as AsyncMutex;

use crate::error::{CommandError, PlayError, ResolutionError};
use crate::library::TrackResolver;
use crate::notify::Notifier;

use super::session::{Session, SessionCmd, SessionConfig, SessionParts};
use super::sink::VoiceSink;
use super::types::{
    ChannelId, EnqueueReport, GuildId, LoopMode, PlaybackInfo, QueueSnapshot, SkipReport,
    StopReport,
};

/// Handle to one guild's session task.
pub(super) struct GuildPlayer {
    guild: GuildId,
    tx: mpsc::UnboundedSender<SessionCmd>,
    /// Bumped by the session on stop/teardown. Play requests read it before
    /// they start resolving.
    epoch: Arc<AtomicU64>,
    sink: Arc<dyn VoiceSink>,
    resolver: Arc<dyn TrackResolver>,
    media_dir: PathBuf,
    resolve_timeout: Duration,
    next_request: AtomicU64,
    /// Held while a play request joins the voice channel.
    joining: AsyncMutex<()>,
}

pub(super) struct PlayerDeps {
    pub config: SessionConfig,
    pub sink: Arc<dyn VoiceSink>,
    pub resolver: Arc<dyn TrackResolver>,
    pub notifier: Arc<dyn Notifier>,
    pub media_root: PathBuf,
    pub resolve_timeout: Duration,
}

impl GuildPlayer {
    /// Spawn the session task of `guild`. Must be called inside a tokio runtime.
    pub(super) fn spawn(guild: GuildId, deps: PlayerDeps) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let epoch = Arc::new(AtomicU64::new(0));
        let media_dir = deps.media_root.join(guild.to_string());

        let session = Session::new(SessionParts {
            guild,
            config: deps.config,
            epoch: epoch.clone(),
            playback: Arc::new(Mutex::new(PlaybackInfo::default())),
            sink: deps.sink.clone(),
            notifier: deps.notifier,
            tx: tx.downgrade(),
            media_dir: media_dir.clone(),
        });
        tokio::spawn(session.run(rx));
        tracing::debug!(%guild, "session started");

        Self {
            guild,
            tx,
            epoch,
            sink: deps.sink,
            resolver: deps.resolver,
            media_dir,
            resolve_timeout: deps.resolve_timeout,
            next_request: AtomicU64::new(1),
            joining: AsyncMutex::new(()),
        }
    }

    fn send(&self, cmd: SessionCmd) -> bool {
        self.tx.send(cmd).is_ok()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> SessionCmd) -> Option<T> {
        let (reply, rx) = oneshot::channel();
        if !self.send(make(reply)) {
            return None;
        }
        rx.await.ok()
    }

    /// Join `channel`, resolve `url` into a private directory and hand the
    /// tracks to the session.
    pub(super) async fn play(&self, channel: ChannelId, url: &str) -> Result<EnqueueReport, PlayError> {
        let epoch = self.join(channel).await?;

        let request = self.next_request.fetch_add(1, Ordering::Relaxed);
        let dest = self.media_dir.join(format!("req-{request}"));
        tracing::info!(guild = %self.guild, %url, "resolving");

        let resolved =
            tokio::time::timeout(self.resolve_timeout, self.resolver.resolve(url, &dest)).await;
        let resolution = match resolved {
            Ok(Ok(resolution)) => resolution,
            Ok(Err(e)) => {
                discard_request_dir(&dest).await;
                return Err(e.into());
            }
            Err(_) => {
                discard_request_dir(&dest).await;
                return Err(ResolutionError::Timeout(self.resolve_timeout).into());
            }
        };

        let (reply, rx) = oneshot::channel();
        let cmd = SessionCmd::Enqueue {
            resolution,
            epoch,
            reply,
        };
        if let Err(mpsc::error::SendError(cmd)) = self.tx.send(cmd) {
            if let SessionCmd::Enqueue { resolution, .. } = cmd {
                for track in resolution.tracks {
                    track.media.reclaim().await;
                }
            }
            return Err(PlayError::SessionClosed);
        }
        rx.await.map_err(|_| PlayError::SessionClosed)?
    }

    /// Connect the sink and report the channel to the session. Returns the
    /// epoch the request runs under.
    async fn join(&self, channel: ChannelId) -> Result<u64, PlayError> {
        let _joining = self.joining.lock().await;
        let epoch = self.epoch.load(Ordering::SeqCst);

        self.sink.connect(channel).await.map_err(PlayError::Connect)?;
        if self.epoch.load(Ordering::SeqCst) != epoch {
            // A stop or teardown ran while connecting and its disconnect
            // found nothing to leave.
            tracing::info!(guild = %self.guild, "stopped while joining, leaving again");
            self.sink.disconnect().await;
            return Err(PlayError::Cancelled);
        }
        if !self.send(SessionCmd::Connected { channel, epoch }) {
            return Err(PlayError::SessionClosed);
        }
        Ok(epoch)
    }

    pub(super) async fn stop(&self) -> Result<StopReport, CommandError> {
        self.request(|reply| SessionCmd::Stop { reply })
            .await
            .ok_or(CommandError::SessionClosed)
    }

    pub(super) async fn skip(&self) -> Result<SkipReport, CommandError> {
        self.request(|reply| SessionCmd::Skip { reply })
            .await
            .ok_or(CommandError::SessionClosed)?
    }

    pub(super) async fn set_loop_mode(&self, mode: LoopMode) -> Result<(), CommandError> {
        self.request(|reply| SessionCmd::SetLoopMode { mode, reply })
            .await
            .ok_or(CommandError::SessionClosed)
    }

    pub(super) async fn shuffle(&self) -> Result<usize, CommandError> {
        self.request(|reply| SessionCmd::Shuffle { reply })
            .await
            .ok_or(CommandError::SessionClosed)
    }

    pub(super) async fn snapshot(&self) -> Result<QueueSnapshot, CommandError> {
        self.request(|reply| SessionCmd::Snapshot { reply })
            .await
            .ok_or(CommandError::SessionClosed)
    }

    pub(super) fn listeners(&self, count: usize) {
        self.send(SessionCmd::Listeners { count });
    }

    pub(super) fn voice_lost(&self) {
        self.send(SessionCmd::VoiceLost);
    }
}

async fn discard_request_dir(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(dir = ?dir, "failed to remove download directory: {e}"),
    }
}

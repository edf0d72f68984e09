//! The per-guild playback actor.
//!
//! One task owns the queue and the session state and works through its mailbox
//! in order. Commands, sink completions, reporter signals and grace timers all
//! arrive here, so every transition of a guild is serialized. Anything that can
//! arrive late (a completion, a reporter tick, a grace timer, a finished
//! download) carries the token/sequence/epoch it was issued under and is
//! dropped when that is no longer current.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc::{UnboundedReceiver, WeakUnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{PlaybackSettings, ProgressSettings};
use crate::error::{CommandError, PlayError};
use crate::library::{Resolution, Track};
use crate::notify::{LeaveReason, Notice, Notifier, announce};

use super::looping::apply_loop_mode;
use super::progress::{Reporter, render};
use super::queue::PlaybackQueue;
use super::sink::{EndReason, PlaybackEnd, VoiceSink};
use super::types::{
    ChannelId, EnqueueReport, GuildId, LoopMode, NowPlaying, PlaybackHandle, QueueSnapshot,
    SkipReport, StopReport, TrackSummary,
};

pub(super) enum SessionCmd {
    /// A play request finished resolving. `epoch` is the value it read before
    /// it started.
    Enqueue {
        resolution: Resolution,
        epoch: u64,
        reply: oneshot::Sender<Result<EnqueueReport, PlayError>>,
    },
    Connected {
        channel: ChannelId,
        epoch: u64,
    },
    Skip {
        reply: oneshot::Sender<Result<SkipReport, CommandError>>,
    },
    Stop {
        reply: oneshot::Sender<StopReport>,
    },
    SetLoopMode {
        mode: LoopMode,
        reply: oneshot::Sender<()>,
    },
    Shuffle {
        reply: oneshot::Sender<usize>,
    },
    Snapshot {
        reply: oneshot::Sender<QueueSnapshot>,
    },
    Finished {
        token: u64,
        reason: EndReason,
    },
    /// The completion of `token` was dropped without firing.
    SinkGone {
        token: u64,
    },
    TrackElapsed {
        token: u64,
    },
    RestartClock {
        token: u64,
    },
    Listeners {
        count: usize,
    },
    GraceExpired {
        seq: u64,
    },
    VoiceLost,
}

/// Per-session knobs, taken from `PlaybackSettings`/`ProgressSettings`.
#[derive(Debug, Clone)]
pub(super) struct SessionConfig {
    pub loop_mode: LoopMode,
    pub skip_respects_loop: bool,
    pub abandon_grace: Duration,
    pub progress_interval: Duration,
    pub progress: ProgressSettings,
}

impl SessionConfig {
    pub(super) fn new(playback: &PlaybackSettings, progress: &ProgressSettings) -> Self {
        Self {
            loop_mode: playback.loop_mode.into(),
            skip_respects_loop: playback.skip_respects_loop,
            abandon_grace: Duration::from_secs(playback.abandon_grace_secs),
            progress_interval: Duration::from_millis(playback.progress_interval_ms.max(1)),
            progress: progress.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Grace {
    seq: u64,
    armed: bool,
}

pub(super) struct Session {
    guild: GuildId,
    config: SessionConfig,
    queue: PlaybackQueue,
    current: Option<NowPlaying>,
    loop_mode: LoopMode,
    next_token: u64,
    epoch: Arc<AtomicU64>,
    channel: Option<ChannelId>,
    listeners: Option<usize>,
    grace: Grace,
    reporter: Option<JoinHandle<()>>,
    playback: PlaybackHandle,
    sink: Arc<dyn VoiceSink>,
    notifier: Arc<dyn Notifier>,
    tx: WeakUnboundedSender<SessionCmd>,
    media_dir: PathBuf,
}

pub(super) struct SessionParts {
    pub guild: GuildId,
    pub config: SessionConfig,
    pub epoch: Arc<AtomicU64>,
    pub playback: PlaybackHandle,
    pub sink: Arc<dyn VoiceSink>,
    pub notifier: Arc<dyn Notifier>,
    pub tx: WeakUnboundedSender<SessionCmd>,
    pub media_dir: PathBuf,
}

impl Session {
    pub(super) fn new(parts: SessionParts) -> Self {
        let loop_mode = parts.config.loop_mode;
        let session = Self {
            guild: parts.guild,
            config: parts.config,
            queue: PlaybackQueue::new(),
            current: None,
            loop_mode,
            next_token: 0,
            epoch: parts.epoch,
            channel: None,
            listeners: None,
            grace: Grace::default(),
            reporter: None,
            playback: parts.playback,
            sink: parts.sink,
            notifier: parts.notifier,
            tx: parts.tx,
            media_dir: parts.media_dir,
        };
        session.publish();
        session
    }

    pub(super) async fn run(mut self, mut rx: UnboundedReceiver<SessionCmd>) {
        while let Some(cmd) = rx.recv().await {
            self.handle(cmd).await;
        }
        // Every handle is gone; release the device.
        self.abort_reporter();
        self.sink.stop().await;
        self.sink.disconnect().await;
        tracing::debug!(guild = %self.guild, "session closed");
    }

    async fn handle(&mut self, cmd: SessionCmd) {
        match cmd {
            SessionCmd::Enqueue {
                resolution,
                epoch,
                reply,
            } => {
                let result = self.enqueue(resolution, epoch).await;
                let _ = reply.send(result);
            }
            SessionCmd::Connected { channel, epoch } => {
                if epoch == self.current_epoch() {
                    self.channel = Some(channel);
                }
            }
            SessionCmd::Skip { reply } => {
                let result = self.skip().await;
                let _ = reply.send(result);
            }
            SessionCmd::Stop { reply } => {
                let report = self.stop().await;
                let _ = reply.send(report);
            }
            SessionCmd::SetLoopMode { mode, reply } => {
                self.loop_mode = mode;
                self.publish();
                tracing::info!(guild = %self.guild, %mode, "loop mode changed");
                announce(&*self.notifier, self.guild, Notice::LoopModeChanged(mode)).await;
                let _ = reply.send(());
            }
            SessionCmd::Shuffle { reply } => {
                self.queue.shuffle();
                let _ = reply.send(self.queue.len());
            }
            SessionCmd::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            SessionCmd::Finished { token, reason } => self.on_finished(token, reason).await,
            SessionCmd::SinkGone { token } => {
                if self.is_current(token) {
                    tracing::error!(guild = %self.guild, "voice sink vanished mid-track");
                    self.teardown(LeaveReason::ConnectionLost).await;
                }
            }
            SessionCmd::TrackElapsed { token } => {
                if self.is_current(token) {
                    self.sink.stop().await;
                    self.advance(true).await;
                }
            }
            SessionCmd::RestartClock { token } => {
                if let Some(np) = self.current.as_mut().filter(|np| np.token == token) {
                    np.started_at = Instant::now();
                    self.publish();
                }
            }
            SessionCmd::Listeners { count } => self.on_listeners(count),
            SessionCmd::GraceExpired { seq } => {
                if seq != self.grace.seq || !self.grace.armed {
                    return;
                }
                self.grace.armed = false;
                if self.listeners == Some(0) {
                    tracing::info!(guild = %self.guild, "left alone in voice channel");
                    self.teardown(LeaveReason::Abandoned).await;
                }
            }
            SessionCmd::VoiceLost => {
                tracing::warn!(guild = %self.guild, "voice connection lost");
                self.teardown(LeaveReason::ConnectionLost).await;
            }
        }
    }

    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn is_current(&self, token: u64) -> bool {
        self.current.as_ref().is_some_and(|np| np.token == token)
    }

    /// Mirror the session state into the handle the reporter reads.
    fn publish(&self) {
        if let Ok(mut info) = self.playback.lock() {
            info.now_playing = self.current.clone();
            info.loop_mode = self.loop_mode;
        }
    }

    fn abort_reporter(&mut self) {
        if let Some(reporter) = self.reporter.take() {
            reporter.abort();
        }
    }

    /// Reclaim the media of a track leaving the session. A single request can
    /// yield several tracks backed by one file, so a file still used by a
    /// queued or current track stays.
    async fn release(&self, track: Track) {
        let path = track.media.path();
        let in_use = self.queue.references(path)
            || self
                .current
                .as_ref()
                .is_some_and(|np| np.track.media.path() == path);
        if in_use {
            tracing::debug!(guild = %self.guild, ?path, "media still in use");
            return;
        }
        track.media.reclaim().await;
    }

    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            now_playing: self.current.as_ref().map(|np| TrackSummary::from(&np.track)),
            elapsed_secs: self
                .current
                .as_ref()
                .map_or(0, |np| np.started_at.elapsed().as_secs()),
            upcoming: self.queue.iter().map(TrackSummary::from).collect(),
            loop_mode: self.loop_mode,
        }
    }

    async fn enqueue(
        &mut self,
        resolution: Resolution,
        epoch: u64,
    ) -> Result<EnqueueReport, PlayError> {
        if epoch != self.current_epoch() {
            tracing::info!(guild = %self.guild, "dropping play request from before a stop");
            for track in resolution.tracks {
                track.media.reclaim().await;
            }
            return Err(PlayError::Cancelled);
        }

        let current_key = self.current.as_ref().map(|np| np.track.key.clone());
        let mut report = EnqueueReport {
            playlist_title: resolution.playlist_title,
            ..EnqueueReport::default()
        };
        for track in resolution.tracks {
            let summary = TrackSummary::from(&track);
            match self.queue.enqueue(track, current_key.as_ref()) {
                Ok(_) => report.added.push(summary),
                Err(duplicate) => {
                    tracing::debug!(guild = %self.guild, key = %duplicate.key, "duplicate track");
                    self.release(duplicate).await;
                    report.duplicates.push(summary);
                }
            }
        }

        if self.current.is_none() && !self.queue.is_empty() {
            report.started = self.start_next().await;
        }
        Ok(report)
    }

    /// Dequeue and start the head. An empty queue is announced and leaves the
    /// session idle.
    async fn start_next(&mut self) -> Option<TrackSummary> {
        let Some(track) = self.queue.dequeue() else {
            tracing::info!(guild = %self.guild, "queue finished");
            announce(&*self.notifier, self.guild, Notice::QueueEmpty).await;
            return None;
        };
        self.start(track).await
    }

    async fn start(&mut self, track: Track) -> Option<TrackSummary> {
        self.next_token += 1;
        let token = self.next_token;
        let summary = TrackSummary::from(&track);

        let end = match self.sink.play(&track.media).await {
            Ok(end) => end,
            Err(e) => {
                tracing::warn!(guild = %self.guild, track = %track.title, "failed to start playback: {e}");
                announce(
                    &*self.notifier,
                    self.guild,
                    Notice::PlaybackFailed {
                        track: summary,
                        reason: e.to_string(),
                    },
                )
                .await;
                self.release(track).await;
                return None;
            }
        };

        tracing::info!(guild = %self.guild, id = %track.id, title = %track.title, "now playing");
        let thumbnail = track.thumbnail.clone();
        self.current = Some(NowPlaying {
            track,
            token,
            started_at: Instant::now(),
        });
        self.publish();
        self.forward_completion(token, end);

        let progress = render(Duration::ZERO, summary.duration_secs, &self.config.progress);
        announce(
            &*self.notifier,
            self.guild,
            Notice::NowPlaying {
                track: summary.clone(),
                thumbnail,
                progress,
            },
        )
        .await;

        self.abort_reporter();
        self.reporter = Some(
            Reporter {
                tx: self.tx.clone(),
                playback: self.playback.clone(),
                notifier: self.notifier.clone(),
                guild: self.guild,
                token,
                interval: self.config.progress_interval,
                settings: self.config.progress.clone(),
            }
            .spawn(),
        );
        Some(summary)
    }

    fn forward_completion(&self, token: u64, end: PlaybackEnd) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let cmd = match end.await {
                Ok(reason) => SessionCmd::Finished { token, reason },
                Err(_) => SessionCmd::SinkGone { token },
            };
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(cmd);
            }
        });
    }

    /// Retire the current track through the loop controller (or straight to
    /// the bin) and start whatever is next.
    async fn advance(&mut self, respect_loop: bool) -> Option<TrackSummary> {
        self.abort_reporter();
        let finished = self.current.take()?;
        self.publish();

        let discarded = if respect_loop {
            apply_loop_mode(finished.track, self.loop_mode, &mut self.queue)
        } else {
            Some(finished.track)
        };
        if let Some(track) = discarded {
            self.release(track).await;
        }
        self.start_next().await
    }

    async fn on_finished(&mut self, token: u64, reason: EndReason) {
        if !self.is_current(token) {
            tracing::debug!(guild = %self.guild, token, "ignoring stale completion");
            return;
        }
        match reason {
            EndReason::Finished | EndReason::Stopped => {
                self.advance(true).await;
            }
            EndReason::Failed(reason) => {
                self.abort_reporter();
                let Some(failed) = self.current.take() else {
                    return;
                };
                self.publish();
                tracing::warn!(guild = %self.guild, track = %failed.track.title, "playback failed: {reason}");
                announce(
                    &*self.notifier,
                    self.guild,
                    Notice::PlaybackFailed {
                        track: TrackSummary::from(&failed.track),
                        reason,
                    },
                )
                .await;
                self.release(failed.track).await;
            }
        }
    }

    async fn skip(&mut self) -> Result<SkipReport, CommandError> {
        let skipped = self
            .current
            .as_ref()
            .map(|np| TrackSummary::from(&np.track))
            .ok_or(CommandError::NothingPlaying)?;

        tracing::info!(guild = %self.guild, title = %skipped.title, "skipping");
        announce(
            &*self.notifier,
            self.guild,
            Notice::Skipped {
                track: skipped.clone(),
            },
        )
        .await;
        self.sink.stop().await;
        let next = self.advance(self.config.skip_respects_loop).await;
        Ok(SkipReport { skipped, next })
    }

    /// Drop the queue and the current track, stop the sink and invalidate
    /// in-flight play requests.
    async fn reset(&mut self) -> (bool, Vec<Track>) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.abort_reporter();
        self.grace = Grace {
            seq: self.grace.seq + 1,
            armed: false,
        };

        let mut dropped = self.queue.clear();
        let was_playing = match self.current.take() {
            Some(np) => {
                dropped.push(np.track);
                true
            }
            None => false,
        };
        self.publish();

        self.sink.stop().await;
        self.sink.disconnect().await;
        self.channel = None;
        (was_playing, dropped)
    }

    async fn stop(&mut self) -> StopReport {
        let (was_playing, dropped) = self.reset().await;
        let cleared = dropped.len() - usize::from(was_playing);
        for track in dropped {
            track.media.reclaim().await;
        }
        tracing::info!(guild = %self.guild, was_playing, cleared, "stopped");
        announce(&*self.notifier, self.guild, Notice::Left(LeaveReason::Stopped)).await;
        StopReport {
            was_playing,
            cleared,
        }
    }

    async fn teardown(&mut self, reason: LeaveReason) {
        // Owned media goes with the directory below.
        self.reset().await;
        self.listeners = None;

        match tokio::fs::remove_dir_all(&self.media_dir).await {
            Ok(()) => tracing::debug!(guild = %self.guild, dir = ?self.media_dir, "removed guild media"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(guild = %self.guild, "failed to remove guild media: {e}"),
        }
        announce(&*self.notifier, self.guild, Notice::Left(reason)).await;
    }

    fn on_listeners(&mut self, count: usize) {
        self.listeners = Some(count);
        if count > 0 {
            if self.grace.armed {
                tracing::debug!(guild = %self.guild, "listener returned, staying");
            }
            self.grace.armed = false;
            self.grace.seq += 1;
            return;
        }
        if self.channel.is_none() || self.grace.armed {
            return;
        }

        self.grace.seq += 1;
        self.grace.armed = true;
        let seq = self.grace.seq;
        let delay = self.config.abandon_grace;
        let tx = self.tx.clone();
        tracing::debug!(guild = %self.guild, ?delay, "alone in voice channel");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(SessionCmd::GraceExpired { seq });
            }
        });
    }
}

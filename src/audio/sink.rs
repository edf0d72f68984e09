//! Voice sink seam: where decoded audio goes once a track is started.
//!
//! A chat-platform voice client implements `VoiceSink` for real deployments;
//! `RodioSink` plays on the local output device.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::error::SinkError;
use crate::library::MediaLocator;

use super::thread::{OutputCmd, spawn_output_thread};
use super::types::{ChannelId, GuildId};

/// Why a started track stopped producing audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    Finished,
    Stopped,
    Failed(String),
}

/// Resolves exactly once per `play` call. A dropped sender means the sink
/// itself went away.
pub type PlaybackEnd = oneshot::Receiver<EndReason>;

#[async_trait]
pub trait VoiceSink: Send + Sync {
    /// Join `channel`, or move there when already connected elsewhere.
    async fn connect(&self, channel: ChannelId) -> Result<(), SinkError>;

    /// Start `media`, replacing whatever was playing.
    async fn play(&self, media: &MediaLocator) -> Result<PlaybackEnd, SinkError>;

    async fn stop(&self);

    fn is_playing(&self) -> bool;

    async fn disconnect(&self);
}

/// Builds the sink of a guild the first time the guild is used.
pub trait VoiceSinkFactory: Send + Sync {
    fn open(&self, guild: GuildId) -> Arc<dyn VoiceSink>;
}

struct OutputHandle {
    tx: Sender<OutputCmd>,
    join: Option<JoinHandle<()>>,
    channel: ChannelId,
}

/// Local playback through the default output device.
///
/// The `rodio` stream is not `Send`, so it lives on its own thread and is
/// driven over a channel; `connect` opens the device and `disconnect` closes it.
pub struct RodioSink {
    guild: GuildId,
    output: Mutex<Option<OutputHandle>>,
    playing: Arc<AtomicBool>,
}

impl RodioSink {
    pub fn new(guild: GuildId) -> Self {
        Self {
            guild,
            output: Mutex::new(None),
            playing: Arc::new(AtomicBool::new(false)),
        }
    }

    fn sender(&self) -> Result<Sender<OutputCmd>, SinkError> {
        let output = self.output.lock().map_err(|_| SinkError::Closed)?;
        output
            .as_ref()
            .map(|o| o.tx.clone())
            .ok_or(SinkError::Closed)
    }
}

#[async_trait]
impl VoiceSink for RodioSink {
    async fn connect(&self, channel: ChannelId) -> Result<(), SinkError> {
        {
            let mut output = self.output.lock().map_err(|_| SinkError::Closed)?;
            if let Some(o) = output.as_mut() {
                if o.channel != channel {
                    tracing::info!(guild = %self.guild, %channel, "moving to voice channel");
                    o.channel = channel;
                }
                return Ok(());
            }
        }

        let (tx, rx) = mpsc::channel::<OutputCmd>();
        let (ready_tx, ready_rx) = oneshot::channel();
        let join = spawn_output_thread(rx, self.playing.clone(), ready_tx);
        ready_rx.await.map_err(|_| SinkError::Closed)??;

        let mut output = self.output.lock().map_err(|_| SinkError::Closed)?;
        if let Some(old) = output.replace(OutputHandle {
            tx,
            join: Some(join),
            channel,
        }) {
            // Lost a connect race; keep the newest device and close the other.
            let _ = old.tx.send(OutputCmd::Quit);
        }
        tracing::info!(guild = %self.guild, %channel, "joined voice channel");
        Ok(())
    }

    async fn play(&self, media: &MediaLocator) -> Result<PlaybackEnd, SinkError> {
        let tx = self.sender()?;
        let (done_tx, done_rx) = oneshot::channel();
        let (ack_tx, ack_rx) = oneshot::channel();
        tx.send(OutputCmd::Play {
            path: PathBuf::from(media.path()),
            done: done_tx,
            ack: ack_tx,
        })
        .map_err(|_| SinkError::Closed)?;
        ack_rx.await.map_err(|_| SinkError::Closed)??;
        Ok(done_rx)
    }

    async fn stop(&self) {
        if let Ok(tx) = self.sender() {
            let _ = tx.send(OutputCmd::Stop);
        }
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    async fn disconnect(&self) {
        let handle = match self.output.lock() {
            Ok(mut output) => output.take(),
            Err(_) => None,
        };
        let Some(mut handle) = handle else {
            return;
        };
        let _ = handle.tx.send(OutputCmd::Quit);
        if let Some(join) = handle.join.take() {
            // The thread exits within one poll interval; don't block the runtime on it.
            let _ = tokio::task::spawn_blocking(move || join.join()).await;
        }
        self.playing.store(false, Ordering::Relaxed);
        tracing::info!(guild = %self.guild, "left voice channel");
    }
}

/// Hands every guild its own local output.
#[derive(Debug, Default)]
pub struct RodioSinkFactory;

impl VoiceSinkFactory for RodioSinkFactory {
    fn open(&self, guild: GuildId) -> Arc<dyn VoiceSink> {
        Arc::new(RodioSink::new(guild))
    }
}

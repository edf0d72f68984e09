//! Now-playing progress: rendering the bar and the periodic reporter task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::WeakUnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::{ProgressSettings, TimeField};
use crate::notify::{Notifier, ProgressView};

use super::session::SessionCmd;
use super::types::{GuildId, LoopMode, PlaybackHandle, PlaybackInfo};

const KNOB: char = '🔘';
const CELL: char = '▬';
const UNKNOWN_TIME: &str = "--:--";

pub fn format_mmss(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// `width` cells with the knob at the elapsed fraction. Unknown duration keeps
/// the knob at the start.
fn progress_bar(elapsed_secs: u64, duration_secs: u64, width: usize) -> String {
    let width = width.max(1);
    let pos = if duration_secs == 0 {
        0
    } else {
        let cells = elapsed_secs.saturating_mul(width as u64) / duration_secs;
        (cells as usize).min(width - 1)
    };
    let mut bar = String::with_capacity(width * CELL.len_utf8());
    for i in 0..width {
        bar.push(if i == pos { KNOB } else { CELL });
    }
    bar
}

fn time_text(elapsed_secs: u64, duration_secs: u64, settings: &ProgressSettings) -> String {
    let known = duration_secs > 0;
    let parts: Vec<String> = settings
        .time_fields
        .iter()
        .map(|f| match f {
            TimeField::Elapsed => format_mmss(elapsed_secs),
            TimeField::Total if known => format_mmss(duration_secs),
            TimeField::Remaining if known => {
                format!("-{}", format_mmss(duration_secs.saturating_sub(elapsed_secs)))
            }
            TimeField::Total | TimeField::Remaining => UNKNOWN_TIME.to_string(),
        })
        .collect();
    parts.join(&settings.time_separator)
}

pub fn render(elapsed: Duration, duration_secs: u64, settings: &ProgressSettings) -> ProgressView {
    let elapsed_secs = if duration_secs > 0 {
        elapsed.as_secs().min(duration_secs)
    } else {
        elapsed.as_secs()
    };
    ProgressView {
        bar: progress_bar(elapsed_secs, duration_secs, settings.bar_width),
        time: time_text(elapsed_secs, duration_secs, settings),
        elapsed_secs,
        duration_secs,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TickAction {
    /// Still playing; redraw at this elapsed time.
    Render {
        elapsed: Duration,
        duration_secs: u64,
    },
    /// Reached the end under loop mode `track`.
    RestartClock,
    /// Reached the end; the session should advance.
    TrackElapsed,
    /// The track this reporter belongs to is gone.
    Exit,
}

pub(super) fn evaluate_tick(info: &PlaybackInfo, token: u64, now: Instant) -> TickAction {
    let Some(np) = info.now_playing.as_ref().filter(|np| np.token == token) else {
        return TickAction::Exit;
    };
    let elapsed = now.saturating_duration_since(np.started_at);
    let duration_secs = np.track.duration_secs;
    if duration_secs > 0 && elapsed.as_secs() >= duration_secs {
        return match info.loop_mode {
            LoopMode::Track => TickAction::RestartClock,
            LoopMode::Off | LoopMode::Queue => TickAction::TrackElapsed,
        };
    }
    TickAction::Render {
        elapsed,
        duration_secs,
    }
}

pub(super) struct Reporter {
    pub tx: WeakUnboundedSender<SessionCmd>,
    pub playback: PlaybackHandle,
    pub notifier: Arc<dyn Notifier>,
    pub guild: GuildId,
    pub token: u64,
    pub interval: Duration,
    pub settings: ProgressSettings,
}

impl Reporter {
    fn signal(&self, cmd: SessionCmd) -> bool {
        match self.tx.upgrade() {
            Some(tx) => tx.send(cmd).is_ok(),
            None => false,
        }
    }

    pub(super) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the initial view went out
            // with the now-playing notice.
            ticker.tick().await;

            let mut editing = true;
            loop {
                ticker.tick().await;

                let action = match self.playback.lock() {
                    Ok(info) => evaluate_tick(&info, self.token, Instant::now()),
                    Err(_) => TickAction::Exit,
                };

                match action {
                    TickAction::Exit => break,
                    TickAction::TrackElapsed => {
                        self.signal(SessionCmd::TrackElapsed { token: self.token });
                        break;
                    }
                    TickAction::RestartClock => {
                        if !self.signal(SessionCmd::RestartClock { token: self.token }) {
                            break;
                        }
                    }
                    TickAction::Render {
                        elapsed,
                        duration_secs,
                    } => {
                        if !editing {
                            continue;
                        }
                        let view = render(elapsed, duration_secs, &self.settings);
                        if let Err(e) = self.notifier.edit_progress(self.guild, &view).await {
                            tracing::warn!(guild = %self.guild, "progress update failed, no more edits for this track: {e}");
                            editing = false;
                        }
                    }
                }
            }
            tracing::debug!(guild = %self.guild, token = self.token, "progress reporter finished");
        })
    }
}

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
use tokio::sync::oneshot;

use crate::error::SinkError;

use super::sink::EndReason;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub(super) enum OutputCmd {
    Play {
        path: PathBuf,
        done: oneshot::Sender<EndReason>,
        ack: oneshot::Sender<Result<(), SinkError>>,
    },
    Stop,
    Quit,
}

/// Open `path` and queue it on a fresh sink attached to `stream`.
fn create_sink(stream: &OutputStream, path: &Path) -> Result<Sink, SinkError> {
    let file = File::open(path).map_err(|source| SinkError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let source = Decoder::new(BufReader::new(file)).map_err(|e| SinkError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let sink = Sink::connect_new(stream.mixer());
    sink.append(source);
    Ok(sink)
}

struct Current {
    sink: Sink,
    done: oneshot::Sender<EndReason>,
}

impl Current {
    fn end(self, reason: EndReason) {
        self.sink.stop();
        // The session may have moved on already.
        let _ = self.done.send(reason);
    }
}

/// Spawn the thread that owns the output device. `ready` reports whether the
/// device could be opened; on failure the thread exits immediately.
pub(super) fn spawn_output_thread(
    rx: Receiver<OutputCmd>,
    playing: Arc<AtomicBool>,
    ready: oneshot::Sender<Result<(), SinkError>>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut stream = match OutputStreamBuilder::open_default_stream() {
            Ok(stream) => stream,
            Err(e) => {
                let _ = ready.send(Err(SinkError::Unavailable(e.to_string())));
                return;
            }
        };
        // rodio logs to stderr when OutputStream is dropped.
        stream.log_on_drop(false);
        let _ = ready.send(Ok(()));

        let mut current: Option<Current> = None;

        loop {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(OutputCmd::Play { path, done, ack }) => {
                    if let Some(old) = current.take() {
                        old.end(EndReason::Stopped);
                    }
                    match create_sink(&stream, &path) {
                        Ok(sink) => {
                            sink.play();
                            current = Some(Current { sink, done });
                            playing.store(true, Ordering::Relaxed);
                            let _ = ack.send(Ok(()));
                        }
                        Err(e) => {
                            playing.store(false, Ordering::Relaxed);
                            let _ = ack.send(Err(e));
                        }
                    }
                }
                Ok(OutputCmd::Stop) => {
                    if let Some(old) = current.take() {
                        old.end(EndReason::Stopped);
                    }
                    playing.store(false, Ordering::Relaxed);
                }
                Ok(OutputCmd::Quit) | Err(RecvTimeoutError::Disconnected) => {
                    if let Some(old) = current.take() {
                        old.end(EndReason::Stopped);
                    }
                    playing.store(false, Ordering::Relaxed);
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    // periodic check for natural end
                    if current.as_ref().is_some_and(|c| c.sink.empty()) {
                        if let Some(finished) = current.take() {
                            finished.end(EndReason::Finished);
                        }
                        playing.store(false, Ordering::Relaxed);
                    }
                }
            }
        }
    })
}

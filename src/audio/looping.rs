use crate::library::Track;

use super::queue::PlaybackQueue;
use super::types::LoopMode;

/// Decide what happens to a track that just stopped playing, before the next
/// one is dequeued. Returns the track when it leaves the session for good so
/// its media can be reclaimed.
pub(super) fn apply_loop_mode(
    finished: Track,
    mode: LoopMode,
    queue: &mut PlaybackQueue,
) -> Option<Track> {
    match mode {
        LoopMode::Off => Some(finished),
        LoopMode::Track => {
            queue.requeue_front(finished);
            None
        }
        LoopMode::Queue => {
            queue.requeue_back(finished);
            None
        }
    }
}

//! The per-guild FIFO of tracks waiting to be played.
//!
//! Deduplication keys on the resolver-provided `SourceKey`, so the same video
//! requested twice is refused even though every request downloads its own file.

use std::collections::VecDeque;
use std::path::Path;

use rand::seq::SliceRandom;

use crate::library::{SourceKey, Track};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Added,
    Duplicate,
}

#[derive(Debug, Default)]
pub struct PlaybackQueue {
    tracks: VecDeque<Track>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `track` unless its source is already queued or is `current`.
    ///
    /// On `Duplicate` the track is handed back so the caller can reclaim its media.
    pub fn enqueue(
        &mut self,
        track: Track,
        current: Option<&SourceKey>,
    ) -> Result<EnqueueOutcome, Track> {
        if current == Some(&track.key) || self.contains(&track.key) {
            return Err(track);
        }
        self.tracks.push_back(track);
        Ok(EnqueueOutcome::Added)
    }

    /// Pop the head. An empty queue is left untouched.
    pub fn dequeue(&mut self) -> Option<Track> {
        self.tracks.pop_front()
    }

    /// Put a track back at the head (loop mode `track`).
    pub(super) fn requeue_front(&mut self, track: Track) {
        self.tracks.push_front(track);
    }

    /// Put a track at the tail without the duplicate check (loop mode `queue`).
    pub(super) fn requeue_back(&mut self, track: Track) {
        self.tracks.push_back(track);
    }

    /// Empty the queue, returning the removed tracks. Media is not touched here.
    pub fn clear(&mut self) -> Vec<Track> {
        self.tracks.drain(..).collect()
    }

    pub fn shuffle(&mut self) {
        self.tracks.make_contiguous().shuffle(&mut rand::rng());
    }

    pub fn contains(&self, key: &SourceKey) -> bool {
        self.tracks.iter().any(|t| &t.key == key)
    }

    /// Whether a queued track plays from `path`.
    pub fn references(&self, path: &Path) -> bool {
        self.tracks.iter().any(|t| t.media.path() == path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

//! Plain-text rendering of engine replies for the console.

use std::time::Duration;

use crate::audio::{EnqueueReport, QueueSnapshot, SkipReport, StopReport, render};
use crate::config::ProgressSettings;

/// The tracklist: current track first, then the numbered queue.
pub fn queue_text(snapshot: &QueueSnapshot) -> String {
    let mut out = String::new();
    if let Some(now) = &snapshot.now_playing {
        out.push_str(&format!("Now playing: {}\n", now.title));
    }
    if snapshot.upcoming.is_empty() {
        out.push_str("The queue is empty.");
    } else {
        let lines: Vec<String> = snapshot
            .upcoming
            .iter()
            .enumerate()
            .map(|(i, t)| format!("{}. {}", i + 1, t.title))
            .collect();
        out.push_str(&lines.join("\n"));
    }
    out.push_str(&format!("\nLoop mode: {}", snapshot.loop_mode));
    out
}

pub fn now_playing_text(snapshot: &QueueSnapshot, settings: &ProgressSettings) -> String {
    match &snapshot.now_playing {
        Some(now) => {
            let view = render(
                Duration::from_secs(snapshot.elapsed_secs),
                now.duration_secs,
                settings,
            );
            format!("{} {} {}", now.title, view.bar, view.time)
        }
        None => "Nothing is playing.".to_string(),
    }
}

pub fn enqueue_text(report: &EnqueueReport) -> String {
    let mut lines = Vec::new();
    match (&report.playlist_title, report.added.as_slice()) {
        (Some(name), []) => lines.push(format!(
            "No new tracks from the playlist {name} were added to the queue."
        )),
        (Some(name), added) => lines.push(format!(
            "Added playlist {name} with {} tracks to the queue.",
            added.len()
        )),
        (None, added) => {
            for t in added {
                lines.push(format!("{} added to queue.", t.title));
            }
        }
    }
    for t in &report.duplicates {
        lines.push(format!("Track {} is already in the queue.", t.title));
    }
    lines.join("\n")
}

pub fn stop_text(report: &StopReport) -> String {
    if report.was_playing || report.cleared > 0 {
        format!(
            "Music playback has stopped. The queue has been cleared ({} removed).",
            report.cleared
        )
    } else {
        "Nothing was playing.".to_string()
    }
}

pub fn skip_text(report: &SkipReport) -> String {
    match &report.next {
        Some(next) => format!("Skipped {}. Now playing {}.", report.skipped.title, next.title),
        None => format!("Skipped {}. The queue is empty.", report.skipped.title),
    }
}

use std::path::Path;

use lofty::prelude::*;
use walkdir::WalkDir;

use crate::config::LibrarySettings;

use super::display::{FileTags, title_from_fields};
use super::model::{MediaLocator, SourceKey, Track};

pub(super) fn is_audio_file(path: &Path, settings: &LibrarySettings) -> bool {
    let exts: Vec<String> = settings
        .extensions
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect();

    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            exts.iter().any(|e| e == &ext)
        })
        .unwrap_or(false)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Build a track for one local audio file. Unreadable tags fall back to the file
/// stem and an unknown (0) duration.
pub fn read_track(path: &Path, settings: &LibrarySettings) -> Track {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("UNKNOWN")
        .to_string();

    let mut title = stem;
    let mut artist: Option<String> = None;
    let mut album: Option<String> = None;
    let mut duration_secs = 0;

    if let Ok(tagged) = lofty::read_from_path(path) {
        duration_secs = tagged.properties().duration().as_secs();

        if let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) {
            if let Some(v) = tag.title().filter(|v| !v.trim().is_empty()) {
                title = v.to_string();
            }
            artist = tag.artist().map(|v| v.trim().to_string());
            album = tag.album().map(|v| v.trim().to_string());
        }
    }

    let display = title_from_fields(
        path,
        &FileTags {
            title: &title,
            artist: artist.as_deref(),
            album: album.as_deref(),
        },
        &settings.display_fields,
        &settings.display_separator,
    );

    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    Track::new(
        SourceKey::new("file", &canonical.to_string_lossy()),
        display,
        MediaLocator::borrowed(canonical),
    )
    .with_duration(duration_secs)
}

/// Collect every audio file below `dir` as a track, in path order.
pub fn scan(dir: &Path, settings: &LibrarySettings) -> Vec<Track> {
    let mut walker = WalkDir::new(dir)
        .follow_links(settings.follow_links)
        .sort_by_file_name();

    // Non-recursive = only the root directory.
    let depth_cap = if settings.recursive {
        settings.max_depth
    } else {
        Some(1)
    };
    if let Some(d) = depth_cap {
        walker = walker.max_depth(d);
    }

    walker
        .into_iter()
        .filter_entry(|e| settings.include_hidden || e.depth() == 0 || !is_hidden(e.path()))
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_audio_file(entry.path(), settings))
        .map(|entry| read_track(entry.path(), settings))
        .collect()
}

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level engine settings loaded from `config.toml`.
///
/// File format: TOML
/// Default path (Linux/XDG): `$XDG_CONFIG_HOME/cadence/config.toml` or `~/.config/cadence/config.toml`
///
/// Precedence (highest wins):
/// 1) Environment variables (prefix `CADENCE__`, `__` as nested separator)
/// 2) Config file (if present)
/// 3) Struct defaults
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub playback: PlaybackSettings,
    pub progress: ProgressSettings,
    pub resolver: ResolverSettings,
    pub media: MediaSettings,
    pub library: LibrarySettings,
    pub console: ConsoleSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Loop mode a new guild session starts with.
    pub loop_mode: LoopModeSetting,
    /// Whether a skipped track still goes through the loop mode
    /// (replayed under `track`, recycled under `queue`). When false a skip
    /// always discards the current track.
    pub skip_respects_loop: bool,
    /// How long the bot may sit alone in a voice channel before leaving (seconds).
    pub abandon_grace_secs: u64,
    /// Progress refresh interval (milliseconds).
    pub progress_interval_ms: u64,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            loop_mode: LoopModeSetting::Off,
            skip_respects_loop: true,
            abandon_grace_secs: 10,
            progress_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoopModeSetting {
    #[serde(alias = "no_loop", alias = "no-loop", alias = "none")]
    Off,
    #[serde(
        alias = "loopone",
        alias = "loop_one",
        alias = "loop-one",
        alias = "repeat-one",
        alias = "single"
    )]
    Track,
    #[serde(
        alias = "loopall",
        alias = "loop_all",
        alias = "loop-all",
        alias = "loop-around",
        alias = "all"
    )]
    Queue,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProgressSettings {
    /// Number of cells in the progress bar, knob included.
    pub bar_width: usize,
    /// Which time fields to show next to the bar, and in what order.
    ///
    /// Example: ["elapsed", "total", "remaining"]
    pub time_fields: Vec<TimeField>,
    /// Separator used to join `time_fields`.
    pub time_separator: String,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            bar_width: 20,
            time_fields: vec![TimeField::Elapsed, TimeField::Total],
            time_separator: " / ".to_string(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeField {
    Elapsed,
    Total,
    Remaining,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolverSettings {
    /// `yt-dlp` executable (name on `PATH` or absolute path).
    pub ytdlp_program: String,
    /// Format selector passed to `yt-dlp -f`.
    pub format: String,
    /// Upper bound for a whole play request's resolution and download (seconds).
    pub timeout_secs: u64,
    /// Spotify client credentials. Spotify links are rejected without them.
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            ytdlp_program: "yt-dlp".to_string(),
            format: "bestaudio".to_string(),
            timeout_secs: 300,
            spotify_client_id: None,
            spotify_client_secret: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MediaSettings {
    /// Root of the per-guild download directories.
    pub root: PathBuf,
    /// Delete everything under `root` when the process starts.
    pub wipe_on_startup: bool,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("workspace").join("downloaded_music"),
            wipe_on_startup: true,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackDisplayField {
    /// "artist - title" when an artist is known, the bare title otherwise.
    Display,
    Title,
    Artist,
    Album,
    Filename,
    Path,
}

/// Settings for playing files from the local filesystem.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LibrarySettings {
    /// File extensions to treat as audio (case-insensitive, without dot).
    pub extensions: Vec<String>,
    /// Whether to follow symlinks during scanning.
    pub follow_links: bool,
    /// Whether to include hidden files/directories (dotfiles).
    pub include_hidden: bool,
    /// Whether to recurse into subdirectories.
    pub recursive: bool,
    /// Optional cap on directory recursion depth.
    pub max_depth: Option<usize>,

    /// Which fields to use to build a local track's title.
    ///
    /// Example: ["artist", "title"] -> "Artist - Title"
    pub display_fields: Vec<TrackDisplayField>,
    /// Separator used to join `display_fields`.
    pub display_separator: String,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            extensions: vec![
                "mp3".into(),
                "flac".into(),
                "wav".into(),
                "ogg".into(),
                "m4a".into(),
                "opus".into(),
            ],
            follow_links: true,
            include_hidden: false,
            recursive: true,
            max_depth: None,
            display_fields: vec![TrackDisplayField::Artist, TrackDisplayField::Title],
            display_separator: " - ".to_string(),
        }
    }
}

/// Identity used by the console front-end when it talks to the engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsoleSettings {
    pub guild_id: u64,
    pub channel_id: u64,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            guild_id: 1,
            channel_id: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing` filter directive, overridden by `RUST_LOG`.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

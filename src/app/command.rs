use thiserror::Error;

use crate::audio::GuildId;

/// One console command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play(String),
    Skip,
    Stop,
    Loop(String),
    Queue,
    Shuffle,
    NowPlaying,
    /// Simulate the number of members (besides the bot) in the voice channel.
    Listeners(usize),
    /// Simulate the voice connection dropping.
    VoiceLost,
    /// Switch the guild subsequent commands apply to.
    Guild(GuildId),
    Settings,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command {0:?}, try 'help'")]
    Unknown(String),

    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),

    #[error("expected a number, got {0:?}")]
    NotANumber(String),
}

fn number<T: std::str::FromStr>(arg: &str) -> Result<T, ParseError> {
    arg.parse().map_err(|_| ParseError::NotANumber(arg.to_string()))
}

fn required<'a>(name: &'static str, arg: &'a str) -> Result<&'a str, ParseError> {
    if arg.is_empty() {
        Err(ParseError::MissingArgument(name))
    } else {
        Ok(arg)
    }
}

/// Parse a console line. Blank lines are `Ok(None)`. A leading `!` (the chat
/// prefix) is accepted and ignored.
pub fn parse_command(line: &str) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    let line = line.strip_prefix('!').unwrap_or(line);
    if line.is_empty() {
        return Ok(None);
    }

    let (name, arg) = match line.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (line, ""),
    };

    let cmd = match name.to_ascii_lowercase().as_str() {
        "play" | "p" => Command::Play(required("play", arg)?.to_string()),
        "skip" | "next" => Command::Skip,
        "stop" => Command::Stop,
        "loop" => Command::Loop(required("loop", arg)?.to_string()),
        "queue" | "tracklist" | "q" => Command::Queue,
        "shuffle" => Command::Shuffle,
        "np" | "nowplaying" => Command::NowPlaying,
        "listeners" => Command::Listeners(number(required("listeners", arg)?)?),
        "voice-lost" | "disconnect" => Command::VoiceLost,
        "guild" => Command::Guild(GuildId(number(required("guild", arg)?)?)),
        "settings" | "config" => Command::Settings,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => return Err(ParseError::Unknown(name.to_string())),
    };
    Ok(Some(cmd))
}

pub const HELP: &str = "\
commands:
  play <url|path>   queue a YouTube/Spotify link or a local file/directory
  skip              skip the current track
  stop              stop, clear the queue and leave the channel
  loop <mode>       off | track | queue
  queue             list the queue (alias: tracklist)
  shuffle           shuffle the pending tracks
  np                show the current track and progress
  listeners <n>     pretend n members are in the voice channel
  voice-lost        pretend the voice connection dropped
  guild <id>        switch guild
  settings          print the effective settings
  quit              exit";

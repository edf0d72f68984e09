use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::app::{
    Command, HELP, enqueue_text, now_playing_text, parse_command, queue_text, skip_text, stop_text,
};
use crate::audio::{ChannelId, GuildId, Jukebox};
use crate::config;

enum Flow {
    Continue,
    Quit,
}

/// Guild and voice channel the console is currently acting as.
struct ConsoleState {
    guild: GuildId,
    channel: ChannelId,
}

/// Read commands from stdin until `quit` or end of input.
pub async fn run(
    jukebox: Arc<Jukebox>,
    settings: &config::Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut state = ConsoleState {
        guild: GuildId(settings.console.guild_id),
        channel: ChannelId(settings.console.channel_id),
    };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let cmd = match parse_command(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        if let Flow::Quit = handle(&jukebox, settings, &mut state, cmd).await {
            break;
        }
    }

    if let Err(e) = jukebox.stop(state.guild).await {
        tracing::warn!(guild = %state.guild, "failed to stop on exit: {e}");
    }
    Ok(())
}

async fn handle(
    jukebox: &Arc<Jukebox>,
    settings: &config::Settings,
    state: &mut ConsoleState,
    cmd: Command,
) -> Flow {
    let guild = state.guild;
    match cmd {
        Command::Play(url) => {
            // Downloads can take a while; keep reading commands so a stop can
            // race the request.
            let jukebox = jukebox.clone();
            let channel = state.channel;
            tokio::spawn(async move {
                match jukebox.play(guild, channel, &url).await {
                    Ok(report) => println!("{}", enqueue_text(&report)),
                    Err(e) => println!("Could not play {url}: {e}"),
                }
            });
        }
        Command::Skip => match jukebox.skip(guild).await {
            Ok(report) => println!("{}", skip_text(&report)),
            Err(e) => println!("{e}"),
        },
        Command::Stop => match jukebox.stop(guild).await {
            Ok(report) => println!("{}", stop_text(&report)),
            Err(e) => println!("{e}"),
        },
        Command::Loop(mode) => {
            if let Err(e) = jukebox.set_loop_mode(guild, &mode).await {
                println!("{e}");
            }
        }
        Command::Queue => match jukebox.list_queue(guild).await {
            Ok(snapshot) => println!("{}", queue_text(&snapshot)),
            Err(e) => println!("{e}"),
        },
        Command::Shuffle => match jukebox.shuffle(guild).await {
            Ok(0) => println!("Nothing to shuffle."),
            Ok(n) => println!("Shuffled {n} tracks."),
            Err(e) => println!("{e}"),
        },
        Command::NowPlaying => match jukebox.list_queue(guild).await {
            Ok(snapshot) => println!("{}", now_playing_text(&snapshot, &settings.progress)),
            Err(e) => println!("{e}"),
        },
        Command::Listeners(n) => jukebox.voice_members(guild, n),
        Command::VoiceLost => jukebox.voice_lost(guild),
        Command::Guild(id) => {
            state.guild = id;
            println!("Now acting in guild {id}.");
        }
        Command::Settings => match settings.to_toml() {
            Ok(text) => println!("{text}"),
            Err(e) => println!("failed to render settings: {e}"),
        },
        Command::Help => println!("{HELP}"),
        Command::Quit => return Flow::Quit,
    }
    Flow::Continue
}

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingSettings;

mod event_loop;
mod settings;
mod startup;

/// Logs go to stderr so they don't interleave with command output. `RUST_LOG`
/// wins over `logging.filter`.
fn init_logging(logging: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = settings::load_settings();
    init_logging(&settings.logging);

    startup::prepare_media_root(&settings.media).await?;
    let jukebox = Arc::new(startup::build_jukebox(&settings));
    tracing::info!(
        guild = settings.console.guild_id,
        channel = settings.console.channel_id,
        "ready, type 'help' for commands"
    );

    event_loop::run(jukebox, &settings).await
}

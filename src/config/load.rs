use std::env;
use std::path::PathBuf;

use crate::error::InvalidSetting;

use super::schema::Settings;

const ENV_PREFIX: &str = "CADENCE";
const PATH_OVERRIDE: &str = "CADENCE_CONFIG_PATH";
const APP_DIR: &str = "cadence";

impl Settings {
    /// Defaults, overlaid by `config.toml` when one exists, overlaid by
    /// `CADENCE__SECTION__KEY` variables.
    pub fn load() -> Result<Self, ::config::ConfigError> {
        let mut layers = ::config::Config::builder();
        if let Some(file) = resolve_config_path() {
            layers = layers.add_source(::config::File::from(file.as_path()).required(false));
        }
        layers
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Reject values a session cannot run with. Reports the first offender.
    pub fn validate(&self) -> Result<(), InvalidSetting> {
        let checks = [
            (
                self.playback.progress_interval_ms == 0,
                "playback.progress_interval_ms",
                "must be at least 1",
            ),
            (
                self.progress.bar_width < 2,
                "progress.bar_width",
                "must be at least 2",
            ),
            (
                self.resolver.timeout_secs == 0,
                "resolver.timeout_secs",
                "must be at least 1",
            ),
            (
                self.resolver.ytdlp_program.trim().is_empty(),
                "resolver.ytdlp_program",
                "must name a program",
            ),
        ];
        match checks.into_iter().find(|(bad, _, _)| *bad) {
            Some((_, key, problem)) => Err(InvalidSetting { key, problem }),
            None => Ok(()),
        }
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// `CADENCE_CONFIG_PATH` when set, the per-user location otherwise.
pub fn resolve_config_path() -> Option<PathBuf> {
    env::var_os(PATH_OVERRIDE)
        .map(PathBuf::from)
        .or_else(default_config_path)
}

/// `cadence/config.toml` under `$XDG_CONFIG_HOME`, or under `~/.config`.
pub fn default_config_path() -> Option<PathBuf> {
    env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
        .map(|base| base.join(APP_DIR).join("config.toml"))
}

use crate::config::Settings;

/// Settings for this run. Nothing about the config file keeps the bot from
/// starting: problems are printed (logging is not up yet) and defaults apply.
pub fn load_settings() -> Settings {
    let problem = match Settings::load() {
        Ok(settings) => match settings.validate() {
            Ok(()) => return settings,
            Err(invalid) => format!("has an unusable value: {invalid}"),
        },
        Err(e) => format!("could not be read: {e}"),
    };
    eprintln!("cadence: configuration {problem}; running with defaults");
    Settings::default()
}

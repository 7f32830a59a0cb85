mod settings;

use std::env;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, File};

pub use settings::{BrokerSettings, LogSettings, Settings};

/// Loads the configuration from the default file and environment variables
/// (`BROKER_URL`, `LOG_LEVEL`) and merges it over the default values.
pub fn load_config() -> Result<Settings, ConfigError> {
    // Only the two known variables are read; unrelated ones such as `LOG`
    // must not be mistaken for a settings table.
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .set_override_option("broker.url", env::var("BROKER_URL").ok())?
        .set_override_option("log.level", env::var("LOG_LEVEL").ok())?;

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    // Merge with defaults
    let default = Settings::default();

    Ok(Settings {
        broker: BrokerSettings {
            url: partial
                .broker
                .and_then(|b| b.url)
                .unwrap_or(default.broker.url),
        },
        log: LogSettings {
            level: partial
                .log
                .and_then(|l| l.level)
                .unwrap_or(default.log.level),
        },
    })
}

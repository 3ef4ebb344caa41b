//! Layered configuration: `config/default.toml` (optional), then
//! `DLQ_HERO_*` environment variables, merged over built-in defaults.
//!
//! Nested keys use a double underscore, e.g.
//! `DLQ_HERO_BROKER__STORE_PATH=/var/lib/dlq-hero`.

mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{
    BrokerSettings, LoggingSettings, OutputSettings, PipelineSettings, Settings,
};

const ENV_PREFIX: &str = "DLQ_HERO";

/// Loads `.env` (if any), the default config file and environment variables,
/// and merges them with default values.
pub fn load_config() -> Result<Settings, ConfigError> {
    let _ = dotenvy::dotenv();
    load_config_from("config/default")
}

/// Same as [`load_config`] but reads the file source from `path` (extension
/// optional) and does not touch `.env`.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(merge(partial, Settings::default()))
}

fn merge(partial: PartialSettings, default: Settings) -> Settings {
    let broker = partial.broker.as_ref();
    let pipeline = partial.pipeline.as_ref();

    Settings {
        broker: BrokerSettings {
            store_path: broker
                .and_then(|b| b.store_path.clone())
                .unwrap_or(default.broker.store_path),
            lock_duration_secs: broker
                .and_then(|b| b.lock_duration_secs)
                .unwrap_or(default.broker.lock_duration_secs),
            max_batch_bytes: broker
                .and_then(|b| b.max_batch_bytes)
                .unwrap_or(default.broker.max_batch_bytes),
        },
        pipeline: PipelineSettings {
            receive_batch_size: pipeline
                .and_then(|p| p.receive_batch_size)
                .filter(|n| *n > 0)
                .unwrap_or(default.pipeline.receive_batch_size),
            send_batch_size: pipeline
                .and_then(|p| p.send_batch_size)
                .filter(|n| *n > 0)
                .unwrap_or(default.pipeline.send_batch_size),
            channel_capacity: pipeline
                .and_then(|p| p.channel_capacity)
                .filter(|n| *n > 0)
                .unwrap_or(default.pipeline.channel_capacity),
        },
        output: OutputSettings {
            directory: partial
                .output
                .as_ref()
                .and_then(|o| o.directory.clone())
                .unwrap_or(default.output.directory),
        },
        logging: LoggingSettings {
            level: partial
                .logging
                .as_ref()
                .and_then(|l| l.level.clone())
                .unwrap_or(default.logging.level),
        },
    }
}

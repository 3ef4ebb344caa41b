use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Includes settings for the local broker, the transfer pipelines, where
/// drained files land, and logging.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub pipeline: PipelineSettings,
    pub output: OutputSettings,
    pub logging: LoggingSettings,
}

/// Configuration settings for the broker connection.
///
/// `store_path` plays the role of a connection string: it names the local
/// broker store every command runs against.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    pub store_path: String,
    pub lock_duration_secs: u64,
    pub max_batch_bytes: usize,
}

/// Flow-control knobs for the drain and publish pipelines.
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineSettings {
    /// Messages requested per dead-letter receive call.
    pub receive_batch_size: usize,
    /// Messages per outbound batch before it is sent.
    pub send_batch_size: usize,
    /// Capacity of the bounded channels between pipeline stages.
    pub channel_capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputSettings {
    pub directory: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

/// Whatever the config file and `DLQ_HERO_*` variables provide. Every
/// field is optional; `config::merge` fills the gaps from `Settings::default()`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub broker: Option<PartialBrokerSettings>,
    pub pipeline: Option<PartialPipelineSettings>,
    pub output: Option<PartialOutputSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub store_path: Option<String>,
    pub lock_duration_secs: Option<u64>,
    pub max_batch_bytes: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialPipelineSettings {
    pub receive_batch_size: Option<usize>,
    pub send_batch_size: Option<usize>,
    pub channel_capacity: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialOutputSettings {
    pub directory: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            store_path: "dlq_hero_db".to_string(),
            lock_duration_secs: 60,
            max_batch_bytes: 256 * 1024,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            receive_batch_size: 25,
            send_batch_size: 100,
            channel_capacity: 64,
        }
    }
}

/// Provides default values for `Settings`.
impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings::default(),
            pipeline: PipelineSettings::default(),
            output: OutputSettings {
                directory: ".".to_string(),
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

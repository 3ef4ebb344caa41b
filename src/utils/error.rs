//! Error taxonomy shared by the broker abstraction, the file store and the
//! transfer pipelines.
//!
//! Pipelines never drop a stage error: they either return it or carry it in
//! their report. The bulk operator wraps per-subscription failures in
//! [`Error::PartialFailure`] and keeps going.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The broker could not be reached or refused the call.
    #[error("broker unavailable: {0}")]
    Connectivity(String),

    /// A topic or subscription does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// A file could not be created, read or written.
    #[error("i/o failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted record could not be decoded. `line` is 1-based when the
    /// failure came from reading a file.
    #[error("malformed record{}: {source}", at_line(line))]
    Decode {
        line: Option<usize>,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    /// A single message does not fit into an otherwise empty batch.
    #[error("message of {size} bytes exceeds the batch limit of {max} bytes")]
    Capacity { size: usize, max: usize },

    /// One topic/subscription failed during a bulk pass.
    #[error("{topic}/{}: {source}", subscription.as_deref().unwrap_or("*"))]
    PartialFailure {
        topic: String,
        subscription: Option<String>,
        #[source]
        source: Box<Error>,
    },

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn decode(
        line: Option<usize>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Error::Decode {
            line,
            source: source.into(),
        }
    }

    pub fn not_found_subscription(topic: &str, subscription: &str) -> Self {
        Error::NotFound(format!("subscription '{topic}/{subscription}'"))
    }

    pub fn not_found_topic(topic: &str) -> Self {
        Error::NotFound(format!("topic '{topic}'"))
    }

    /// Wraps `self` as a per-pair failure of a bulk pass.
    pub fn partial(self, topic: &str, subscription: Option<&str>) -> Self {
        Error::PartialFailure {
            topic: topic.to_string(),
            subscription: subscription.map(str::to_string),
            source: Box::new(self),
        }
    }
}

fn at_line(line: &Option<usize>) -> String {
    line.map(|l| format!(" at line {l}")).unwrap_or_default()
}

impl From<sled::Error> for Error {
    fn from(e: sled::Error) -> Self {
        Error::Connectivity(format!("local store: {e}"))
    }
}

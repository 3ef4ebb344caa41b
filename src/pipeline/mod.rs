//! The `pipeline` module moves messages between the broker and record
//! files.
//!
//! Both pipelines are three concurrent stages joined on the calling task:
//! a producer, a consumer, and an error reporter. Stages are linked by
//! bounded channels. The producer closes its output by dropping the sender;
//! the consumer drains what is buffered and returns its count. Errors from
//! either stage go to the reporter and end up in the returned report, so a
//! run that stops early still says how far it got.

pub mod drain;
pub mod publish;

use std::fmt;

use tokio::sync::mpsc;
use tracing::error;

use crate::utils::Error;

pub use drain::{DrainReport, drain_dead_letters};
pub use publish::{PublishReport, publish_records};

/// The subscription an operation works against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub topic: String,
    pub subscription: String,
}

impl Target {
    pub fn new(topic: impl Into<String>, subscription: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            subscription: subscription.into(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.topic, self.subscription)
    }
}

/// Error stage: logs and keeps every error until all senders are gone.
async fn report_errors(mut errors: mpsc::Receiver<Error>, operation: &'static str) -> Vec<Error> {
    let mut collected = Vec::new();
    while let Some(e) = errors.recv().await {
        error!(operation, error = %e, "pipeline stage failed");
        collected.push(e);
    }
    collected
}

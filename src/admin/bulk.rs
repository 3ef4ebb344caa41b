//! Bulk dead-letter operator
//!
//! Resends or clears the dead letters of every subscription that has any.
//! Pairs are processed one at a time. A failure on one topic or
//! subscription is logged, recorded as a partial failure and skipped over;
//! only failing to list topics stops the pass.

use std::fmt;

use tracing::{debug, info, warn};

use crate::broker::{BrokerClient, BrokerDirectory};
use crate::utils::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
    /// Move dead letters back onto the active queue.
    Resend,
    /// Delete dead letters permanently.
    Clear,
}

impl fmt::Display for BulkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BulkAction::Resend => "resend",
            BulkAction::Clear => "clear",
        })
    }
}

#[derive(Debug)]
pub struct BulkReport {
    pub action: BulkAction,
    /// Messages resent or cleared. Failed pairs contribute nothing.
    pub total: u64,
    /// Subscriptions the action ran on.
    pub processed: u64,
    /// Subscriptions with no dead letters.
    pub skipped: u64,
    pub failures: Vec<Error>,
}

impl BulkReport {
    fn new(action: BulkAction) -> Self {
        Self {
            action,
            total: 0,
            processed: 0,
            skipped: 0,
            failures: Vec::new(),
        }
    }
}

pub async fn run_bulk<D, C>(directory: &D, client: &C, action: BulkAction) -> Result<BulkReport>
where
    D: BrokerDirectory + ?Sized,
    C: BrokerClient + ?Sized,
{
    let topics = directory.list_topics().await?;
    let mut report = BulkReport::new(action);

    for topic in &topics {
        let subscriptions = match directory.list_subscriptions(topic).await {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                warn!(%topic, error = %e, "failed to list subscriptions, skipping topic");
                report.failures.push(e.partial(topic, None));
                continue;
            }
        };

        for subscription in &subscriptions {
            match apply(directory, client, action, topic, subscription).await {
                Ok(Some(count)) => {
                    info!(%action, %topic, %subscription, count, "dead letters processed");
                    report.total += count;
                    report.processed += 1;
                }
                Ok(None) => {
                    debug!(%topic, %subscription, "no dead letters");
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(%action, %topic, %subscription, error = %e, "bulk action failed, continuing");
                    report.failures.push(e.partial(topic, Some(subscription)));
                }
            }
        }
    }

    info!(
        %action,
        total = report.total,
        processed = report.processed,
        skipped = report.skipped,
        failures = report.failures.len(),
        "bulk pass finished"
    );
    Ok(report)
}

/// `Ok(None)` when the pair has nothing dead-lettered.
async fn apply<D, C>(
    directory: &D,
    client: &C,
    action: BulkAction,
    topic: &str,
    subscription: &str,
) -> Result<Option<u64>>
where
    D: BrokerDirectory + ?Sized,
    C: BrokerClient + ?Sized,
{
    let stats = directory.get_stats(topic, subscription).await?;
    if stats.dead_letter == 0 {
        return Ok(None);
    }

    let count = match action {
        BulkAction::Resend => client.resend_dead_letter(topic, subscription).await?,
        BulkAction::Clear => client.clear_dead_letter(topic, subscription).await?,
    };
    Ok(Some(count))
}

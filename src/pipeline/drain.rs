//! Dead-letter drain
//!
//! Copies (peek-lock) or moves (receive-and-delete) the dead letters of one
//! subscription into a record file without holding the backlog in memory.
//!
//! The dead-letter count read up front is only a target: other consumers
//! may change it while the drain runs. The receive loop stops when it has
//! received that many messages or when a receive comes back empty.

use std::path::Path;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::broker::{
    BrokerClient, BrokerDirectory, MessageReceiver, ReceiveMode, ReceivedMessage, SubQueue,
};
use crate::config::PipelineSettings;
use crate::persistence::RecordWriter;
use crate::pipeline::{Target, report_errors};
use crate::record::to_record;
use crate::utils::{Error, Result};

#[derive(Debug, Default)]
pub struct DrainReport {
    /// Dead-letter count when the drain started.
    pub target: u64,
    pub received: u64,
    pub written: u64,
    pub errors: Vec<Error>,
}

impl DrainReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty() && self.written == self.received
    }
}

/// Drains the dead-letter sub-queue of `target` into the record file at
/// `path`.
///
/// Returns `Err` only when nothing was moved: the stats lookup, file
/// creation or receiver setup failed. Failures after that are carried in
/// the report next to the counts already achieved.
pub async fn drain_dead_letters<D, C>(
    directory: &D,
    client: &C,
    target: &Target,
    path: impl AsRef<Path>,
    mode: ReceiveMode,
    settings: &PipelineSettings,
) -> Result<DrainReport>
where
    D: BrokerDirectory + ?Sized,
    C: BrokerClient + ?Sized,
{
    let stats = directory
        .get_stats(&target.topic, &target.subscription)
        .await?;
    let goal = stats.dead_letter;

    if goal == 0 {
        info!(%target, "dead-letter queue is empty, nothing to drain");
        return Ok(DrainReport::default());
    }

    if mode.is_destructive() {
        warn!(%target, goal, "receive-and-delete: drained messages are removed from the broker");
    }

    let writer = RecordWriter::create(path).await?;
    info!(%target, goal, mode = mode.label(), file = %writer.path().display(), "draining dead letters");

    let mut receiver = client
        .receiver(&target.topic, &target.subscription, SubQueue::DeadLetter, mode)
        .await?;

    let (message_tx, message_rx) = mpsc::channel(settings.channel_capacity);
    let (error_tx, error_rx) = mpsc::channel(settings.channel_capacity);

    let (received, written, mut errors) = tokio::join!(
        receive_loop(
            receiver.as_mut(),
            goal,
            settings.receive_batch_size,
            message_tx,
            error_tx.clone(),
        ),
        write_records(writer, message_rx, error_tx),
        report_errors(error_rx, "drain"),
    );

    if let Err(e) = receiver.close().await {
        warn!(%target, error = %e, "failed to close dead-letter receiver");
        errors.push(e);
    }

    info!(%target, goal, received, written, failures = errors.len(), "drain finished");
    Ok(DrainReport {
        target: goal,
        received,
        written,
        errors,
    })
}

/// Producer stage. Owns the only message sender; returning closes it.
async fn receive_loop(
    receiver: &mut dyn MessageReceiver,
    goal: u64,
    batch_size: usize,
    messages: mpsc::Sender<ReceivedMessage>,
    errors: mpsc::Sender<Error>,
) -> u64 {
    let mut received = 0u64;

    while received < goal {
        let want = (goal - received).min(batch_size as u64) as usize;
        let batch = match receiver.receive(want).await {
            Ok(batch) => batch,
            Err(e) => {
                let _ = errors.send(e).await;
                break;
            }
        };

        if batch.is_empty() {
            info!(received, goal, "dead-letter queue exhausted before target");
            break;
        }

        received += batch.len() as u64;
        debug!(received, goal, "received dead-letter batch");

        for message in batch {
            // writer gave up and reported why
            if messages.send(message).await.is_err() {
                return received;
            }
        }
    }

    received
}

/// Consumer stage. Returns how many records reached the file.
async fn write_records(
    mut writer: RecordWriter,
    mut messages: mpsc::Receiver<ReceivedMessage>,
    errors: mpsc::Sender<Error>,
) -> u64 {
    while let Some(message) = messages.recv().await {
        if let Err(e) = writer.append(&to_record(&message)).await {
            let _ = errors.send(e).await;
            return writer.written();
        }
    }

    let written = writer.written();
    match writer.finish().await {
        Ok(written) => written,
        Err(e) => {
            let _ = errors.send(e).await;
            written
        }
    }
}

//! Record republishing
//!
//! Replays a record file onto a topic. Reading and decoding overlap with
//! network sends: one stage turns records into sendable messages, the other
//! packs them into batches and sends each batch as it fills.
//!
//! A batch is sent when it holds `send_batch_size` messages, or earlier when
//! the next message would push it past the broker's byte limit. Whatever is
//! left at end of input goes out as one final batch. A message too large
//! for an empty batch, or a failed send, stops the run; batches already sent
//! stay sent.

use std::path::Path;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::broker::{AddError, BrokerClient, MessageBatch, MessageSender, SendableMessage};
use crate::config::PipelineSettings;
use crate::persistence::RecordReader;
use crate::pipeline::report_errors;
use crate::record::to_sendable;
use crate::utils::{Error, Result};

#[derive(Debug, Default)]
pub struct PublishReport {
    /// Records read from the file, including ones that failed to convert.
    pub read: u64,
    pub sent: u64,
    pub batches: u64,
    pub errors: Vec<Error>,
}

impl PublishReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Default)]
struct SendProgress {
    sent: u64,
    batches: u64,
}

/// Publishes every record in `path` to `topic`.
///
/// Returns `Err` only when the file or the sender cannot be opened.
pub async fn publish_records<C>(
    client: &C,
    topic: &str,
    path: impl AsRef<Path>,
    settings: &PipelineSettings,
) -> Result<PublishReport>
where
    C: BrokerClient + ?Sized,
{
    let reader = RecordReader::open(path).await?;
    info!(topic, file = %reader.path().display(), "publishing records");

    let mut sender = client.sender(topic).await?;

    let (message_tx, message_rx) = mpsc::channel(settings.channel_capacity);
    let (error_tx, error_rx) = mpsc::channel(settings.channel_capacity);

    let (read, progress, mut errors) = tokio::join!(
        read_and_convert(reader, message_tx, error_tx.clone()),
        batch_and_send(
            sender.as_mut(),
            message_rx,
            settings.send_batch_size,
            error_tx,
        ),
        report_errors(error_rx, "publish"),
    );

    if let Err(e) = sender.close().await {
        warn!(topic, error = %e, "failed to close sender");
        errors.push(e);
    }

    info!(topic, read, sent = progress.sent, batches = progress.batches, failures = errors.len(), "publish finished");
    Ok(PublishReport {
        read,
        sent: progress.sent,
        batches: progress.batches,
        errors,
    })
}

/// Producer stage. A record that fails to convert is reported and skipped;
/// a read failure ends the stage.
async fn read_and_convert(
    mut reader: RecordReader,
    messages: mpsc::Sender<SendableMessage>,
    errors: mpsc::Sender<Error>,
) -> u64 {
    let mut read = 0u64;

    loop {
        match reader.next_record().await {
            Ok(Some(record)) => {
                read += 1;
                match to_sendable(&record) {
                    Ok(message) => {
                        if messages.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = errors.send(e).await;
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                let _ = errors.send(e).await;
                break;
            }
        }
    }

    read
}

/// Consumer stage. Returning drops the receiver, which stops the reader.
async fn batch_and_send(
    sender: &mut dyn MessageSender,
    mut messages: mpsc::Receiver<SendableMessage>,
    max_messages: usize,
    errors: mpsc::Sender<Error>,
) -> SendProgress {
    let mut progress = SendProgress::default();
    let mut batch = sender.create_batch();

    while let Some(message) = messages.recv().await {
        if let Err(e) = add_to_batch(sender, &mut batch, message, &mut progress).await {
            let _ = errors.send(e).await;
            return progress;
        }

        if batch.len() >= max_messages {
            let full = std::mem::replace(&mut batch, sender.create_batch());
            if let Err(e) = transmit(sender, full, &mut progress).await {
                let _ = errors.send(e).await;
                return progress;
            }
        }
    }

    if !batch.is_empty() {
        if let Err(e) = transmit(sender, batch, &mut progress).await {
            let _ = errors.send(e).await;
        }
    }

    progress
}

async fn add_to_batch(
    sender: &mut dyn MessageSender,
    batch: &mut MessageBatch,
    message: SendableMessage,
    progress: &mut SendProgress,
) -> Result<()> {
    let message = match batch.try_add(message) {
        Ok(()) => return Ok(()),
        Err(AddError::Full(message)) => message,
        Err(AddError::TooLarge { size, max }) => return Err(Error::Capacity { size, max }),
    };

    // flush before the batch would overflow, then start over
    let full = std::mem::replace(batch, sender.create_batch());
    transmit(sender, full, progress).await?;

    let max = batch.max_bytes();
    batch.try_add(message).map_err(|e| match e {
        AddError::TooLarge { size, max } => Error::Capacity { size, max },
        AddError::Full(message) => Error::Capacity {
            size: message.encoded_len(),
            max,
        },
    })
}

async fn transmit(
    sender: &mut dyn MessageSender,
    batch: MessageBatch,
    progress: &mut SendProgress,
) -> Result<()> {
    let count = batch.len() as u64;
    sender.send_batch(batch).await?;

    progress.sent += count;
    progress.batches += 1;
    info!(sent = progress.sent, batch = count, "batch sent");
    Ok(())
}

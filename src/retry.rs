//! Moves failed messages from a dead-letter queue back to their main queue.
//!
//! A redrive is two phases: every message is resent to the main queue, then
//! the ones that were resent are deleted from the dead-letter queue using the
//! receipt handle of the delivery that was polled. The two phases can fail
//! independently per message, which is why [`RetryOutcome`] has three
//! counters instead of a success flag.

use std::collections::HashSet;

use futures_util::future::try_join_all;
use serde::Serialize;

use crate::{
    error::Error,
    message::Message,
    sqs::{
        is_fifo,
        types::{
            BatchResultErrorEntry, DeleteMessageBatchRequest, DeleteMessageBatchRequestEntry,
            SendMessageBatchRequest, SendMessageBatchRequestEntry,
        },
        Transport, TransportExt,
    },
};

/// Largest number of entries SQS accepts in one batch call.
pub const MAX_BATCH_SIZE: usize = 10;

/// Tally of one [`retry`] call.
///
/// `retried + not_retried + retried_but_not_deleted` always equals the number
/// of messages handed to [`retry`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryOutcome {
    /// Resent to the main queue and removed from the dead-letter queue.
    pub retried: usize,
    /// Could not be resent; still only in the dead-letter queue.
    pub not_retried: usize,
    /// Resent but not removed, so now present in both queues.
    pub retried_but_not_deleted: usize,
}

impl RetryOutcome {
    pub fn total(&self) -> usize {
        self.retried + self.not_retried + self.retried_but_not_deleted
    }

    pub fn is_complete(&self) -> bool {
        self.not_retried == 0 && self.retried_but_not_deleted == 0
    }
}

/// A polled message checked to carry what a redrive needs.
struct Redrivable<'a> {
    id: &'a str,
    receipt_handle: &'a str,
    message: &'a Message,
}

impl<'a> Redrivable<'a> {
    fn new(message: &'a Message) -> Result<Self, Error> {
        let id = message
            .id()
            .ok_or_else(|| Error::invalid_message("message has no MessageId"))?;
        let receipt_handle = message.receipt_handle.as_deref().ok_or_else(|| {
            Error::invalid_message(format!("message {id} has no ReceiptHandle"))
        })?;

        Ok(Self {
            id,
            receipt_handle,
            message,
        })
    }

    fn send_entry(&self, fifo: bool) -> SendMessageBatchRequestEntry {
        let (group_id, deduplication_id) = if fifo {
            (
                self.message.group_id().map(str::to_owned),
                self.message.deduplication_id().map(str::to_owned),
            )
        } else {
            (None, None)
        };

        SendMessageBatchRequestEntry {
            id: self.id.to_owned(),
            message_body: self.message.body().to_owned(),
            message_attributes: self.message.message_attributes.clone(),
            message_deduplication_id: deduplication_id,
            message_group_id: group_id,
        }
    }

    fn delete_entry(&self) -> DeleteMessageBatchRequestEntry {
        DeleteMessageBatchRequestEntry {
            id: self.id.to_owned(),
            receipt_handle: self.receipt_handle.to_owned(),
        }
    }
}

fn failed_ids(failed: Vec<BatchResultErrorEntry>) -> impl Iterator<Item = String> {
    failed.into_iter().map(|entry| {
        tracing::debug!(id = %entry.id, code = %entry.code, message = ?entry.message, "batch entry failed");
        entry.id
    })
}

/// Resends `messages` to `queue_url` and deletes them from `dlq_url`.
///
/// Batches within a phase run concurrently; the delete phase only starts once
/// every send batch has answered, because only successfully sent messages are
/// deleted. A message without an id or receipt handle, or two messages with
/// the same id, abort the whole call before anything is sent. Call-level failures propagate as errors and are
/// not retried here.
#[tracing::instrument(skip(transport, messages), fields(count = messages.len()))]
pub async fn retry<T>(
    transport: &T,
    queue_url: &str,
    dlq_url: &str,
    messages: &[Message],
) -> Result<RetryOutcome, Error>
where
    T: Transport + ?Sized,
{
    if messages.is_empty() {
        return Ok(RetryOutcome::default());
    }

    let mut seen = HashSet::new();
    let messages = messages
        .iter()
        .map(|message| {
            let redrivable = Redrivable::new(message)?;
            if !seen.insert(redrivable.id) {
                return Err(Error::invalid_message(format!(
                    "duplicate MessageId {}",
                    redrivable.id
                )));
            }
            Ok(redrivable)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let fifo = is_fifo(queue_url);
    let sends = messages.chunks(MAX_BATCH_SIZE).map(|batch| {
        transport.send_message_batch(SendMessageBatchRequest {
            queue_url: queue_url.to_owned(),
            entries: batch.iter().map(|m| m.send_entry(fifo)).collect(),
        })
    });

    let not_sent: HashSet<String> = try_join_all(sends)
        .await?
        .into_iter()
        .flat_map(|response| failed_ids(response.failed))
        .collect();

    let to_delete: Vec<&Redrivable> = messages
        .iter()
        .filter(|m| !not_sent.contains(m.id))
        .collect();

    let deletes = to_delete.chunks(MAX_BATCH_SIZE).map(|batch| {
        transport.delete_message_batch(DeleteMessageBatchRequest {
            queue_url: dlq_url.to_owned(),
            entries: batch.iter().map(|m| m.delete_entry()).collect(),
        })
    });

    let mut outcome = RetryOutcome {
        not_retried: not_sent.len(),
        ..Default::default()
    };

    for response in try_join_all(deletes).await? {
        outcome.retried += response.successful.len();
        outcome.retried_but_not_deleted += failed_ids(response.failed).count();
    }

    if outcome.retried_but_not_deleted > 0 {
        tracing::warn!(
            count = outcome.retried_but_not_deleted,
            dlq_url,
            "messages were sent back to the queue but could not be deleted from the dead letter queue, they are now duplicated"
        );
    }

    tracing::debug!(?outcome, "retry finished");

    Ok(outcome)
}

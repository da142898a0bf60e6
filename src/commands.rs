//! Operator-facing operations on the dead-letter queue of a deployed queue.
//!
//! - [`Commands::list_failed`] lists the failed messages (`failed`)
//! - [`Commands::purge_failed`] deletes them all (`failed:purge`)
//! - [`Commands::retry_failed`] moves them back to the main queue (`failed:retry`)
//! - [`Commands::send`] sends a message to the main queue (`send`)
//!
//! Queue URLs are resolved when a command runs, so a queue that is not
//! deployed yet only fails the commands that need it.

use std::{fmt, time::Duration};

use itertools::Itertools as _;
use serde::Serialize;

use crate::{
    config::Config,
    error::Error,
    message::Message,
    outputs::QueueOutputs,
    poll::{poll, PollOptions},
    progress::Progress,
    purge::{purge, DEFAULT_PURGE_SETTLE},
    retry::{retry, RetryOutcome},
    sqs::{is_fifo, types::SendMessageRequest, types::SendMessageResponse, Transport, TransportExt},
};

#[derive(Debug, Clone, PartialEq, Eq, bon::Builder)]
pub struct Settings {
    #[builder(default)]
    pub poll: PollOptions,
    #[builder(default = DEFAULT_PURGE_SETTLE)]
    pub purge_settle: Duration,
    /// Upper bound on poll+retry cycles of a single `failed:retry`.
    #[builder(default = 100)]
    pub max_retry_rounds: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            poll: config.poll_options(),
            purge_settle: config.purge_settle(),
            max_retry_rounds: config.max_retry_rounds(),
        }
    }
}

/// Result of `failed`.
#[derive(Debug, Clone, Serialize)]
pub struct FailedMessages {
    pub queue: String,
    pub messages: Vec<Message>,
}

impl fmt::Display for FailedMessages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.messages.is_empty() {
            return write!(f, "{}: no failed messages found", self.queue);
        }

        writeln!(
            f,
            "{}: {} failed message{} found in the dead letter queue",
            self.queue,
            self.messages.len(),
            if self.messages.len() == 1 { "" } else { "s" }
        )?;

        for message in &self.messages {
            write!(f, "\n{}", message.id().unwrap_or("<no id>"))?;
            if let Some(sent_at) = message.sent_at() {
                write!(f, " (sent {})", sent_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
            }
            if let Some(count) = message.receive_count() {
                write!(f, " received {count} time{}", if count == 1 { "" } else { "s" })?;
            }
            writeln!(f)?;
            writeln!(
                f,
                "{}",
                message.pretty_body().lines().map(|line| format!("  {line}")).join("\n")
            )?;
        }

        Ok(())
    }
}

/// Result of `failed:retry`, summed over every poll+retry cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryReport {
    pub queue: String,
    /// Poll+retry cycles that found messages.
    pub rounds: u32,
    pub found: usize,
    #[serde(flatten)]
    pub outcome: RetryOutcome,
    /// Why the loop stopped before the dead-letter queue was drained.
    pub warnings: Vec<String>,
}

impl RetryReport {
    fn add(&mut self, outcome: RetryOutcome) {
        self.outcome.retried += outcome.retried;
        self.outcome.not_retried += outcome.not_retried;
        self.outcome.retried_but_not_deleted += outcome.retried_but_not_deleted;
    }
}

impl fmt::Display for RetryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.found == 0 {
            write!(f, "{}: no failed messages to retry", self.queue)?;
        } else {
            write!(
                f,
                "{}: {} failed message{} moved back to the main queue",
                self.queue,
                self.outcome.retried,
                if self.outcome.retried == 1 { "" } else { "s" }
            )?;
        }

        for warning in &self.warnings {
            write!(f, "\nWarning: {warning}")?;
        }

        Ok(())
    }
}

/// Runs the dead-letter queue commands of one queue construct.
pub struct Commands<T, O> {
    transport: T,
    outputs: O,
    progress: Box<dyn Progress + Send>,
    settings: Settings,
}

impl<T, O> Commands<T, O>
where
    T: Transport,
    O: QueueOutputs + Sync,
{
    pub fn new(transport: T, outputs: O) -> Self {
        Self {
            transport,
            outputs,
            progress: Box::new(()),
            settings: Settings::default(),
        }
    }

    pub fn with_progress(mut self, progress: impl Progress + Send + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn poll_failed(&self, dlq_url: &str) -> Result<Vec<Message>, Error> {
        let on_progress = |count: usize| {
            self.progress.update(&format!(
                "Polling failed messages from the dead letter queue ({count} found)"
            ))
        };

        self.progress
            .update("Polling failed messages from the dead letter queue");
        poll(&self.transport, dlq_url, &self.settings.poll, Some(&on_progress)).await
    }

    /// Lists the messages currently in the dead-letter queue.
    pub async fn list_failed(&self) -> Result<FailedMessages, Error> {
        let dlq_url = self.outputs.require_dead_letter_queue_url()?;

        let messages = self.poll_failed(&dlq_url).await?;

        Ok(FailedMessages {
            queue: self.outputs.id().to_owned(),
            messages,
        })
    }

    /// Deletes every message in the dead-letter queue.
    pub async fn purge_failed(&self) -> Result<(), Error> {
        let dlq_url = self.outputs.require_dead_letter_queue_url()?;

        self.progress
            .update("Purging the dead letter queue of failed messages");
        purge(&self.transport, &dlq_url, self.settings.purge_settle).await
    }

    /// Moves failed messages back to the main queue until the dead-letter
    /// queue looks empty or a cycle only partially succeeds.
    ///
    /// Partial failures stop the loop instead of being retried: redriving a
    /// message that was sent but not deleted would duplicate it again.
    pub async fn retry_failed(&self) -> Result<RetryReport, Error> {
        let queue_url = self.outputs.require_queue_url()?;
        let dlq_url = self.outputs.require_dead_letter_queue_url()?;

        let mut report = RetryReport {
            queue: self.outputs.id().to_owned(),
            ..Default::default()
        };

        self.retry_loop(&queue_url, &dlq_url, &mut report).await?;

        tracing::info!(
            queue = %report.queue,
            rounds = report.rounds,
            retried = report.outcome.retried,
            "retry finished"
        );

        Ok(report)
    }

    async fn retry_loop(
        &self,
        queue_url: &str,
        dlq_url: &str,
        report: &mut RetryReport,
    ) -> Result<(), Error> {
        loop {
            let messages = self.poll_failed(dlq_url).await?;
            if messages.is_empty() {
                return Ok(());
            }

            if report.rounds >= self.settings.max_retry_rounds {
                report.warnings.push(format!(
                    "Stopped after {} rounds, {} failed messages remain in the dead letter queue.",
                    report.rounds,
                    messages.len()
                ));
                return Ok(());
            }

            report.rounds += 1;
            report.found += messages.len();
            self.progress.update(&format!(
                "Moving {} failed messages back to the main queue",
                messages.len()
            ));

            let outcome = retry(&self.transport, queue_url, dlq_url, &messages).await?;
            report.add(outcome);

            if outcome.not_retried > 0 {
                report.warnings.push(format!(
                    "{} failed message{} could not be retried and remain in the dead letter queue, maybe try again?",
                    outcome.not_retried,
                    if outcome.not_retried == 1 { "" } else { "s" }
                ));
            }
            if outcome.retried_but_not_deleted > 0 {
                report.warnings.push(format!(
                    "{} failed message{} moved back to the main queue could not be deleted from the dead letter queue, they are now present in both queues.",
                    outcome.retried_but_not_deleted,
                    if outcome.retried_but_not_deleted == 1 { "" } else { "s" }
                ));
            }
            if !outcome.is_complete() {
                return Ok(());
            }
        }
    }

    /// Sends one message to the main queue.
    ///
    /// FIFO queues need a group id; their deduplication id is derived from
    /// the body, so sending the same body twice within five minutes is a no-op.
    pub async fn send(
        &self,
        body: impl Into<String>,
        group_id: Option<String>,
    ) -> Result<SendMessageResponse, Error> {
        let queue_url = self.outputs.require_queue_url()?;
        let body = body.into();

        let (message_group_id, message_deduplication_id) = if is_fifo(&queue_url) {
            let group_id = group_id.ok_or_else(|| {
                Error::invalid_parameter("a group id is required to send to a FIFO queue")
            })?;
            (Some(group_id), Some(hex::encode(md5::compute(&body).0)))
        } else {
            if group_id.is_some() {
                tracing::warn!(%queue_url, "ignoring group id, the queue is not a FIFO queue");
            }
            (None, None)
        };

        let response = self
            .transport
            .send_message(SendMessageRequest {
                queue_url,
                message_body: body,
                message_attributes: Default::default(),
                message_deduplication_id,
                message_group_id,
            })
            .await?;

        tracing::info!(message_id = %response.message_id, "message sent");

        Ok(response)
    }
}

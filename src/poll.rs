//! Best-effort listing of the messages currently sitting on a queue.
//!
//! A single `ReceiveMessage` call is not guaranteed to return every available
//! message, since SQS samples a subset of its servers. The poller therefore
//! runs several staggered receive rounds with a short visibility timeout and
//! merges what they return by message id. The result converges toward "all
//! visible messages" but is a snapshot, never a guaranteed complete list.

use std::{collections::HashMap, time::Duration};

use futures_util::{stream::FuturesUnordered, StreamExt};

use crate::{
    error::Error,
    message::Message,
    sqs::{
        types::{ReceiveMessageRequest, ReceiveMessageResponse, ALL_ATTRIBUTES},
        Transport, TransportExt,
    },
};

/// Tuning of a poll. The defaults suit an interactive listing.
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder)]
pub struct PollOptions {
    /// Number of receive rounds.
    #[builder(default = 3)]
    pub rounds: u32,
    /// Delay between the start of two consecutive rounds.
    #[builder(default = Duration::from_millis(200))]
    pub round_delay: Duration,
    /// Server-side long-poll wait of each receive.
    #[builder(default = 3)]
    pub wait_time_seconds: u32,
    /// Messages requested per receive, at most 10.
    #[builder(default = 10)]
    pub max_messages: u32,
    /// Seconds received messages stay hidden from other consumers.
    #[builder(default = 1)]
    pub visibility_timeout: u32,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Deduplicating accumulator for poll rounds.
///
/// A redelivered message is not added again, but its receipt handle is
/// replaced: only the handle of the latest delivery can delete it.
#[derive(Debug, Default)]
struct Accumulator {
    positions: HashMap<String, usize>,
    messages: Vec<Message>,
}

impl Accumulator {
    fn merge(&mut self, messages: Vec<Message>) {
        for message in messages {
            let Some(id) = message.id() else {
                self.messages.push(message);
                continue;
            };

            match self.positions.get(id) {
                Some(&position) => {
                    if message.receipt_handle.is_some() {
                        self.messages[position].receipt_handle = message.receipt_handle;
                    }
                }
                None => {
                    self.positions.insert(id.to_owned(), self.messages.len());
                    self.messages.push(message);
                }
            }
        }
    }

    fn len(&self) -> usize {
        self.messages.len()
    }
}

/// Polls `queue_url` and returns the messages seen, deduplicated by id.
///
/// Rounds are started `round_delay` apart without waiting for earlier rounds
/// to finish, then all of them are awaited. A failed round fails the whole
/// poll. `on_progress` receives the running total after each round that
/// leaves it non-zero.
#[tracing::instrument(skip(transport, options, on_progress), fields(rounds = options.rounds))]
pub async fn poll<T>(
    transport: &T,
    queue_url: &str,
    options: &PollOptions,
    on_progress: Option<&(dyn Fn(usize) + Sync)>,
) -> Result<Vec<Message>, Error>
where
    T: Transport + ?Sized,
{
    let receive = || {
        transport.receive_message(ReceiveMessageRequest {
            queue_url: queue_url.to_owned(),
            max_number_of_messages: options.max_messages,
            wait_time_seconds: options.wait_time_seconds,
            visibility_timeout: options.visibility_timeout,
            attribute_names: vec![ALL_ATTRIBUTES.to_owned()],
            message_attribute_names: vec![ALL_ATTRIBUTES.to_owned()],
        })
    };

    let mut accumulator = Accumulator::default();
    let mut merge = |messages: Option<Vec<Message>>| {
        accumulator.merge(messages.unwrap_or_default());
        let total = accumulator.len();
        if let (Some(report), true) = (on_progress, total > 0) {
            report(total);
        }
    };

    let mut in_flight = FuturesUnordered::new();

    for round in 0..options.rounds {
        if round > 0 {
            // Keep earlier rounds progressing while waiting to start the next one.
            let delay = tokio::time::sleep(options.round_delay);
            tokio::pin!(delay);
            loop {
                tokio::select! {
                    _ = &mut delay => break,
                    Some(response) = in_flight.next() => {
                        let response: Result<ReceiveMessageResponse, Error> = response;
                        merge(response?.messages)
                    }
                }
            }
        }

        tracing::trace!(round, "starting receive round");
        in_flight.push(receive());
    }

    while let Some(response) = in_flight.next().await {
        merge(response?.messages);
    }

    tracing::debug!(count = accumulator.len(), "poll finished");

    Ok(accumulator.messages)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::sqs::{memory::InMemoryTransport, method::Method, types::SqsRequest};

    const DLQ: &str = "https://sqs.local/000000000000/jobs-dlq";

    async fn seed(sqs: &InMemoryTransport, count: usize) {
        for i in 0..count {
            sqs.seed(
                DLQ,
                Message {
                    message_id: Some(format!("m{i}")),
                    body: Some(format!("body {i}")),
                    ..Default::default()
                },
            )
            .await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_redelivered_messages_are_counted_once() {
        let sqs = InMemoryTransport::new();
        seed(&sqs, 3).await;

        // Visible again in every round, each time with a new receipt handle.
        let options = PollOptions::builder().visibility_timeout(0).build();
        let messages = poll(&sqs, DLQ, &options, None).await.unwrap();

        assert_eq!(sqs.requests_for(Method::ReceiveMessage).await.len(), 3);
        let mut ids: Vec<_> = messages.iter().filter_map(Message::id).collect();
        ids.sort();
        assert_eq!(ids, vec!["m0", "m1", "m2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rounds_collect_beyond_one_receive() {
        let sqs = InMemoryTransport::new();
        seed(&sqs, 25).await;

        let messages = poll(&sqs, DLQ, &PollOptions::default(), None)
            .await
            .unwrap();

        assert_eq!(messages.len(), 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rounds_are_staggered() {
        let sqs = InMemoryTransport::new();
        let options = PollOptions::builder()
            .rounds(4)
            .round_delay(Duration::from_millis(200))
            .build();

        let start = tokio::time::Instant::now();
        let messages = poll(&sqs, DLQ, &options, None).await.unwrap();

        assert!(messages.is_empty());
        assert_eq!(start.elapsed(), Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_request_shape() {
        let sqs = InMemoryTransport::new();
        poll(&sqs, DLQ, &PollOptions::builder().rounds(1).build(), None)
            .await
            .unwrap();

        let requests = sqs.requests().await;
        let [SqsRequest::ReceiveMessage(request)] = requests.as_slice() else {
            panic!("expected a single receive, got {requests:?}");
        };
        assert_eq!(
            serde_json::to_value(request).unwrap(),
            serde_json::json!({
                "QueueUrl": DLQ,
                "MaxNumberOfMessages": 10,
                "WaitTimeSeconds": 3,
                "VisibilityTimeout": 1,
                "AttributeNames": ["All"],
                "MessageAttributeNames": ["All"],
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_only_reports_non_zero_totals() {
        let sqs = InMemoryTransport::new();
        let reports = Mutex::new(Vec::new());
        let on_progress = |total: usize| reports.lock().unwrap().push(total);

        poll(&sqs, DLQ, &PollOptions::default(), Some(&on_progress))
            .await
            .unwrap();
        assert!(reports.lock().unwrap().is_empty());

        seed(&sqs, 4).await;
        poll(&sqs, DLQ, &PollOptions::default(), Some(&on_progress))
            .await
            .unwrap();
        let reports = reports.into_inner().unwrap();
        assert!(!reports.is_empty());
        assert!(reports.iter().all(|&total| total > 0));
        assert_eq!(reports.last(), Some(&4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_round_fails_the_poll() {
        let sqs = InMemoryTransport::new();
        seed(&sqs, 2).await;
        sqs.fail_next(Method::ReceiveMessage, "AccessDenied", "no receive for you")
            .await;

        let err = poll(&sqs, DLQ, &PollOptions::default(), None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Transport {
                method: Method::ReceiveMessage,
                ..
            }
        ));
    }

    #[test]
    fn test_duplicates_keep_latest_receipt_handle() {
        let mut acc = Accumulator::default();
        acc.merge(vec![Message::default(), Message::default()]);
        acc.merge(vec![Message {
            message_id: Some("a".to_owned()),
            ..Default::default()
        }]);
        acc.merge(vec![Message {
            message_id: Some("a".to_owned()),
            receipt_handle: Some("second delivery".to_owned()),
            ..Default::default()
        }]);

        assert_eq!(acc.len(), 3);
        assert_eq!(
            acc.messages[2].receipt_handle.as_deref(),
            Some("second delivery")
        );
    }
}

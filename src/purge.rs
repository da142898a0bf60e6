use std::time::Duration;

use crate::{
    error::Error,
    sqs::{types::PurgeQueueRequest, Transport, TransportExt},
};

/// Pause after a purge before reporting success.
///
/// SQS purges asynchronously and gives no completion signal, so this only
/// gives the purge a head start before the operator looks at the queue again.
pub const DEFAULT_PURGE_SETTLE: Duration = Duration::from_millis(500);

/// Deletes every message of `dlq_url`, then waits `settle`.
#[tracing::instrument(skip(transport))]
pub async fn purge<T>(transport: &T, dlq_url: &str, settle: Duration) -> Result<(), Error>
where
    T: Transport + ?Sized,
{
    transport
        .purge_queue(PurgeQueueRequest {
            queue_url: dlq_url.to_owned(),
        })
        .await?;

    tokio::time::sleep(settle).await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        message::Message,
        sqs::{memory::InMemoryTransport, method::Method},
    };

    const DLQ: &str = "https://sqs.local/000000000000/jobs-dlq";

    #[tokio::test(start_paused = true)]
    async fn test_purge_issues_one_call_and_settles() {
        let sqs = InMemoryTransport::new();
        sqs.seed(DLQ, Message::default()).await;

        let start = tokio::time::Instant::now();
        purge(&sqs, DLQ, DEFAULT_PURGE_SETTLE).await.unwrap();

        assert_eq!(start.elapsed(), DEFAULT_PURGE_SETTLE);

        let requests = sqs.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method(), Method::PurgeQueue);
        assert_eq!(
            serde_json::to_value(&requests[0]).unwrap(),
            serde_json::json!({ "QueueUrl": DLQ })
        );
        assert_eq!(sqs.len(DLQ).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_purge_does_not_wait() {
        let sqs = InMemoryTransport::new();
        sqs.fail_next(
            Method::PurgeQueue,
            "AWS.SimpleQueueService.PurgeQueueInProgress",
            "Only one PurgeQueue operation is allowed every 60 seconds.",
        )
        .await;

        let start = tokio::time::Instant::now();
        let err = purge(&sqs, DLQ, DEFAULT_PURGE_SETTLE).await.unwrap_err();

        assert!(matches!(err, Error::Transport { .. }));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}

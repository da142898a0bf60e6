use std::ops::Deref;

use redrive::{
    commands::Commands,
    message::{Message, MESSAGE_GROUP_ID},
    outputs::DeployedQueue,
    sqs::{memory::InMemoryTransport, method::Method, types::SqsRequest},
};

const QUEUE: &str = "https://sqs.us-east-1.amazonaws.com/000000000000/jobs";
const DLQ: &str = "https://sqs.us-east-1.amazonaws.com/000000000000/jobs-dlq";

struct Deployed {
    commands: Commands<InMemoryTransport, DeployedQueue>,
    sqs: InMemoryTransport,
}

impl Deref for Deployed {
    type Target = Commands<InMemoryTransport, DeployedQueue>;

    fn deref(&self) -> &Self::Target {
        &self.commands
    }
}

fn setup(queue_url: &str, dlq_url: &str) -> Deployed {
    let sqs = InMemoryTransport::new();
    let outputs = DeployedQueue::new("jobs")
        .with_queue_url(queue_url)
        .with_dead_letter_queue_url(dlq_url);

    Deployed {
        commands: Commands::new(sqs.clone(), outputs),
        sqs,
    }
}

async fn fail(sqs: &InMemoryTransport, dlq_url: &str, body: &str) -> String {
    sqs.seed(
        dlq_url,
        Message {
            body: Some(body.to_owned()),
            ..Default::default()
        },
    )
    .await
}

#[tokio::test(start_paused = true)]
async fn test_list_then_retry() {
    let deployed = setup(QUEUE, DLQ);
    for i in 0..12 {
        fail(&deployed.sqs, DLQ, &format!("{{\"job\":{i}}}")).await;
    }

    let failed = deployed.list_failed().await.unwrap();
    assert_eq!(failed.messages.len(), 12);
    assert!(failed
        .messages
        .iter()
        .all(|message| message.receive_count() == Some(1)));

    // Listed messages become visible again once their visibility timeout ends.
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;

    let report = deployed.retry_failed().await.unwrap();
    assert_eq!(report.outcome.retried, 12);
    assert!(report.warnings.is_empty());

    let mut bodies = deployed.sqs.bodies(QUEUE).await;
    bodies.sort();
    let mut expected = (0..12)
        .map(|i| format!("{{\"job\":{i}}}"))
        .collect::<Vec<_>>();
    expected.sort();
    assert_eq!(bodies, expected);

    let failed = deployed.list_failed().await.unwrap();
    assert!(failed.messages.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_retry_without_failed_messages() {
    let deployed = setup(QUEUE, DLQ);

    let report = deployed.retry_failed().await.unwrap();

    assert_eq!(report.outcome.total(), 0);
    assert!(deployed
        .sqs
        .requests_for(Method::SendMessageBatch)
        .await
        .is_empty());
    assert!(deployed
        .sqs
        .requests_for(Method::DeleteMessageBatch)
        .await
        .is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_purge_empties_dead_letter_queue() {
    let deployed = setup(QUEUE, DLQ);
    fail(&deployed.sqs, DLQ, "a").await;
    fail(&deployed.sqs, DLQ, "b").await;

    deployed.purge_failed().await.unwrap();

    assert_eq!(deployed.sqs.len(DLQ).await, 0);
    assert!(deployed.list_failed().await.unwrap().messages.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_delete_is_reported() {
    let deployed = setup(QUEUE, DLQ);
    let stuck = fail(&deployed.sqs, DLQ, "stuck").await;
    fail(&deployed.sqs, DLQ, "fine").await;
    deployed.sqs.fail_delete_of(stuck).await;

    let report = deployed.retry_failed().await.unwrap();

    assert_eq!(report.rounds, 1);
    assert_eq!(report.outcome.retried, 1);
    assert_eq!(report.outcome.retried_but_not_deleted, 1);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("both queues"));
    assert_eq!(deployed.sqs.bodies(DLQ).await, vec!["stuck"]);
    assert_eq!(deployed.sqs.len(QUEUE).await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_fifo_redrive_keeps_group() {
    let queue = "https://sqs.us-east-1.amazonaws.com/000000000000/jobs.fifo";
    let dlq = "https://sqs.us-east-1.amazonaws.com/000000000000/jobs-dlq.fifo";
    let deployed = setup(queue, dlq);
    deployed
        .sqs
        .seed(
            dlq,
            Message {
                body: Some("ordered".to_owned()),
                attributes: [(MESSAGE_GROUP_ID.to_owned(), "tenant-1".to_owned())].into(),
                ..Default::default()
            },
        )
        .await;

    let report = deployed.retry_failed().await.unwrap();
    assert_eq!(report.outcome.retried, 1);

    let sends = deployed.sqs.requests_for(Method::SendMessageBatch).await;
    let [SqsRequest::SendMessageBatch(send)] = sends.as_slice() else {
        panic!("expected one send batch, got {sends:?}");
    };
    assert_eq!(send.queue_url, queue);
    assert_eq!(send.entries[0].message_group_id.as_deref(), Some("tenant-1"));
}

#[tokio::test]
async fn test_send_to_undeployed_queue() {
    let sqs = InMemoryTransport::new();
    let commands = Commands::new(sqs.clone(), DeployedQueue::new("jobs"));

    let err = commands.send("hello", None).await.unwrap_err();

    assert!(err.is_missing_deployment());
    assert!(sqs.requests().await.is_empty());
}

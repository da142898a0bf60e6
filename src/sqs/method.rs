use strum::Display;

/// The SQS operations used to inspect and redrive a dead-letter queue.
///
/// Displays as the `X-Amz-Target` value of the JSON protocol, e.g. `AmazonSQS.PurgeQueue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Method {
    #[strum(to_string = "AmazonSQS.ReceiveMessage")]
    ReceiveMessage,
    #[strum(to_string = "AmazonSQS.SendMessage")]
    SendMessage,
    #[strum(to_string = "AmazonSQS.SendMessageBatch")]
    SendMessageBatch,
    #[strum(to_string = "AmazonSQS.DeleteMessageBatch")]
    DeleteMessageBatch,
    #[strum(to_string = "AmazonSQS.PurgeQueue")]
    PurgeQueue,
}

//! In-memory implementation of the queue service.
//!
//! Behaves like a tiny SQS: messages become invisible for the requested
//! visibility timeout when received, every delivery gets a fresh receipt
//! handle, and deletes only succeed with the handle of the current delivery.
//! Receives return immediately instead of long polling.
//!
//! It also records every request and can be told to fail specific batch
//! entries or the next call of a given operation, which is what the tests of
//! the poller and the retrier are built on.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use rand::distributions::{Alphanumeric, DistString};
use tokio::{sync::Mutex, time::Instant};

use crate::{
    error::Error,
    message::{
        Message, MessageAttribute, APPROXIMATE_RECEIVE_COUNT, MESSAGE_DEDUPLICATION_ID,
        MESSAGE_GROUP_ID, SENT_TIMESTAMP,
    },
};

use super::{is_fifo, method::Method, types::*, Transport, TransportFuture};

const MAX_BATCH_ENTRIES: usize = 10;
const MAX_RECEIVE: u32 = 10;

struct StoredMessage {
    message_id: String,
    body: String,
    message_attributes: HashMap<String, MessageAttribute>,
    group_id: Option<String>,
    deduplication_id: Option<String>,
    sent_timestamp: i64,
    receive_count: u64,
    receipt_handle: Option<String>,
    visible_at: Instant,
}

impl StoredMessage {
    fn to_message(&self, request: &ReceiveMessageRequest) -> Message {
        let wants = |names: &[String], name: &str| {
            names.iter().any(|n| n == ALL_ATTRIBUTES || n == name)
        };

        let mut attributes = HashMap::new();
        let system = [
            (SENT_TIMESTAMP, Some(self.sent_timestamp.to_string())),
            (APPROXIMATE_RECEIVE_COUNT, Some(self.receive_count.to_string())),
            (MESSAGE_GROUP_ID, self.group_id.clone()),
            (MESSAGE_DEDUPLICATION_ID, self.deduplication_id.clone()),
        ];
        for (name, value) in system {
            if let Some(value) = value.filter(|_| wants(&request.attribute_names, name)) {
                attributes.insert(name.to_owned(), value);
            }
        }

        let message_attributes = self
            .message_attributes
            .iter()
            .filter(|(name, _)| wants(&request.message_attribute_names, name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Message {
            message_id: Some(self.message_id.clone()),
            receipt_handle: self.receipt_handle.clone(),
            body: Some(self.body.clone()),
            message_attributes,
            attributes,
        }
    }
}

#[derive(Default)]
struct State {
    queues: HashMap<String, Vec<StoredMessage>>,
    requests: Vec<SqsRequest>,
    failing_sends: HashSet<String>,
    failing_deletes: HashSet<String>,
    fail_next: HashMap<Method, (String, String)>,
}

/// Thread-safe in-memory queue service.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    state: Arc<Mutex<State>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places a message on a queue without recording a request.
    ///
    /// Keeps the message id if one is set, so tests can refer to it. A set
    /// receipt handle is treated as the handle of a delivery already made.
    pub async fn seed(&self, queue_url: &str, message: Message) -> String {
        let message_id = message.message_id.unwrap_or_else(generate_message_id);
        let receive_count = u64::from(message.receipt_handle.is_some());
        let stored = StoredMessage {
            message_id: message_id.clone(),
            body: message.body.unwrap_or_default(),
            message_attributes: message.message_attributes,
            group_id: message.attributes.get(MESSAGE_GROUP_ID).cloned(),
            deduplication_id: message.attributes.get(MESSAGE_DEDUPLICATION_ID).cloned(),
            sent_timestamp: chrono::Utc::now().timestamp_millis(),
            receive_count,
            receipt_handle: message.receipt_handle,
            visible_at: Instant::now(),
        };

        let mut state = self.state.lock().await;
        state
            .queues
            .entry(queue_url.to_owned())
            .or_default()
            .push(stored);

        message_id
    }

    /// Makes every future batch send entry with this id fail.
    pub async fn fail_send_of(&self, id: impl Into<String>) {
        self.state.lock().await.failing_sends.insert(id.into());
    }

    /// Makes every future batch delete entry with this id fail.
    pub async fn fail_delete_of(&self, id: impl Into<String>) {
        self.state.lock().await.failing_deletes.insert(id.into());
    }

    /// Makes the next call of `method` fail as a whole.
    pub async fn fail_next(&self, method: Method, code: impl Into<String>, message: impl Into<String>) {
        self.state
            .lock()
            .await
            .fail_next
            .insert(method, (code.into(), message.into()));
    }

    /// Every request received so far, in arrival order.
    pub async fn requests(&self) -> Vec<SqsRequest> {
        self.state.lock().await.requests.clone()
    }

    pub async fn requests_for(&self, method: Method) -> Vec<SqsRequest> {
        self.state
            .lock()
            .await
            .requests
            .iter()
            .filter(|request| request.method() == method)
            .cloned()
            .collect()
    }

    /// Number of messages on a queue, visible or not.
    pub async fn len(&self, queue_url: &str) -> usize {
        self.state
            .lock()
            .await
            .queues
            .get(queue_url)
            .map(Vec::len)
            .unwrap_or_default()
    }

    /// Bodies of the messages on a queue, in send order.
    pub async fn bodies(&self, queue_url: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .queues
            .get(queue_url)
            .map(|messages| messages.iter().map(|m| m.body.clone()).collect())
            .unwrap_or_default()
    }

    fn handle(state: &mut State, request: SqsRequest) -> Result<SqsResponse, Error> {
        let method = request.method();
        state.requests.push(request.clone());

        if let Some((code, message)) = state.fail_next.remove(&method) {
            return Err(Error::transport(method, Some(code), message));
        }

        match request {
            SqsRequest::ReceiveMessage(req) => {
                Self::receive(state, req).map(SqsResponse::ReceiveMessage)
            }
            SqsRequest::SendMessage(req) => Self::send(state, req).map(SqsResponse::SendMessage),
            SqsRequest::SendMessageBatch(req) => {
                Self::send_batch(state, req).map(SqsResponse::SendMessageBatch)
            }
            SqsRequest::DeleteMessageBatch(req) => {
                Self::delete_batch(state, req).map(SqsResponse::DeleteMessageBatch)
            }
            SqsRequest::PurgeQueue(req) => {
                state.queues.remove(&req.queue_url);
                Ok(SqsResponse::PurgeQueue(PurgeQueueResponse {}))
            }
        }
    }

    fn receive(
        state: &mut State,
        request: ReceiveMessageRequest,
    ) -> Result<ReceiveMessageResponse, Error> {
        if request.max_number_of_messages == 0 || request.max_number_of_messages > MAX_RECEIVE {
            return Err(Error::transport(
                Method::ReceiveMessage,
                Some("InvalidParameterValue"),
                format!(
                    "MaxNumberOfMessages must be between 1 and {MAX_RECEIVE}, got {}",
                    request.max_number_of_messages
                ),
            ));
        }

        let now = Instant::now();
        let hidden_until = now + Duration::from_secs(u64::from(request.visibility_timeout));

        let messages: Vec<Message> = state
            .queues
            .get_mut(&request.queue_url)
            .map(|queue| {
                queue
                    .iter_mut()
                    .filter(|message| message.visible_at <= now)
                    .take(request.max_number_of_messages as usize)
                    .map(|message| {
                        message.receive_count += 1;
                        message.visible_at = hidden_until;
                        message.receipt_handle =
                            Some(format!("{}-{}", message.message_id, random_token(16)));
                        message.to_message(&request)
                    })
                    .collect()
            })
            .unwrap_or_default();

        // SQS omits the field entirely when nothing is available.
        Ok(ReceiveMessageResponse {
            messages: (!messages.is_empty()).then_some(messages),
        })
    }

    fn store(
        state: &mut State,
        method: Method,
        queue_url: &str,
        body: String,
        message_attributes: HashMap<String, MessageAttribute>,
        group_id: Option<String>,
        deduplication_id: Option<String>,
    ) -> Result<(String, String), Error> {
        if is_fifo(queue_url) && group_id.is_none() {
            return Err(missing_group_id(method));
        }

        let message_id = generate_message_id();
        let digest = hex::encode(md5::compute(&body).0);

        state
            .queues
            .entry(queue_url.to_owned())
            .or_default()
            .push(StoredMessage {
                message_id: message_id.clone(),
                body,
                message_attributes,
                group_id,
                deduplication_id,
                sent_timestamp: chrono::Utc::now().timestamp_millis(),
                receive_count: 0,
                receipt_handle: None,
                visible_at: Instant::now(),
            });

        Ok((message_id, digest))
    }

    fn send(state: &mut State, request: SendMessageRequest) -> Result<SendMessageResponse, Error> {
        let (message_id, md5_of_message_body) = Self::store(
            state,
            Method::SendMessage,
            &request.queue_url,
            request.message_body,
            request.message_attributes,
            request.message_group_id,
            request.message_deduplication_id,
        )?;

        Ok(SendMessageResponse {
            message_id,
            md5_of_message_body,
        })
    }

    fn send_batch(
        state: &mut State,
        request: SendMessageBatchRequest,
    ) -> Result<SendMessageBatchResponse, Error> {
        check_batch_size(Method::SendMessageBatch, request.entries.len())?;

        // The whole call is rejected before any entry is stored.
        if is_fifo(&request.queue_url)
            && request
                .entries
                .iter()
                .any(|entry| entry.message_group_id.is_none())
        {
            return Err(missing_group_id(Method::SendMessageBatch));
        }

        let mut response = SendMessageBatchResponse::default();

        for entry in request.entries {
            if state.failing_sends.contains(&entry.id) {
                response.failed.push(BatchResultErrorEntry {
                    id: entry.id,
                    sender_fault: false,
                    code: "InternalError".to_owned(),
                    message: Some("injected send failure".to_owned()),
                });
                continue;
            }

            let (message_id, md5_of_message_body) = Self::store(
                state,
                Method::SendMessageBatch,
                &request.queue_url,
                entry.message_body,
                entry.message_attributes,
                entry.message_group_id,
                entry.message_deduplication_id,
            )?;

            response.successful.push(SendMessageBatchResultEntry {
                id: entry.id,
                message_id,
                md5_of_message_body,
            });
        }

        Ok(response)
    }

    fn delete_batch(
        state: &mut State,
        request: DeleteMessageBatchRequest,
    ) -> Result<DeleteMessageBatchResponse, Error> {
        check_batch_size(Method::DeleteMessageBatch, request.entries.len())?;

        let mut response = DeleteMessageBatchResponse::default();
        let queue = state.queues.entry(request.queue_url).or_default();

        for entry in request.entries {
            if state.failing_deletes.contains(&entry.id) {
                response.failed.push(BatchResultErrorEntry {
                    id: entry.id,
                    sender_fault: false,
                    code: "InternalError".to_owned(),
                    message: Some("injected delete failure".to_owned()),
                });
                continue;
            }

            let position = queue
                .iter()
                .position(|m| m.receipt_handle.as_deref() == Some(entry.receipt_handle.as_str()));

            match position {
                Some(position) => {
                    queue.remove(position);
                    response
                        .successful
                        .push(DeleteMessageBatchResultEntry { id: entry.id });
                }
                None => response.failed.push(BatchResultErrorEntry {
                    id: entry.id,
                    sender_fault: true,
                    code: "ReceiptHandleIsInvalid".to_owned(),
                    message: Some(format!(
                        "The receipt handle \"{}\" is not valid.",
                        entry.receipt_handle
                    )),
                }),
            }
        }

        Ok(response)
    }
}

impl Transport for InMemoryTransport {
    fn request(&self, request: SqsRequest) -> TransportFuture<'_> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            Self::handle(&mut state, request)
        })
    }
}

fn missing_group_id(method: Method) -> Error {
    Error::transport(
        method,
        Some("MissingParameter"),
        "The request must contain the parameter MessageGroupId.",
    )
}

fn check_batch_size(method: Method, len: usize) -> Result<(), Error> {
    match len {
        0 => Err(Error::transport(
            method,
            Some("AWS.SimpleQueueService.EmptyBatchRequest"),
            "There should be at least one entry in the request.",
        )),
        n if n > MAX_BATCH_ENTRIES => Err(Error::transport(
            method,
            Some("AWS.SimpleQueueService.TooManyEntriesInBatchRequest"),
            format!("Maximum number of entries per request are {MAX_BATCH_ENTRIES}. You have sent {n}."),
        )),
        _ => Ok(()),
    }
}

fn random_token(len: usize) -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), len)
}

fn generate_message_id() -> String {
    let token = random_token(32).to_lowercase();
    format!(
        "{}-{}-{}-{}-{}",
        &token[0..8],
        &token[8..12],
        &token[12..16],
        &token[16..20],
        &token[20..32]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqs::TransportExt;

    const QUEUE: &str = "https://sqs.local/000000000000/jobs";

    fn receive(visibility_timeout: u32) -> ReceiveMessageRequest {
        ReceiveMessageRequest {
            queue_url: QUEUE.to_owned(),
            max_number_of_messages: 10,
            wait_time_seconds: 0,
            visibility_timeout,
            attribute_names: vec![ALL_ATTRIBUTES.to_owned()],
            message_attribute_names: vec![ALL_ATTRIBUTES.to_owned()],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_received_messages_are_hidden_until_timeout() {
        let sqs = InMemoryTransport::new();
        sqs.seed(QUEUE, Message {
            message_id: Some("m1".to_owned()),
            body: Some("hello".to_owned()),
            ..Default::default()
        })
        .await;

        let first = sqs.receive_message(receive(5)).await.unwrap();
        let first = first.messages.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].receive_count(), Some(1));

        let hidden = sqs.receive_message(receive(5)).await.unwrap();
        assert_eq!(hidden.messages, None);

        tokio::time::advance(Duration::from_secs(5)).await;

        let again = sqs.receive_message(receive(5)).await.unwrap().messages.unwrap();
        assert_eq!(again[0].id(), Some("m1"));
        assert_ne!(again[0].receipt_handle, first[0].receipt_handle);
    }

    #[tokio::test]
    async fn test_delete_requires_current_receipt_handle() {
        let sqs = InMemoryTransport::new();
        sqs.seed(QUEUE, Message {
            message_id: Some("m1".to_owned()),
            ..Default::default()
        })
        .await;

        let stale = sqs.receive_message(receive(0)).await.unwrap().messages.unwrap();
        let current = sqs.receive_message(receive(0)).await.unwrap().messages.unwrap();

        let delete = |handle: &Option<String>| DeleteMessageBatchRequest {
            queue_url: QUEUE.to_owned(),
            entries: vec![DeleteMessageBatchRequestEntry {
                id: "m1".to_owned(),
                receipt_handle: handle.clone().unwrap(),
            }],
        };

        let response = sqs
            .delete_message_batch(delete(&stale[0].receipt_handle))
            .await
            .unwrap();
        assert_eq!(response.failed[0].code, "ReceiptHandleIsInvalid");
        assert_eq!(sqs.len(QUEUE).await, 1);

        let response = sqs
            .delete_message_batch(delete(&current[0].receipt_handle))
            .await
            .unwrap();
        assert_eq!(response.successful.len(), 1);
        assert_eq!(sqs.len(QUEUE).await, 0);
    }

    #[tokio::test]
    async fn test_fifo_send_requires_group() {
        let sqs = InMemoryTransport::new();
        let err = sqs
            .send_message(SendMessageRequest {
                queue_url: "https://sqs.local/000000000000/jobs.fifo".to_owned(),
                message_body: "hi".to_owned(),
                message_attributes: HashMap::new(),
                message_deduplication_id: None,
                message_group_id: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transport { method: Method::SendMessage, .. }));
    }

    #[tokio::test]
    async fn test_fifo_batch_without_group_stores_nothing() {
        let sqs = InMemoryTransport::new();
        let queue_url = "https://sqs.local/000000000000/jobs.fifo";
        let entry = |id: &str, group: Option<&str>| SendMessageBatchRequestEntry {
            id: id.to_owned(),
            message_body: format!("body {id}"),
            message_attributes: HashMap::new(),
            message_deduplication_id: Some(id.to_owned()),
            message_group_id: group.map(str::to_owned),
        };

        let err = sqs
            .send_message_batch(SendMessageBatchRequest {
                queue_url: queue_url.to_owned(),
                entries: vec![entry("a", Some("g")), entry("b", None)],
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Transport {
                method: Method::SendMessageBatch,
                ..
            }
        ));
        assert_eq!(sqs.len(queue_url).await, 0);
    }

    #[tokio::test]
    async fn test_oversized_batch_is_rejected() {
        let sqs = InMemoryTransport::new();
        let entries = (0..11)
            .map(|i| DeleteMessageBatchRequestEntry {
                id: i.to_string(),
                receipt_handle: "h".to_owned(),
            })
            .collect();

        let err = sqs
            .delete_message_batch(DeleteMessageBatchRequest {
                queue_url: QUEUE.to_owned(),
                entries,
            })
            .await
            .unwrap_err();

        assert!(err.to_string().contains("TooManyEntriesInBatchRequest"));
    }

    #[tokio::test]
    async fn test_fail_next_is_one_shot() {
        let sqs = InMemoryTransport::new();
        sqs.fail_next(Method::PurgeQueue, "AccessDenied", "not allowed")
            .await;

        let purge = || PurgeQueueRequest {
            queue_url: QUEUE.to_owned(),
        };

        assert!(sqs.purge_queue(purge()).await.is_err());
        assert!(sqs.purge_queue(purge()).await.is_ok());
        assert_eq!(sqs.requests_for(Method::PurgeQueue).await.len(), 2);
    }
}

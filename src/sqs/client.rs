//! [`Transport`] backed by the AWS SDK.

use std::collections::HashMap;

use aws_config::{BehaviorVersion, Region};
use aws_sdk_sqs::{
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::Blob,
    types::{
        BatchResultErrorEntry as SdkBatchResultErrorEntry, DeleteMessageBatchRequestEntry,
        MessageAttributeValue, MessageSystemAttributeName, SendMessageBatchRequestEntry,
    },
};

use crate::{
    error::Error,
    message::{Message, MessageAttribute},
};

use super::{method::Method, types::*, Transport, TransportFuture};

#[derive(Clone)]
pub struct AwsTransport {
    client: aws_sdk_sqs::Client,
}

impl AwsTransport {
    pub fn new(client: aws_sdk_sqs::Client) -> Self {
        Self { client }
    }

    /// Builds a client from the default credential chain.
    ///
    /// `endpoint_url` points the client at an SQS-compatible service instead of AWS.
    pub async fn from_env(region: Option<String>, endpoint_url: Option<String>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let shared = loader.load().await;

        let mut config = aws_sdk_sqs::config::Builder::from(&shared);
        if let Some(endpoint_url) = endpoint_url {
            config = config.endpoint_url(endpoint_url);
        }

        Self::new(aws_sdk_sqs::Client::from_conf(config.build()))
    }

    async fn receive_message(
        client: aws_sdk_sqs::Client,
        request: ReceiveMessageRequest,
    ) -> Result<SqsResponse, Error> {
        let output = client
            .receive_message()
            .queue_url(request.queue_url)
            .max_number_of_messages(request.max_number_of_messages as i32)
            .wait_time_seconds(request.wait_time_seconds as i32)
            .visibility_timeout(request.visibility_timeout as i32)
            .set_message_system_attribute_names(Some(
                request
                    .attribute_names
                    .iter()
                    .map(|name| MessageSystemAttributeName::from(name.as_str()))
                    .collect(),
            ))
            .set_message_attribute_names(Some(request.message_attribute_names))
            .send()
            .await
            .map_err(|e| transport_error(Method::ReceiveMessage, e))?;

        let messages = output
            .messages
            .map(|messages| messages.into_iter().map(from_sdk_message).collect());

        Ok(SqsResponse::ReceiveMessage(ReceiveMessageResponse {
            messages,
        }))
    }

    async fn send_message(
        client: aws_sdk_sqs::Client,
        request: SendMessageRequest,
    ) -> Result<SqsResponse, Error> {
        let output = client
            .send_message()
            .queue_url(request.queue_url)
            .message_body(request.message_body)
            .set_message_attributes(to_sdk_attributes(request.message_attributes)?)
            .set_message_group_id(request.message_group_id)
            .set_message_deduplication_id(request.message_deduplication_id)
            .send()
            .await
            .map_err(|e| transport_error(Method::SendMessage, e))?;

        Ok(SqsResponse::SendMessage(SendMessageResponse {
            message_id: output.message_id.unwrap_or_default(),
            md5_of_message_body: output.md5_of_message_body.unwrap_or_default(),
        }))
    }

    async fn send_message_batch(
        client: aws_sdk_sqs::Client,
        request: SendMessageBatchRequest,
    ) -> Result<SqsResponse, Error> {
        let entries = request
            .entries
            .into_iter()
            .map(|entry| {
                SendMessageBatchRequestEntry::builder()
                    .id(entry.id)
                    .message_body(entry.message_body)
                    .set_message_attributes(to_sdk_attributes(entry.message_attributes)?)
                    .set_message_group_id(entry.message_group_id)
                    .set_message_deduplication_id(entry.message_deduplication_id)
                    .build()
                    .map_err(|e| Error::invalid_message(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let output = client
            .send_message_batch()
            .queue_url(request.queue_url)
            .set_entries(Some(entries))
            .send()
            .await
            .map_err(|e| transport_error(Method::SendMessageBatch, e))?;

        Ok(SqsResponse::SendMessageBatch(SendMessageBatchResponse {
            successful: output
                .successful
                .into_iter()
                .map(|entry| SendMessageBatchResultEntry {
                    id: entry.id,
                    message_id: entry.message_id,
                    md5_of_message_body: entry.md5_of_message_body,
                })
                .collect(),
            failed: output.failed.into_iter().map(from_sdk_failure).collect(),
        }))
    }

    async fn delete_message_batch(
        client: aws_sdk_sqs::Client,
        request: DeleteMessageBatchRequest,
    ) -> Result<SqsResponse, Error> {
        let entries = request
            .entries
            .into_iter()
            .map(|entry| {
                DeleteMessageBatchRequestEntry::builder()
                    .id(entry.id)
                    .receipt_handle(entry.receipt_handle)
                    .build()
                    .map_err(|e| Error::invalid_message(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let output = client
            .delete_message_batch()
            .queue_url(request.queue_url)
            .set_entries(Some(entries))
            .send()
            .await
            .map_err(|e| transport_error(Method::DeleteMessageBatch, e))?;

        Ok(SqsResponse::DeleteMessageBatch(DeleteMessageBatchResponse {
            successful: output
                .successful
                .into_iter()
                .map(|entry| DeleteMessageBatchResultEntry { id: entry.id })
                .collect(),
            failed: output.failed.into_iter().map(from_sdk_failure).collect(),
        }))
    }

    async fn purge_queue(
        client: aws_sdk_sqs::Client,
        request: PurgeQueueRequest,
    ) -> Result<SqsResponse, Error> {
        client
            .purge_queue()
            .queue_url(request.queue_url)
            .send()
            .await
            .map_err(|e| transport_error(Method::PurgeQueue, e))?;

        Ok(SqsResponse::PurgeQueue(PurgeQueueResponse {}))
    }
}

impl Transport for AwsTransport {
    fn request(&self, request: SqsRequest) -> TransportFuture<'_> {
        let client = self.client.clone();
        let method = request.method();

        Box::pin(async move {
            tracing::debug!(%method, queue_url = request.queue_url(), "sending request");

            match request {
                SqsRequest::ReceiveMessage(req) => Self::receive_message(client, req).await,
                SqsRequest::SendMessage(req) => Self::send_message(client, req).await,
                SqsRequest::SendMessageBatch(req) => Self::send_message_batch(client, req).await,
                SqsRequest::DeleteMessageBatch(req) => {
                    Self::delete_message_batch(client, req).await
                }
                SqsRequest::PurgeQueue(req) => Self::purge_queue(client, req).await,
            }
        })
    }
}

fn transport_error<E, R>(method: Method, err: SdkError<E, R>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code = err.code().map(str::to_owned);
    let message = match err.message() {
        Some(message) => message.to_owned(),
        None => DisplayErrorContext(err).to_string(),
    };

    tracing::debug!(%method, ?code, %message, "request failed");

    Error::Transport {
        method,
        code,
        message,
    }
}

fn from_sdk_failure(entry: SdkBatchResultErrorEntry) -> BatchResultErrorEntry {
    BatchResultErrorEntry {
        id: entry.id,
        sender_fault: entry.sender_fault,
        code: entry.code,
        message: entry.message,
    }
}

fn from_sdk_message(message: aws_sdk_sqs::types::Message) -> Message {
    Message {
        message_id: message.message_id,
        receipt_handle: message.receipt_handle,
        body: message.body,
        message_attributes: message
            .message_attributes
            .unwrap_or_default()
            .into_iter()
            .map(|(name, value)| {
                let attribute = MessageAttribute {
                    data_type: value.data_type,
                    string_value: value.string_value,
                    binary_value: value.binary_value.map(Blob::into_inner),
                };
                (name, attribute)
            })
            .collect(),
        attributes: message
            .attributes
            .unwrap_or_default()
            .into_iter()
            .map(|(name, value)| (name.as_str().to_owned(), value))
            .collect(),
    }
}

fn to_sdk_attributes(
    attributes: HashMap<String, MessageAttribute>,
) -> Result<Option<HashMap<String, MessageAttributeValue>>, Error> {
    if attributes.is_empty() {
        return Ok(None);
    }

    attributes
        .into_iter()
        .map(|(name, attribute)| {
            let value = MessageAttributeValue::builder()
                .data_type(attribute.data_type)
                .set_string_value(attribute.string_value)
                .set_binary_value(attribute.binary_value.map(Blob::new))
                .build()
                .map_err(|e| Error::invalid_message(format!("attribute {name}: {e}")))?;
            Ok((name, value))
        })
        .collect::<Result<HashMap<_, _>, Error>>()
        .map(Some)
}

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::message::{Message, MessageAttribute};

use super::method::Method;

pub mod receive_message {
    use super::*;

    /// Ask for every system attribute / message attribute.
    pub const ALL_ATTRIBUTES: &str = "All";

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct ReceiveMessageRequest {
        pub queue_url: String,
        pub max_number_of_messages: u32,
        pub wait_time_seconds: u32,
        pub visibility_timeout: u32,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub attribute_names: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub message_attribute_names: Vec<String>,
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct ReceiveMessageResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub messages: Option<Vec<Message>>,
    }
}

pub mod send_message {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct SendMessageRequest {
        pub queue_url: String,
        pub message_body: String,
        #[serde(default)]
        pub message_attributes: HashMap<String, MessageAttribute>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub message_deduplication_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub message_group_id: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct SendMessageResponse {
        pub message_id: String,
        #[serde(rename = "MD5OfMessageBody")]
        pub md5_of_message_body: String,
    }
}

pub mod send_message_batch {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct SendMessageBatchRequest {
        pub queue_url: String,
        pub entries: Vec<SendMessageBatchRequestEntry>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct SendMessageBatchRequestEntry {
        pub id: String,
        pub message_body: String,
        #[serde(default)]
        pub message_attributes: HashMap<String, MessageAttribute>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub message_deduplication_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub message_group_id: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct SendMessageBatchResultEntry {
        pub id: String,
        pub message_id: String,
        #[serde(rename = "MD5OfMessageBody")]
        pub md5_of_message_body: String,
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct SendMessageBatchResponse {
        #[serde(default)]
        pub successful: Vec<SendMessageBatchResultEntry>,
        #[serde(default)]
        pub failed: Vec<BatchResultErrorEntry>,
    }
}

pub mod delete_message_batch {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct DeleteMessageBatchRequest {
        pub queue_url: String,
        pub entries: Vec<DeleteMessageBatchRequestEntry>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct DeleteMessageBatchRequestEntry {
        pub id: String,
        pub receipt_handle: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct DeleteMessageBatchResultEntry {
        pub id: String,
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct DeleteMessageBatchResponse {
        #[serde(default)]
        pub successful: Vec<DeleteMessageBatchResultEntry>,
        #[serde(default)]
        pub failed: Vec<BatchResultErrorEntry>,
    }
}

pub mod purge_queue {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct PurgeQueueRequest {
        pub queue_url: String,
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct PurgeQueueResponse {}
}

/// A per-entry failure in a batch response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BatchResultErrorEntry {
    pub id: String,
    #[serde(default)]
    pub sender_fault: bool,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub use delete_message_batch::*;
pub use purge_queue::*;
pub use receive_message::*;
pub use send_message::*;
pub use send_message_batch::*;

/// A request to the queue service. The variant names the operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqsRequest {
    ReceiveMessage(ReceiveMessageRequest),
    SendMessage(SendMessageRequest),
    SendMessageBatch(SendMessageBatchRequest),
    DeleteMessageBatch(DeleteMessageBatchRequest),
    PurgeQueue(PurgeQueueRequest),
}

impl SqsRequest {
    pub fn method(&self) -> Method {
        match self {
            Self::ReceiveMessage(_) => Method::ReceiveMessage,
            Self::SendMessage(_) => Method::SendMessage,
            Self::SendMessageBatch(_) => Method::SendMessageBatch,
            Self::DeleteMessageBatch(_) => Method::DeleteMessageBatch,
            Self::PurgeQueue(_) => Method::PurgeQueue,
        }
    }

    pub fn queue_url(&self) -> &str {
        match self {
            Self::ReceiveMessage(req) => &req.queue_url,
            Self::SendMessage(req) => &req.queue_url,
            Self::SendMessageBatch(req) => &req.queue_url,
            Self::DeleteMessageBatch(req) => &req.queue_url,
            Self::PurgeQueue(req) => &req.queue_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqsResponse {
    ReceiveMessage(ReceiveMessageResponse),
    SendMessage(SendMessageResponse),
    SendMessageBatch(SendMessageBatchResponse),
    DeleteMessageBatch(DeleteMessageBatchResponse),
    PurgeQueue(PurgeQueueResponse),
}

impl SqsResponse {
    pub fn method(&self) -> Method {
        match self {
            Self::ReceiveMessage(_) => Method::ReceiveMessage,
            Self::SendMessage(_) => Method::SendMessage,
            Self::SendMessageBatch(_) => Method::SendMessageBatch,
            Self::DeleteMessageBatch(_) => Method::DeleteMessageBatch,
            Self::PurgeQueue(_) => Method::PurgeQueue,
        }
    }
}

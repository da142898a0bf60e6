//! Message types shared by the poller, the retrier and the transports.
//!
//! A [`Message`] is one *delivery* of a queued message. Its `MessageId` is
//! stable across deliveries, while its `ReceiptHandle` is issued anew every
//! time the message is received and is the only way to delete that delivery.
//! Deduplication therefore keys on the id and deletion uses the handle.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// System attribute holding the epoch-millisecond time the message was first sent.
pub const SENT_TIMESTAMP: &str = "SentTimestamp";
/// System attribute counting how many times the message was received.
pub const APPROXIMATE_RECEIVE_COUNT: &str = "ApproximateReceiveCount";
/// System attribute carrying the group of a FIFO message.
pub const MESSAGE_GROUP_ID: &str = "MessageGroupId";
/// System attribute carrying the deduplication id of a FIFO message.
pub const MESSAGE_DEDUPLICATION_ID: &str = "MessageDeduplicationId";

/// A user-defined message attribute, passed through untouched on redrive.
///
/// `DataType` is kept verbatim so that custom types (`String.uuid`,
/// `Number.int`, ...) survive the round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageAttribute {
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "base64_bytes"
    )]
    pub binary_value: Option<Vec<u8>>,
}

impl MessageAttribute {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            data_type: "String".to_owned(),
            string_value: Some(value.into()),
            binary_value: None,
        }
    }

    pub fn binary(value: impl Into<Vec<u8>>) -> Self {
        Self {
            data_type: "Binary".to_owned(),
            string_value: None,
            binary_value: Some(value.into()),
        }
    }
}

/// A message as returned by `ReceiveMessage`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub message_attributes: HashMap<String, MessageAttribute>,
    /// System attributes (`SentTimestamp`, `MessageGroupId`, ...).
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl Message {
    pub fn id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn body(&self) -> &str {
        self.body.as_deref().unwrap_or_default()
    }

    /// When the message was originally sent, if the queue reported it.
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.attributes
            .get(SENT_TIMESTAMP)
            .and_then(|ts| ts.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
    }

    pub fn receive_count(&self) -> Option<u64> {
        self.attributes
            .get(APPROXIMATE_RECEIVE_COUNT)
            .and_then(|count| count.parse().ok())
    }

    pub fn group_id(&self) -> Option<&str> {
        self.attributes.get(MESSAGE_GROUP_ID).map(String::as_str)
    }

    pub fn deduplication_id(&self) -> Option<&str> {
        self.attributes
            .get(MESSAGE_DEDUPLICATION_ID)
            .map(String::as_str)
    }

    /// The body re-indented if it is JSON, otherwise the raw body.
    pub fn pretty_body(&self) -> String {
        match serde_json::from_str::<serde_json::Value>(self.body()) {
            Ok(value @ (serde_json::Value::Object(_) | serde_json::Value::Array(_))) => {
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| self.body().to_owned())
            }
            _ => self.body().to_owned(),
        }
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, ser: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => ser.serialize_str(&STANDARD.encode(bytes)),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(de)?
            .map(|encoded| STANDARD.decode(encoded).map_err(serde::de::Error::custom))
            .transpose()
    }
}

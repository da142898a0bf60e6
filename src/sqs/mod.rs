//! Transport adapter for the queue service.
//!
//! Everything that talks to SQS goes through [`Transport::request`], which
//! forwards one operation and hands back its response. The adapter does no
//! retrying or batching of its own; callers decide how to react to failures.

use std::{future::Future, pin::Pin};

use crate::error::Error;

pub mod client;
pub mod memory;
pub mod method;
pub mod types;

use method::Method;
use types::*;

pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<SqsResponse, Error>> + Send + 'a>>;

/// Sends a single SQS operation and returns its response.
///
/// Implementations must map every remote failure (network, throttling,
/// permissions, ...) to [`Error::Transport`].
pub trait Transport: Send + Sync {
    fn request(&self, request: SqsRequest) -> TransportFuture<'_>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn request(&self, request: SqsRequest) -> TransportFuture<'_> {
        (**self).request(request)
    }
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn request(&self, request: SqsRequest) -> TransportFuture<'_> {
        (**self).request(request)
    }
}

macro_rules! typed_request {
    ($name:ident, $variant:ident, $req:ty, $res:ty) => {
        fn $name(&self, request: $req) -> impl Future<Output = Result<$res, Error>> + Send + '_ {
            let fut = self.request(SqsRequest::$variant(request));
            async move {
                match fut.await? {
                    SqsResponse::$variant(response) => Ok(response),
                    other => Err(Error::UnexpectedResponse {
                        method: Method::$variant,
                        received: other.method(),
                    }),
                }
            }
        }
    };
}

/// Typed helpers over [`Transport::request`].
pub trait TransportExt: Transport {
    typed_request!(
        receive_message,
        ReceiveMessage,
        ReceiveMessageRequest,
        ReceiveMessageResponse
    );
    typed_request!(send_message, SendMessage, SendMessageRequest, SendMessageResponse);
    typed_request!(
        send_message_batch,
        SendMessageBatch,
        SendMessageBatchRequest,
        SendMessageBatchResponse
    );
    typed_request!(
        delete_message_batch,
        DeleteMessageBatch,
        DeleteMessageBatchRequest,
        DeleteMessageBatchResponse
    );
    typed_request!(purge_queue, PurgeQueue, PurgeQueueRequest, PurgeQueueResponse);
}

impl<T: Transport + ?Sized> TransportExt for T {}

/// Whether the queue is a FIFO queue. SQS requires FIFO queue names to end in `.fifo`.
pub fn is_fifo(queue_url: &str) -> bool {
    queue_url.trim_end_matches('/').ends_with(".fifo")
}

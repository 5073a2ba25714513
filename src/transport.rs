//! Byte-stream transport seam between the feed and the network.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};

use crate::client::ClientError;
use crate::model::StreamRequest;

/// A response body as a stream of raw chunks in delivery order.
pub type ByteStream = BoxStream<'static, Result<Bytes, ClientError>>;

/// Something that can open a streamed response for a request.
///
/// `QuizClient` implements this over HTTP. Opening must fail with a
/// transport error when the response status is not successful.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, request: &StreamRequest) -> Result<ByteStream, ClientError>;
}

/// Fail the stream with `ClientError::IdleTimeout` when no chunk arrives
/// within `idle` of the previous one (or of the start).
///
/// The error is yielded once and the stream ends.
pub fn with_idle_timeout(bytes: ByteStream, idle: Duration) -> ByteStream {
    stream::unfold(Some(bytes), move |bytes| async move {
        let mut bytes = bytes?;
        match tokio::time::timeout(idle, bytes.next()).await {
            Ok(Some(item)) => Some((item, Some(bytes))),
            Ok(None) => None,
            Err(_) => {
                tracing::warn!(?idle, "question stream went idle");
                Some((Err(ClientError::IdleTimeout(idle)), None))
            }
        }
    })
    .boxed()
}

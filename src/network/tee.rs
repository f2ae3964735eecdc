//! Event-stream tee.
//!
//! [`TeeFetch`] decorates a [`Fetch`]. Responses declaring
//! `text/event-stream` get their body wrapped so every chunk the caller reads
//! is also handed to the frame sink. The caller sees exactly what the inner
//! fetch produced: same chunks, same boundaries, same errors, same end.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{debug, trace};

use crate::error::Result;
use crate::transport::FrameSink;

use super::{Fetch, FetchRequest, FetchResponse, ResponseBody};

// ============================================================================
// TeeFetch
// ============================================================================

/// Fetch decorator copying event-stream bodies to a [`FrameSink`].
pub struct TeeFetch {
    inner: Arc<dyn Fetch>,
    sink: Arc<dyn FrameSink>,
}

impl TeeFetch {
    /// Wraps `inner`, copying event-stream chunks to `sink`.
    #[must_use]
    pub fn new(inner: Arc<dyn Fetch>, sink: Arc<dyn FrameSink>) -> Self {
        Self { inner, sink }
    }
}

#[async_trait]
impl Fetch for TeeFetch {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        let mut response = self.inner.fetch(request).await?;

        if !response.is_event_stream() {
            return Ok(response);
        }

        if let Some(body) = response.body.take() {
            debug!(status = response.status, "Teeing event stream");
            response.body = Some(tee_body(body, Arc::clone(&self.sink)));
        }

        Ok(response)
    }
}

/// Wraps `body` so each successful chunk is also sent to `sink`.
///
/// Chunks are forwarded in read order as they are pulled by the consumer.
/// Errors pass through untouched and are not forwarded.
pub fn tee_body(body: ResponseBody, sink: Arc<dyn FrameSink>) -> ResponseBody {
    body.inspect(move |chunk| {
        if let Ok(bytes) = chunk {
            let outcome = sink.try_send(bytes.clone());
            trace!(len = bytes.len(), ?outcome, "Chunk relayed");
        }
    })
    .boxed()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use futures_util::stream;

    use crate::error::Error;
    use crate::transport::MemorySink;

    /// Fetch returning a fixed response built per call.
    struct StaticFetch {
        content_type: &'static str,
        chunks: Vec<&'static [u8]>,
        fail_after: bool,
    }

    #[async_trait]
    impl Fetch for StaticFetch {
        async fn fetch(&self, _request: FetchRequest) -> Result<FetchResponse> {
            let mut items: Vec<Result<Vec<u8>>> =
                self.chunks.iter().map(|c| Ok(c.to_vec())).collect();
            if self.fail_after {
                items.push(Err(Error::connection("reset")));
            }
            Ok(FetchResponse::new(
                200,
                vec![("content-type".into(), self.content_type.into())],
                Some(stream::iter(items).boxed()),
            ))
        }
    }

    fn sse_fetch(fail_after: bool) -> Arc<dyn Fetch> {
        Arc::new(StaticFetch {
            content_type: "text/event-stream",
            chunks: vec![b"event: a\n", b"data: 1\n\n", b"event: b\ndata: 2\n\n"],
            fail_after,
        })
    }

    async fn drain(response: FetchResponse) -> Vec<Result<Vec<u8>>> {
        response.body.expect("body").collect().await
    }

    #[tokio::test]
    async fn test_chunks_are_relayed_in_order() {
        let sink = Arc::new(MemorySink::new());
        let tee = TeeFetch::new(sse_fetch(false), sink.clone());

        let response = tee.fetch(FetchRequest::get("https://x.invalid")).await.expect("fetch");
        let seen: Vec<Vec<u8>> = drain(response)
            .await
            .into_iter()
            .map(|c| c.expect("chunk"))
            .collect();

        let expected: Vec<Vec<u8>> = vec![
            b"event: a\n".to_vec(),
            b"data: 1\n\n".to_vec(),
            b"event: b\ndata: 2\n\n".to_vec(),
        ];
        assert_eq!(seen, expected);
        assert_eq!(sink.frames(), expected);
    }

    #[tokio::test]
    async fn test_caller_unaffected_without_connection() {
        let sink = Arc::new(MemorySink::closed());
        let tee = TeeFetch::new(sse_fetch(false), sink.clone());

        let response = tee.fetch(FetchRequest::get("https://x.invalid")).await.expect("fetch");
        let seen = drain(response).await;

        assert_eq!(seen.len(), 3);
        assert!(sink.frames().is_empty());
        assert_eq!(sink.attempts(), 3);
    }

    #[tokio::test]
    async fn test_errors_pass_through() {
        let sink = Arc::new(MemorySink::new());
        let tee = TeeFetch::new(sse_fetch(true), sink.clone());

        let response = tee.fetch(FetchRequest::get("https://x.invalid")).await.expect("fetch");
        let seen = drain(response).await;

        assert_eq!(seen.len(), 4);
        assert!(matches!(seen.last(), Some(Err(Error::Connection { .. }))));
        assert_eq!(sink.frames().len(), 3);
    }

    #[tokio::test]
    async fn test_other_content_types_are_not_relayed() {
        let sink = Arc::new(MemorySink::new());
        let inner: Arc<dyn Fetch> = Arc::new(StaticFetch {
            content_type: "application/json",
            chunks: vec![b"{}"],
            fail_after: false,
        });
        let tee = TeeFetch::new(inner, sink.clone());

        let response = tee.fetch(FetchRequest::get("https://x.invalid")).await.expect("fetch");
        assert_eq!(drain(response).await.len(), 1);
        assert_eq!(sink.attempts(), 0);
    }
}

//! `Fetch` over an HTTP client.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Method};
use tracing::debug;

use crate::error::{Error, Result};

use super::{Fetch, FetchRequest, FetchResponse};

// ============================================================================
// HttpFetch
// ============================================================================

/// Network fetch backed by [`reqwest`], streaming the response body.
#[derive(Debug, Clone, Default)]
pub struct HttpFetch {
    client: Client,
}

impl HttpFetch {
    /// Creates a fetch with a default client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fetch using an existing client.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetch for HttpFetch {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| Error::invalid_argument(format!("bad method: {}", request.method)))?;

        let mut builder = self.client.request(method, request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        debug!(url = %request.url, status, "Fetched");

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(Error::from))
            .boxed();

        Ok(FetchResponse::new(status, headers, Some(body)))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one close-delimited event-stream response.
    async fn serve_once(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await;

            let head = "HTTP/1.1 200 OK\r\n\
                        Content-Type: text/event-stream\r\n\
                        Connection: close\r\n\r\n";
            socket.write_all(head.as_bytes()).await.expect("head");
            socket.write_all(body.as_bytes()).await.expect("body");
            socket.shutdown().await.expect("shutdown");
        });

        format!("http://{addr}/stream")
    }

    #[tokio::test]
    async fn test_streams_event_stream_body() {
        let body = "event: ping\ndata: {\"type\":\"ping\"}\n\n";
        let url = serve_once(body).await;

        let response = HttpFetch::new()
            .fetch(FetchRequest::get(url))
            .await
            .expect("fetch");

        assert_eq!(response.status, 200);
        assert!(response.is_event_stream());

        let mut collected = Vec::new();
        let mut stream = response.body.expect("body");
        while let Some(chunk) = stream.next().await {
            collected.extend(chunk.expect("chunk"));
        }
        assert_eq!(collected, body.as_bytes());
    }

    #[tokio::test]
    async fn test_rejects_invalid_method() {
        let mut request = FetchRequest::get("http://127.0.0.1:1/");
        request.method = "NOT A METHOD".into();

        let err = HttpFetch::new().fetch(request).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }
}

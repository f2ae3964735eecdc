//! Page network capability.
//!
//! The page's outbound fetch is modelled as the [`Fetch`] trait so it can be
//! decorated. [`TeeFetch`] wraps any `Fetch` and copies event-stream bodies
//! to a [`FrameSink`](crate::transport::FrameSink); [`HttpFetch`] is a
//! concrete implementation over an HTTP client.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use chat_relay::network::{Fetch, FetchRequest, HttpFetch};
//!
//! let fetch = agent.install_fetch(Arc::new(HttpFetch::new()));
//! let response = fetch.fetch(FetchRequest::get("https://example.com/stream")).await?;
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// HTTP-backed fetch.
pub mod http;

/// Event-stream tee decorator.
pub mod tee;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::Result;

// ============================================================================
// Re-exports
// ============================================================================

pub use http::HttpFetch;
pub use tee::{TeeFetch, tee_body};

// ============================================================================
// Constants
// ============================================================================

/// Content type marking a live event stream.
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

// ============================================================================
// Types
// ============================================================================

/// Incrementally delivered response body.
pub type ResponseBody = BoxStream<'static, Result<Vec<u8>>>;

/// An outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Absolute URL.
    pub url: String,
    /// HTTP method.
    pub method: String,
    /// Request headers in order.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Option<Vec<u8>>,
}

impl FetchRequest {
    /// Creates a GET request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Creates a POST request with a body.
    #[must_use]
    pub fn post(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            method: "POST".to_string(),
            headers: Vec::new(),
            body: Some(body.into()),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A response whose body may still be streaming.
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers in order.
    pub headers: Vec<(String, String)>,
    /// Body stream, if the response has one.
    pub body: Option<ResponseBody>,
}

impl fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

impl FetchResponse {
    /// Creates a response.
    #[must_use]
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Option<ResponseBody>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Returns the first header with the given name, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the declared content type.
    #[inline]
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Returns `true` if the content type declares a live event stream.
    #[must_use]
    pub fn is_event_stream(&self) -> bool {
        self.content_type()
            .is_some_and(|ct| ct.contains(EVENT_STREAM_CONTENT_TYPE))
    }
}

// ============================================================================
// Fetch
// ============================================================================

/// The page's network fetch capability.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Performs a request and returns once headers are available.
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse>;
}

// ============================================================================
// Tests
// ============================================================================

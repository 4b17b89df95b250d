//! HTTP transport seam
//!
//! Every network exchange the loader and the spec cache perform goes through
//! [`HttpTransport`]. The production implementation is [`ReqwestTransport`];
//! tests substitute an in-memory server.
//!
//! Redirects are not followed unless a request opts in with
//! [`HttpRequest::following_redirects`]: the spec cache answers `303` to elect
//! a builder, and that response must reach the caller unchanged. Package
//! downloads opt in.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod reqwest_transport;

pub use reqwest::StatusCode;
pub use reqwest_transport::{ReqwestTransport, TransportConfig};

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt::Debug;

/// HTTP methods used by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Fetch
    Get,
    /// Upload / notify
    Put,
}

/// Outgoing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute URL
    pub url: String,
    /// Extra headers, sent in order
    pub headers: Vec<(String, String)>,
    /// Upload body
    pub body: Option<Bytes>,
    /// Follow `3xx` responses instead of returning them
    pub follow_redirects: bool,
}

impl HttpRequest {
    /// GET request without headers
    #[inline]
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            follow_redirects: false,
        }
    }

    /// PUT request with a body
    #[inline]
    #[must_use]
    pub fn put(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            method: Method::Put,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body.into()),
            follow_redirects: false,
        }
    }

    /// Add a header
    #[inline]
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Follow redirects for this request
    #[inline]
    #[must_use]
    pub fn following_redirects(mut self) -> Self {
        self.follow_redirects = true;
        self
    }

    /// Case-insensitive header lookup
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Response as seen by the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: StatusCode,
    /// Response headers, names lowercased
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    /// Response with status and body, no headers
    #[inline]
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Empty-bodied response
    #[inline]
    #[must_use]
    pub fn status(status: StatusCode) -> Self {
        Self::new(status, Bytes::new())
    }

    /// Add a header
    #[inline]
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Transport-level failures (no HTTP status was obtained)
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// URL could not be parsed
    #[error("invalid url '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// Connection, TLS or protocol failure
    #[error("request to {url} failed: {message}")]
    Failed { url: String, message: String },

    /// Request exceeded the configured timeout
    #[error("request to {url} timed out")]
    Timeout { url: String },
}

impl TransportError {
    /// Create a generic failure for `url`
    pub fn failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            url: url.into(),
            message: message.into(),
        }
    }
}

/// Executes HTTP requests without following redirects
#[async_trait]
pub trait HttpTransport: Send + Sync + Debug {
    /// Execute `request` and return whatever status the server answered.
    ///
    /// # Errors
    /// Returns [`TransportError`] only when no response was received.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let resp = HttpResponse::status(StatusCode::SEE_OTHER).with_header("Location", "http://x/up");
        assert_eq!(resp.header("location"), Some("http://x/up"));
        assert_eq!(resp.header("LOCATION"), Some("http://x/up"));
        assert_eq!(resp.header("referer"), None);
    }

    #[test]
    fn request_builders() {
        let req = HttpRequest::get("http://h/p").with_header("Referer", "http://h/");
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.header("referer"), Some("http://h/"));
        assert!(req.body.is_none());

        let put = HttpRequest::put("http://h/p", vec![1u8, 2]);
        assert_eq!(put.method, Method::Put);
        assert_eq!(put.body.as_deref(), Some(&[1u8, 2][..]));
    }
}

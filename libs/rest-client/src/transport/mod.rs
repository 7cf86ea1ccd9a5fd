//! The HTTP transport seam.
//!
//! [`RestClient`](crate::RestClient) never talks to the network itself: it
//! prepares a [`PreparedRequest`] and hands it to a [`Transport`]. The
//! production implementation is [`HyperTransport`]; tests plug in their own.

mod hyper_client;
mod tls;

pub use self::hyper_client::{HyperTransport, HyperTransportBuilder};

use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode, Uri, Version};
use std::fmt::Write as _;
use std::time::Duration;

/// A fully validated request, ready to be executed (and re-executed on retry)
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Whole-request deadline, including the body read
    pub timeout: Option<Duration>,
    pub follow_redirects: bool,
    /// Skip reading the response body
    pub no_body: bool,
}

impl PreparedRequest {
    #[must_use]
    pub fn url(&self) -> String {
        self.uri.to_string()
    }
}

/// What the transport observed for one completed exchange
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// Effective URL after redirects
    pub url: String,
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub total_time: Duration,
    /// Time until the response head arrived
    pub starttransfer_time: Duration,
}

impl RawResponse {
    /// Render the status line and headers as the CRLF-separated text block
    /// that appeared on the wire (without the terminating blank line).
    #[must_use]
    pub fn header_blob(&self) -> String {
        let mut blob = format!("{:?} {}", self.version, self.status);
        for (name, value) in &self.headers {
            let _ = write!(
                blob,
                "\r\n{}: {}",
                name,
                String::from_utf8_lossy(value.as_bytes())
            );
        }
        blob
    }
}

/// Executes prepared requests.
///
/// Implementations report every failure to obtain a response as a
/// [`TransportError`]; HTTP error statuses are successful exchanges.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: PreparedRequest) -> Result<RawResponse, TransportError>;
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_header_blob_format() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/plain"));
        headers.append("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));

        let raw = RawResponse {
            url: "http://www.example.com/".to_owned(),
            status: StatusCode::NOT_FOUND,
            version: Version::HTTP_11,
            headers,
            body: Bytes::new(),
            total_time: Duration::ZERO,
            starttransfer_time: Duration::ZERO,
        };

        assert_eq!(
            raw.header_blob(),
            "HTTP/1.1 404 Not Found\r\ncontent-type: text/plain\r\nset-cookie: a=1\r\nset-cookie: b=2"
        );
    }
}

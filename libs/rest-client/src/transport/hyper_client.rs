use super::tls;
use super::{PreparedRequest, RawResponse, Transport};
use crate::config::{ClientConfig, TlsRootConfig, TransportSecurity};
use crate::error::{RestError, TransportError, TransportErrorKind};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::Request;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::error::Error as StdError;
use std::time::{Duration, Instant};
use tower::ServiceBuilder;
use tower::ServiceExt;
use tower::util::BoxCloneSyncService;
use tower_http::decompression::{DecompressionBody, DecompressionLayer};
use tower_http::follow_redirect::policy::Limited;
use tower_http::follow_redirect::{FollowRedirectLayer, RequestUri};

type ResponseBody = DecompressionBody<Incoming>;
type HyperService = BoxCloneSyncService<
    Request<Full<Bytes>>,
    http::Response<ResponseBody>,
    hyper_util::client::legacy::Error,
>;

/// Production [`Transport`] backed by a pooled hyper client.
///
/// Two service stacks share one connection pool: a plain one, and one that
/// follows redirects up to `max_redirects` hops. Both decompress responses.
#[derive(Clone)]
pub struct HyperTransport {
    direct: HyperService,
    following: HyperService,
    max_body_size: usize,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("max_body_size", &self.max_body_size)
            .finish_non_exhaustive()
    }
}

impl HyperTransport {
    #[must_use]
    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::new()
    }

    async fn round_trip(&self, request: PreparedRequest) -> Result<RawResponse, TransportError> {
        let start = Instant::now();
        let requested = request.uri.clone();

        let mut req = Request::new(Full::new(request.body));
        *req.method_mut() = request.method;
        *req.uri_mut() = request.uri;
        *req.headers_mut() = request.headers;

        let service = if request.follow_redirects {
            self.following.clone()
        } else {
            self.direct.clone()
        };

        let response = service.oneshot(req).await.map_err(|e| classify(&e))?;
        let starttransfer_time = start.elapsed();

        let url = response
            .extensions()
            .get::<RequestUri>()
            .map_or_else(|| requested.to_string(), |uri| uri.0.to_string());

        let (parts, body) = response.into_parts();
        let body = if request.no_body {
            Bytes::new()
        } else {
            read_body_limited(body, self.max_body_size).await?
        };

        Ok(RawResponse {
            url,
            status: parts.status,
            version: parts.version,
            headers: parts.headers,
            body,
            total_time: start.elapsed(),
            starttransfer_time,
        })
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn execute(&self, request: PreparedRequest) -> Result<RawResponse, TransportError> {
        match request.timeout {
            Some(limit) => tokio::time::timeout(limit, self.round_trip(request))
                .await
                .map_err(|_| {
                    TransportError::new(
                        TransportErrorKind::Timeout,
                        format!("operation timed out after {}", humantime::format_duration(limit)),
                    )
                })?,
            None => self.round_trip(request).await,
        }
    }
}

async fn read_body_limited(body: ResponseBody, limit: usize) -> Result<Bytes, TransportError> {
    let mut collected = BytesMut::new();
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|e| {
            TransportError::new(TransportErrorKind::Body, error_chain(&*e))
        })?;
        if let Some(chunk) = frame.data_ref() {
            if collected.len() + chunk.len() > limit {
                return Err(TransportError::new(
                    TransportErrorKind::Body,
                    format!("response body exceeds limit of {limit} bytes"),
                ));
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(collected.freeze())
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

fn is_tls_error(err: &(dyn StdError + 'static)) -> bool {
    if err.is::<rustls::Error>() {
        return true;
    }
    err.downcast_ref::<std::io::Error>()
        .and_then(std::io::Error::get_ref)
        .is_some_and(|inner| inner.is::<rustls::Error>())
}

fn classify(err: &hyper_util::client::legacy::Error) -> TransportError {
    let message = error_chain(err);

    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    let mut kind = if err.is_connect() {
        TransportErrorKind::Connect
    } else {
        TransportErrorKind::Other
    };

    while let Some(cause) = source {
        if is_tls_error(cause) {
            kind = TransportErrorKind::Tls;
            break;
        }
        if let Some(hyper_err) = cause.downcast_ref::<hyper::Error>() {
            if hyper_err.is_timeout() {
                kind = TransportErrorKind::Timeout;
            } else if hyper_err.is_parse()
                || hyper_err.is_parse_status()
                || hyper_err.is_incomplete_message()
            {
                kind = TransportErrorKind::Protocol;
            } else if hyper_err.is_user() {
                kind = TransportErrorKind::InvalidRequest;
            }
        }
        if let Some(io_err) = cause.downcast_ref::<std::io::Error>()
            && io_err.kind() == std::io::ErrorKind::TimedOut
        {
            kind = TransportErrorKind::Timeout;
        }
        source = cause.source();
    }

    TransportError::new(kind, message)
}

/// Builder for [`HyperTransport`]
#[derive(Debug, Clone)]
pub struct HyperTransportBuilder {
    connect_timeout: Duration,
    max_redirects: usize,
    max_body_size: usize,
    tls_roots: TlsRootConfig,
    security: TransportSecurity,
}

impl Default for HyperTransportBuilder {
    fn default() -> Self {
        Self::with_config(&ClientConfig::default())
    }
}

impl HyperTransportBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the transport-level settings from a client configuration
    #[must_use]
    pub fn with_config(config: &ClientConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            max_redirects: config.max_redirects,
            max_body_size: config.max_body_size,
            tls_roots: config.tls_roots,
            security: config.transport_security(),
        }
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    #[must_use]
    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.tls_roots = roots;
        self
    }

    #[must_use]
    pub fn transport_security(mut self, security: TransportSecurity) -> Self {
        self.security = security;
        self
    }

    /// Build the transport
    ///
    /// # Errors
    /// Returns `RestError::Tls` if the root certificates cannot be loaded
    pub fn build(self) -> Result<HyperTransport, RestError> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(self.connect_timeout));

        let https = tls::https_connector(http, self.tls_roots, self.security)?;
        tracing::debug!(
            tls_roots = ?self.tls_roots,
            security = ?self.security,
            connect_timeout = ?self.connect_timeout,
            "built HTTPS connector"
        );

        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .build::<_, Full<Bytes>>(https);

        let direct = ServiceBuilder::new()
            .layer(DecompressionLayer::new())
            .service(client.clone());
        let following = ServiceBuilder::new()
            .layer(DecompressionLayer::new())
            .layer(FollowRedirectLayer::with_policy(Limited::new(
                self.max_redirects,
            )))
            .service(client);

        Ok(HyperTransport {
            direct: BoxCloneSyncService::new(direct),
            following: BoxCloneSyncService::new(following),
            max_body_size: self.max_body_size,
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
    use httpmock::prelude::{GET, MockServer};

    fn prepared(url: &str) -> PreparedRequest {
        PreparedRequest {
            method: Method::GET,
            uri: url.parse::<Uri>().unwrap(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            timeout: Some(Duration::from_secs(5)),
            follow_redirects: false,
            no_body: false,
        }
    }

    fn transport() -> HyperTransport {
        HyperTransport::builder().build().unwrap()
    }

    #[tokio::test]
    async fn test_execute_collects_status_headers_body() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/data").header("x-test", "1");
            then.status(201)
                .header("content-type", "text/plain")
                .body("hello world");
        });

        let mut request = prepared(&server.url("/data"));
        request
            .headers
            .insert("x-test", HeaderValue::from_static("1"));

        let raw = transport().execute(request).await.unwrap();
        assert_eq!(raw.status, StatusCode::CREATED);
        assert_eq!(&raw.body[..], b"hello world");
        assert_eq!(raw.url, server.url("/data"));
        assert!(raw.header_blob().contains("content-type: text/plain"));
        assert!(raw.starttransfer_time <= raw.total_time);
    }

    #[tokio::test]
    async fn test_no_body_skips_read() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(httpmock::Method::HEAD).path("/head");
            then.status(200).header("x-size", "42");
        });

        let mut request = prepared(&server.url("/head"));
        request.method = Method::HEAD;
        request.no_body = true;

        let raw = transport().execute(request).await.unwrap();
        assert_eq!(raw.status, StatusCode::OK);
        assert!(raw.body.is_empty());
        assert_eq!(raw.headers.get("x-size").unwrap(), "42");
    }

    #[tokio::test]
    async fn test_body_over_limit_is_body_error() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/large");
            then.status(200).body("x".repeat(2048));
        });

        let transport = HyperTransport::builder().max_body_size(1024).build().unwrap();
        let err = transport
            .execute(prepared(&server.url("/large")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::Body);
    }

    #[tokio::test]
    async fn test_timeout_is_classified() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).delay(Duration::from_millis(500));
        });

        let mut request = prepared(&server.url("/slow"));
        request.timeout = Some(Duration::from_millis(50));

        let err = transport().execute(request).await.unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::Timeout);
        assert!(err.message().contains("50ms"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_connect_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = transport()
            .execute(prepared(&format!("http://127.0.0.1:{port}/")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::Connect);
    }

    #[tokio::test]
    async fn test_redirects_followed_only_on_request() {
        let server = MockServer::start();
        let _from = server.mock(|when, then| {
            when.method(GET).path("/old");
            then.status(302).header("location", "/new");
        });
        let _to = server.mock(|when, then| {
            when.method(GET).path("/new");
            then.status(200).body("moved");
        });

        let transport = transport();

        let raw = transport
            .execute(prepared(&server.url("/old")))
            .await
            .unwrap();
        assert_eq!(raw.status, StatusCode::FOUND);

        let mut request = prepared(&server.url("/old"));
        request.follow_redirects = true;
        let raw = transport.execute(request).await.unwrap();
        assert_eq!(raw.status, StatusCode::OK);
        assert_eq!(&raw.body[..], b"moved");
        assert_eq!(raw.url, server.url("/new"));
    }

    #[test]
    fn test_tls_only_rejects_nothing_at_build_time() {
        let result = HyperTransport::builder()
            .transport_security(TransportSecurity::TlsOnly)
            .build();
        assert!(result.is_ok());
    }
}

use crate::config::{ClientConfig, TlsRootConfig, TransportSecurity};
use crate::context::ClientContext;
use crate::error::RestError;
use crate::options::{AuthScheme, Credentials, HeaderSet, RequestOptions};
use crate::profiling::ProfilingEntry;
use crate::queue::{Callback, QueueEntry};
use crate::request::RequestBuilder;
use crate::response::Response;
use crate::retry::{RetryPolicy, execute_with_retry};
use crate::transport::{HyperTransportBuilder, PreparedRequest, Transport};
use http::Method;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// What became of a sent request
#[derive(Debug)]
#[must_use]
pub enum Dispatch {
    /// Executed; here is the response (which may itself describe a failure)
    Completed(Response),
    /// Executed and handed to the `on_complete` callback
    Delivered,
    /// Added to the context's batch queue
    Queued,
    /// Rejected before reaching the transport
    Aborted(RestError),
}

impl Dispatch {
    /// The response, if the call completed without a callback
    #[must_use]
    pub fn into_response(self) -> Option<Response> {
        match self {
            Dispatch::Completed(response) => Some(response),
            Dispatch::Delivered | Dispatch::Queued | Dispatch::Aborted(_) => None,
        }
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Dispatch::Aborted(_))
    }
}

/// REST client with default options, retries and optional batching
///
/// Requests are built with [`get`](Self::get), [`post`](Self::post) and
/// friends; per-call settings override the client's defaults. In single mode
/// `send()` executes the request, retrying transport failures per the
/// client's [`RetryPolicy`]. In queue mode `send()` only enqueues it on the
/// shared [`ClientContext`] and [`ClientContext::process_queue`] runs the
/// whole batch concurrently.
///
/// ```ignore
/// let context = ClientContext::new();
/// let client = RestClient::builder(context.clone())
///     .retries_max(3)
///     .slow_response(Some(Duration::from_secs(1)))
///     .build()?;
///
/// let response = client
///     .get("https://api.example.com/items")
///     .send()
///     .await
///     .into_response();
/// ```
#[derive(Clone)]
pub struct RestClient {
    context: ClientContext,
    transport: Arc<dyn Transport>,
    defaults: RequestOptions,
    retry: RetryPolicy,
    slow_response: Option<Duration>,
    security: TransportSecurity,
    queue_enabled: bool,
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("context", &self.context)
            .field("defaults", &self.defaults)
            .field("retry", &self.retry)
            .field("slow_response", &self.slow_response)
            .field("security", &self.security)
            .field("queue_enabled", &self.queue_enabled)
            .finish_non_exhaustive()
    }
}

impl RestClient {
    /// Create a client with default configuration
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails
    pub fn new(context: ClientContext) -> Result<Self, RestError> {
        ClientBuilder::new(context).build()
    }

    #[must_use]
    pub fn builder(context: ClientContext) -> ClientBuilder {
        ClientBuilder::new(context)
    }

    #[must_use]
    pub fn context(&self) -> &ClientContext {
        &self.context
    }

    #[must_use]
    pub fn defaults(&self) -> &RequestOptions {
        &self.defaults
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    #[must_use]
    pub fn transport_security(&self) -> TransportSecurity {
        self.security
    }

    /// Credentials sent with every request
    pub fn set_auth(
        &mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        scheme: AuthScheme,
    ) {
        self.defaults.auth = Some(match scheme {
            AuthScheme::Basic => Credentials::basic(username, password),
        });
    }

    /// Merge into the default headers, or replace them when `overwrite` is set
    pub fn set_headers(&mut self, headers: HeaderSet, overwrite: bool) {
        self.defaults.set_headers(headers, overwrite);
    }

    pub fn set_referer(&mut self, referer: impl Into<String>) {
        self.defaults.referer = Some(referer.into());
    }

    /// Switch between single mode (`false`) and queue mode (`true`)
    pub fn set_queue_enabled(&mut self, enabled: bool) {
        self.queue_enabled = enabled;
    }

    #[must_use]
    pub fn queue_enabled(&self) -> bool {
        self.queue_enabled
    }

    pub fn get(&self, url: &str) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::GET, url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::POST, url)
    }

    pub fn put(&self, url: &str) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::PUT, url)
    }

    pub fn delete(&self, url: &str) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::DELETE, url)
    }

    /// HEAD request; the response body is never read
    pub fn head(&self, url: &str) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::HEAD, url).no_body()
    }

    pub fn options(&self, url: &str) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::OPTIONS, url)
    }

    /// Request with an arbitrary verb; a body set on the builder is sent
    /// whatever the verb
    pub fn custom(&self, method: Method, url: &str) -> RequestBuilder<'_> {
        RequestBuilder::new(self, method, url)
    }

    pub(crate) fn abort(&self, url: &str, err: RestError) -> Dispatch {
        tracing::warn!(url, error = %err, "request aborted");
        Dispatch::Aborted(err)
    }

    pub(crate) async fn dispatch(
        &self,
        url: String,
        request: PreparedRequest,
        callback: Option<Callback>,
    ) -> Dispatch {
        if self.queue_enabled {
            tracing::debug!(url = %url, "request queued");
            self.context.enqueue(QueueEntry {
                url,
                request,
                transport: Arc::clone(&self.transport),
                callback,
            });
            return Dispatch::Queued;
        }

        let response =
            execute_with_retry(self.transport.as_ref(), &request, self.retry, &self.context).await;

        if let Some(threshold) = self.slow_response
            && response.meta().total_time > threshold
        {
            tracing::warn!(
                total_time = ?response.meta().total_time,
                url = %response.url(),
                "slow service response ({:.3}s)",
                response.meta().total_time.as_secs_f64()
            );
        }

        self.context
            .log_profiling(ProfilingEntry::from_info(response.meta()));

        match callback {
            Some(callback) => {
                callback(response);
                Dispatch::Delivered
            }
            None => Dispatch::Completed(response),
        }
    }
}

/// Builder for [`RestClient`]
#[must_use]
pub struct ClientBuilder {
    context: ClientContext,
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    pub fn new(context: ClientContext) -> Self {
        Self {
            context,
            config: ClientConfig::default(),
            transport: None,
        }
    }

    /// Replace every setting with a deserialized configuration
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Total attempts for single-mode requests (1 disables retries)
    pub fn retries_max(mut self, retries_max: u32) -> Self {
        self.config.retries_max = retries_max;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    pub fn log_retries(mut self, log: bool) -> Self {
        self.config.log_retries = log;
        self
    }

    /// Warn about completed requests slower than `threshold`
    pub fn slow_response(mut self, threshold: Option<Duration>) -> Self {
        self.config.slow_response = threshold;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn referer(mut self, referer: impl Into<String>) -> Self {
        self.config.referer = referer.into();
        self
    }

    /// Add or replace a default header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.config
            .headers
            .retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
        self.config.headers.insert(name, value.into());
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.config.max_redirects = max_redirects;
        self
    }

    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.config.tls_roots = roots;
        self
    }

    pub fn transport_security(mut self, security: TransportSecurity) -> Self {
        self.config.allow_insecure_http = security == TransportSecurity::AllowInsecureHttp;
        self
    }

    pub fn queue_enabled(mut self, enabled: bool) -> Self {
        self.config.queue_enabled = enabled;
        self
    }

    /// Use a custom transport instead of the hyper one
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the client
    ///
    /// # Errors
    /// Returns `RestError::Tls` if the default transport cannot load its
    /// root certificates
    pub fn build(self) -> Result<RestClient, RestError> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HyperTransportBuilder::with_config(&self.config).build()?),
        };

        Ok(RestClient {
            context: self.context,
            transport,
            defaults: RequestOptions::from_config(&self.config),
            retry: RetryPolicy::from_config(&self.config),
            slow_response: self.config.slow_response,
            security: self.config.transport_security(),
            queue_enabled: self.config.queue_enabled,
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::error::{TransportError, TransportErrorKind};
    use crate::params::Params;
    use crate::response::QueueMode;
    use crate::transport::RawResponse;
    use async_trait::async_trait;
    use bytes::Bytes;
    use http::{HeaderMap, StatusCode, Version};
    use parking_lot::Mutex;
    use tracing_test::traced_test;

    /// Records every request and answers with a fixed outcome
    #[derive(Default)]
    struct RecordingTransport {
        seen: Mutex<Vec<PreparedRequest>>,
        fail: bool,
        total_time: Duration,
    }

    impl RecordingTransport {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().len()
        }

        fn last(&self) -> PreparedRequest {
            self.seen.lock().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn execute(&self, request: PreparedRequest) -> Result<RawResponse, TransportError> {
            self.seen.lock().push(request.clone());
            if self.fail {
                return Err(TransportError::new(
                    TransportErrorKind::Connect,
                    "connection refused",
                ));
            }
            Ok(RawResponse {
                url: request.url(),
                status: StatusCode::OK,
                version: Version::HTTP_11,
                headers: HeaderMap::new(),
                body: Bytes::from_static(b"{}"),
                total_time: self.total_time,
                starttransfer_time: Duration::ZERO,
            })
        }
    }

    fn client_with(transport: &Arc<RecordingTransport>) -> RestClient {
        RestClient::builder(ClientContext::new())
            .transport(Arc::clone(transport) as Arc<dyn Transport>)
            .build()
            .unwrap()
    }

    #[tokio::test]
    #[traced_test]
    async fn test_empty_url_aborts_without_transport() {
        let transport = Arc::new(RecordingTransport::default());
        let client = client_with(&transport);

        let dispatch = client.get("").send().await;

        assert!(matches!(dispatch, Dispatch::Aborted(RestError::EmptyUrl)));
        assert_eq!(transport.calls(), 0);
        assert!(client.context().profiling().is_empty());
        assert!(logs_contain("request aborted"));
    }

    #[tokio::test]
    async fn test_invalid_url_and_header_abort() {
        let transport = Arc::new(RecordingTransport::default());
        let client = client_with(&transport);

        assert!(client.get("no scheme here").send().await.is_aborted());
        assert!(
            client
                .get("http://www.example.com/")
                .header("X-Bad", "line\nbreak")
                .send()
                .await
                .is_aborted()
        );
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_get_appends_query_and_merges_headers() {
        let transport = Arc::new(RecordingTransport::default());
        let mut client = client_with(&transport);
        client.set_headers(HeaderSet::new().with("X-Client", "1"), false);
        client.set_referer("http://ref.example.com/");

        let response = client
            .get("http://api.example.com/search")
            .query(Params::new().with("q", "rust lang").with("tag", vec!["a", "b"]))
            .header("accept", "text/plain")
            .send()
            .await
            .into_response()
            .unwrap();
        assert!(response.is_success());

        let sent = transport.last();
        assert_eq!(
            sent.url(),
            "http://api.example.com/search?q=rust+lang&tag%5B0%5D=a&tag%5B1%5D=b"
        );
        assert_eq!(sent.headers.get("accept").unwrap(), "text/plain");
        assert_eq!(sent.headers.get("x-client").unwrap(), "1");
        assert_eq!(sent.headers.get("referer").unwrap(), "http://ref.example.com/");
        assert_eq!(sent.headers.get("accept-language").unwrap(), "en-us,en");
    }

    #[tokio::test]
    async fn test_replace_headers_drops_defaults() {
        let transport = Arc::new(RecordingTransport::default());
        let client = client_with(&transport);

        let _ = client
            .get("http://api.example.com/")
            .header("X-Only", "1")
            .replace_headers()
            .send()
            .await;

        let sent = transport.last();
        assert!(sent.headers.get("accept").is_none());
        assert_eq!(sent.headers.get("x-only").unwrap(), "1");
        // user agent is an option of its own, not a default header
        assert!(sent.headers.get("user-agent").is_some());
    }

    #[tokio::test]
    async fn test_custom_verb_keeps_body() {
        let transport = Arc::new(RecordingTransport::default());
        let client = client_with(&transport);

        let _ = client
            .custom(Method::DELETE, "http://api.example.com/items")
            .json(&serde_json::json!({"ids": [1, 2]}))
            .send()
            .await;

        let sent = transport.last();
        assert_eq!(sent.method, Method::DELETE);
        assert_eq!(&sent.body[..], br#"{"ids":[1,2]}"#);
        assert_eq!(sent.headers.get("content-type").unwrap(), "application/json");
    }

    #[tokio::test]
    async fn test_head_sets_no_body() {
        let transport = Arc::new(RecordingTransport::default());
        let client = client_with(&transport);

        let _ = client.head("http://api.example.com/").send().await;
        let sent = transport.last();
        assert_eq!(sent.method, Method::HEAD);
        assert!(sent.no_body);
    }

    #[tokio::test]
    async fn test_set_auth_applies_to_every_call() {
        let transport = Arc::new(RecordingTransport::default());
        let mut client = client_with(&transport);
        client.set_auth("user", "hunter2", AuthScheme::Basic);

        let _ = client.get("http://api.example.com/").send().await;
        assert_eq!(
            transport.last().headers.get("authorization").unwrap(),
            "Basic dXNlcjpodW50ZXIy"
        );
    }

    #[tokio::test]
    async fn test_callback_receives_response() {
        let transport = Arc::new(RecordingTransport::default());
        let client = client_with(&transport);
        let got = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&got);
        let dispatch = client
            .post("http://api.example.com/")
            .form(&[("a", "1")])
            .on_complete(move |response: Response| *slot.lock() = Some(response.http_code()))
            .send()
            .await;

        assert!(matches!(dispatch, Dispatch::Delivered));
        assert_eq!(*got.lock(), Some(200));
        assert_eq!(client.context().profiling().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_call_profiles_every_attempt() {
        let transport = Arc::new(RecordingTransport::failing());
        let client = RestClient::builder(ClientContext::new())
            .retries_max(3)
            .transport(Arc::clone(&transport) as Arc<dyn Transport>)
            .build()
            .unwrap();

        let response = client
            .get("http://down.example.com/")
            .send()
            .await
            .into_response()
            .unwrap();

        assert!(!response.is_success());
        assert_eq!(transport.calls(), 3);
        let profiling = client.context().profiling();
        assert_eq!(profiling.len(), 3);
        assert!(profiling.iter().all(|e| !e.is_success()));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_slow_response_is_logged() {
        let transport = Arc::new(RecordingTransport {
            total_time: Duration::from_millis(1500),
            ..RecordingTransport::default()
        });
        let client = RestClient::builder(ClientContext::new())
            .slow_response(Some(Duration::from_secs(1)))
            .transport(Arc::clone(&transport) as Arc<dyn Transport>)
            .build()
            .unwrap();

        let _ = client.get("http://slow.example.com/").send().await;
        assert!(logs_contain("slow service response (1.500s)"));
    }

    #[tokio::test]
    async fn test_queue_mode_defers_until_processed() {
        let transport = Arc::new(RecordingTransport::default());
        let mut client = client_with(&transport);
        client.set_queue_enabled(true);

        let hits = Arc::new(Mutex::new(Vec::new()));
        for path in ["a", "b"] {
            let hits = Arc::clone(&hits);
            let dispatch = client
                .get(&format!("http://api.example.com/{path}"))
                .on_complete(move |response: Response| {
                    hits.lock().push(response.meta().queue);
                })
                .send()
                .await;
            assert!(matches!(dispatch, Dispatch::Queued));
        }
        assert_eq!(transport.calls(), 0);
        assert_eq!(client.context().queue_len(), 2);

        assert!(client.context().process_queue().await);
        assert_eq!(transport.calls(), 2);
        assert_eq!(*hits.lock(), vec![QueueMode::Batch, QueueMode::Batch]);
        assert_eq!(client.context().queue_len(), 0);
    }

    #[test]
    fn test_builder_from_config() {
        let config = ClientConfig {
            retries_max: 5,
            queue_enabled: true,
            allow_insecure_http: false,
            ..ClientConfig::default()
        };
        let client = RestClient::builder(ClientContext::new())
            .with_config(config)
            .header("accept", "text/csv")
            .transport(Arc::new(RecordingTransport::default()))
            .build()
            .unwrap();

        assert_eq!(client.retry_policy().max_attempts(), 5);
        assert!(client.queue_enabled());
        assert_eq!(client.transport_security(), TransportSecurity::TlsOnly);
        let headers = client.defaults().headers.as_ref().unwrap();
        assert_eq!(headers.get("Accept"), Some("text/csv"));
        assert_eq!(headers.len(), 3);
    }
}

use crate::client::{Dispatch, RestClient};
use crate::config::TransportSecurity;
use crate::error::RestError;
use crate::options::{Body, Credentials, HeaderSet, RequestOptions};
use crate::params::{UrlParams, append_query};
use crate::queue::Callback;
use crate::response::Response;
use crate::transport::PreparedRequest;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderName, HeaderValue, REFERER, USER_AGENT};
use http::{HeaderMap, Method, Uri};
use serde::Serialize;
use std::time::Duration;

/// Per-call request builder
///
/// Created by [`RestClient::get`], [`RestClient::post`], etc. Every setter
/// is an override on top of the client's defaults; nothing is validated
/// until [`send()`](RequestBuilder::send), which reports bad input as
/// [`Dispatch::Aborted`].
///
/// ```ignore
/// let dispatch = client
///     .get("https://api.example.com/search")
///     .query(Params::new().with("q", "rust").with("tag", vec!["a", "b"]))
///     .header("X-Request-Id", "abc123")
///     .send()
///     .await;
/// ```
#[must_use = "RequestBuilder does nothing until .send() is called"]
pub struct RequestBuilder<'a> {
    client: &'a RestClient,
    url: String,
    query: Option<UrlParams>,
    overrides: RequestOptions,
    callback: Option<Callback>,
    /// Error captured while building (reported by `send()`)
    error: Option<RestError>,
}

impl<'a> RequestBuilder<'a> {
    pub(crate) fn new(client: &'a RestClient, method: Method, url: &str) -> Self {
        Self {
            client,
            url: url.to_owned(),
            query: None,
            overrides: RequestOptions {
                method: Some(method),
                ..RequestOptions::default()
            },
            callback: None,
            error: None,
        }
    }

    /// Set one header, replacing a default of the same name
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides
            .headers
            .get_or_insert_with(HeaderSet::new)
            .insert(name, value);
        self
    }

    /// Merge a set of headers into this call's headers
    pub fn headers(mut self, headers: &HeaderSet) -> Self {
        self.overrides
            .headers
            .get_or_insert_with(HeaderSet::new)
            .extend_from(headers);
        self
    }

    /// Send only this call's headers, dropping the client defaults
    pub fn replace_headers(mut self) -> Self {
        self.overrides.replace_headers = true;
        self
    }

    /// Query parameters appended to the URL
    pub fn query(mut self, params: impl Into<UrlParams>) -> Self {
        self.query = Some(params.into());
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.overrides.body = Some(body.into());
        self
    }

    /// Form-urlencoded body
    pub fn form<K: ToString, V: ToString>(mut self, pairs: &[(K, V)]) -> Self {
        let pairs = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.overrides.body = Some(Body::Form(pairs));
        self
    }

    /// JSON body; a serialization failure aborts the call on `send()`
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        if self.error.is_some() {
            return self;
        }
        match serde_json::to_value(value) {
            Ok(value) => self.overrides.body = Some(Body::Json(value)),
            Err(e) => self.error = Some(RestError::Json(e)),
        }
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.overrides.timeout = Some(timeout);
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.overrides.follow_redirects = Some(follow);
        self
    }

    pub fn referer(mut self, referer: impl Into<String>) -> Self {
        self.overrides.referer = Some(referer.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.overrides.user_agent = Some(user_agent.into());
        self
    }

    /// Basic authentication for this call only
    pub fn auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.overrides.auth = Some(Credentials::basic(username, password));
        self
    }

    pub(crate) fn no_body(mut self) -> Self {
        self.overrides.no_body = Some(true);
        self
    }

    /// Receive the response through a callback instead of the return value.
    ///
    /// In queue mode this is the only way to see the response.
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Response) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Validate and execute (or enqueue) the request
    pub async fn send(self) -> Dispatch {
        let client = self.client;

        if let Some(err) = self.error {
            return client.abort(&self.url, err);
        }
        if self.url.is_empty() {
            return client.abort(&self.url, RestError::EmptyUrl);
        }

        let url = match &self.query {
            Some(params) => append_query(&self.url, &params.to_query()),
            None => self.url,
        };

        let options = client.defaults().merge(&self.overrides);
        match prepare_request(&url, &options, client.transport_security()) {
            Ok(request) => client.dispatch(url, request, self.callback).await,
            Err(err) => client.abort(&url, err),
        }
    }
}

fn validate_url(url: &str, security: TransportSecurity) -> Result<Uri, RestError> {
    let invalid = |reason: &str| RestError::InvalidUri {
        url: url.to_owned(),
        reason: reason.to_owned(),
    };

    let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| invalid(&e.to_string()))?;
    if uri.authority().is_none() {
        return Err(invalid("missing host/authority"));
    }

    match (uri.scheme_str(), security) {
        (Some("https"), _) | (Some("http"), TransportSecurity::AllowInsecureHttp) => Ok(uri),
        (Some("http"), TransportSecurity::TlsOnly) => {
            Err(invalid("HTTPS required (transport security is TlsOnly)"))
        }
        (Some(_), _) => Err(invalid("only http:// and https:// schemes are supported")),
        (None, _) => Err(invalid("missing scheme")),
    }
}

/// Turn merged options into a transport request.
///
/// User agent, referer and credentials go in first so that an explicit
/// header of the same name wins.
pub(crate) fn prepare_request(
    url: &str,
    options: &RequestOptions,
    security: TransportSecurity,
) -> Result<PreparedRequest, RestError> {
    let uri = validate_url(url, security)?;
    let method = options.method.clone().unwrap_or(Method::GET);

    let mut headers = HeaderMap::new();
    if let Some(user_agent) = options.user_agent.as_deref().filter(|ua| !ua.is_empty()) {
        headers.insert(USER_AGENT, HeaderValue::try_from(user_agent)?);
    }
    if let Some(referer) = options.referer.as_deref().filter(|r| !r.is_empty()) {
        headers.insert(REFERER, HeaderValue::try_from(referer)?);
    }
    if let Some(auth) = &options.auth {
        let mut value = HeaderValue::try_from(auth.header_value())?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }
    if let Some(set) = &options.headers {
        for (label, value) in set.iter() {
            headers.insert(HeaderName::try_from(label)?, HeaderValue::try_from(value)?);
        }
    }

    let body = match &options.body {
        Some(body) => {
            let (bytes, content_type) = body.encode()?;
            if let Some(content_type) = content_type
                && !headers.contains_key(CONTENT_TYPE)
            {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
            bytes
        }
        None => bytes::Bytes::new(),
    };

    Ok(PreparedRequest {
        no_body: options.no_body.unwrap_or(false) || method == Method::HEAD,
        method,
        uri,
        headers,
        body,
        timeout: options.timeout,
        follow_redirects: options.follow_redirects.unwrap_or(false),
    })
}

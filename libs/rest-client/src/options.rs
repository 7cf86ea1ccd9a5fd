//! Per-request options and their merge rules.

use crate::config::ClientConfig;
use crate::error::RestError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::Method;
use std::fmt;
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Ordered header list with ASCII case-insensitive labels.
///
/// Setting an existing label replaces its value in place; new labels are
/// appended, so the wire order follows first insertion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<(String, String)>,
}

impl HeaderSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(label, value);
        self
    }

    pub fn insert(&mut self, label: impl Into<String>, value: impl Into<String>) {
        let label = label.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&label))
        {
            Some(slot) => slot.1 = value,
            None => self.entries.push((label, value)),
        }
    }

    #[must_use]
    pub fn get(&self, label: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(label))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn contains(&self, label: &str) -> bool {
        self.get(label).is_some()
    }

    /// Merge `other` on top of `self`: its values win, its new labels are appended
    pub fn extend_from(&mut self, other: &HeaderSet) {
        for (label, value) in &other.entries {
            self.insert(label.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = HeaderSet::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

/// Request payload
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Text(String),
    Bytes(Bytes),
    /// Sent as `application/x-www-form-urlencoded`
    Form(Vec<(String, String)>),
    /// Sent as `application/json`
    Json(serde_json::Value),
}

impl Body {
    /// Serialize the payload, returning the bytes and the implied content type
    ///
    /// # Errors
    /// Returns `RestError::FormEncode` or `RestError::Json` on encoding failure
    pub fn encode(&self) -> Result<(Bytes, Option<&'static str>), RestError> {
        Ok(match self {
            Body::Text(text) => (Bytes::from(text.clone()), None),
            Body::Bytes(bytes) => (bytes.clone(), None),
            Body::Form(pairs) => (
                Bytes::from(serde_urlencoded::to_string(pairs)?),
                Some("application/x-www-form-urlencoded"),
            ),
            Body::Json(value) => (
                Bytes::from(serde_json::to_vec(value)?),
                Some("application/json"),
            ),
        })
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_owned())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Body::Json(value)
    }
}

/// Authentication scheme for [`RestClient::set_auth`](crate::RestClient::set_auth)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthScheme {
    #[default]
    Basic,
}

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct Password(String);

/// Basic authentication credentials; the password is redacted in `Debug`
/// and zeroed on drop.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: Password,
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Password(password.into()),
        }
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// `Authorization` header value
    #[must_use]
    pub fn header_value(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password.0);
        format!("Basic {}", STANDARD.encode(raw))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl PartialEq for Credentials {
    fn eq(&self, other: &Self) -> bool {
        self.username == other.username && self.password.0 == other.password.0
    }
}

/// Transport options for one request.
///
/// Every field is optional so the same type holds a client's full default
/// set and a sparse per-call override; see [`RequestOptions::merge`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub method: Option<Method>,
    pub headers: Option<HeaderSet>,
    /// Override headers replace the defaults instead of merging into them
    pub replace_headers: bool,
    pub body: Option<Body>,
    pub auth: Option<Credentials>,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
    pub timeout: Option<Duration>,
    pub follow_redirects: Option<bool>,
    /// Discard the response body (set for HEAD)
    pub no_body: Option<bool>,
}

impl RequestOptions {
    /// Full option set built from the default configuration
    #[must_use]
    pub fn defaults() -> Self {
        Self::from_config(&ClientConfig::default())
    }

    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            method: Some(Method::GET),
            headers: Some(config.headers.iter().collect()),
            replace_headers: false,
            body: None,
            auth: None,
            referer: Some(config.referer.clone()),
            user_agent: Some(config.user_agent.clone()),
            timeout: Some(config.timeout),
            follow_redirects: Some(config.follow_redirects),
            no_body: Some(false),
        }
    }

    /// Merge per-call `overrides` on top of `self`; the call wins field by
    /// field and headers merge unless the call asked for replacement.
    #[must_use]
    pub fn merge(&self, overrides: &RequestOptions) -> RequestOptions {
        let headers = match (&self.headers, &overrides.headers) {
            (_, Some(call)) if overrides.replace_headers => Some(call.clone()),
            (_, None) if overrides.replace_headers => Some(HeaderSet::new()),
            (Some(base), Some(call)) => {
                let mut merged = base.clone();
                merged.extend_from(call);
                Some(merged)
            }
            (base, call) => call.clone().or_else(|| base.clone()),
        };

        RequestOptions {
            method: overrides.method.clone().or_else(|| self.method.clone()),
            headers,
            replace_headers: false,
            body: overrides.body.clone().or_else(|| self.body.clone()),
            auth: overrides.auth.clone().or_else(|| self.auth.clone()),
            referer: overrides.referer.clone().or_else(|| self.referer.clone()),
            user_agent: overrides
                .user_agent
                .clone()
                .or_else(|| self.user_agent.clone()),
            timeout: overrides.timeout.or(self.timeout),
            follow_redirects: overrides.follow_redirects.or(self.follow_redirects),
            no_body: overrides.no_body.or(self.no_body),
        }
    }

    /// Merge into (or replace) the header set
    pub fn set_headers(&mut self, headers: HeaderSet, overwrite: bool) {
        match (&mut self.headers, overwrite) {
            (Some(existing), false) => existing.extend_from(&headers),
            _ => self.headers = Some(headers),
        }
    }
}

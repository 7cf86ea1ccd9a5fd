use std::fmt;
use thiserror::Error;

/// Classification of per-request transport failures.
///
/// The stable name returned by [`TransportErrorKind::as_str`] is what the
/// profiling log records as the failure's error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum TransportErrorKind {
    /// Connection could not be established (refused, DNS failure, unreachable)
    Connect,
    /// Request did not complete within its timeout
    Timeout,
    /// TLS handshake or certificate failure
    Tls,
    /// Malformed or unexpected HTTP traffic
    Protocol,
    /// Response body could not be read (or exceeded the size limit)
    Body,
    /// Request was rejected before it reached the network
    InvalidRequest,
    /// Anything the transport could not classify
    Other,
}

impl TransportErrorKind {
    /// Stable snake_case name of the kind
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::Tls => "tls",
            Self::Protocol => "protocol",
            Self::Body => "body",
            Self::InvalidRequest => "invalid_request",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed transport attempt.
///
/// This is the only recoverable failure in the crate: the client retries it
/// according to its [`RetryPolicy`](crate::RetryPolicy) and finally turns it
/// into a failure [`Response`](crate::Response).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("({kind}) {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Client construction, configuration and request-shaping errors
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RestError {
    /// Request issued without a URL
    #[error("No URL passed to the request")]
    EmptyUrl,

    /// URL could not be parsed or lacks scheme/host
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        /// The URL that failed validation
        url: String,
        /// Diagnostic message (for logging only)
        reason: String,
    },

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// JSON body serialization failed
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Form body encoding failed
    #[error("Form encoding failed: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),

    /// TLS setup failed while building the transport
    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Configuration could not be loaded or deserialized
    #[error("Configuration error: {0}")]
    Config(#[source] Box<figment::Error>),
}

impl From<figment::Error> for RestError {
    fn from(err: figment::Error) -> Self {
        RestError::Config(Box::new(err))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::error::Error;
    use std::fmt;

    #[derive(Debug)]
    struct TestError(&'static str);

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl Error for TestError {}

    #[test]
    fn test_tls_error_preserves_source() {
        let err = RestError::Tls(Box::new(TestError("certificate expired")));

        let source = err.source();
        assert!(source.is_some(), "TLS error should have a source");

        let downcast = source.unwrap().downcast_ref::<TestError>();
        assert_eq!(downcast.unwrap().0, "certificate expired");
    }

    #[test]
    fn test_transport_error_display_names_kind() {
        let err = TransportError::new(TransportErrorKind::Connect, "connection refused");
        assert_eq!(err.to_string(), "(connect) connection refused");
        assert_eq!(err.kind(), TransportErrorKind::Connect);
        assert_eq!(err.message(), "connection refused");
    }

    #[test]
    fn test_kind_names_are_snake_case() {
        assert_eq!(TransportErrorKind::InvalidRequest.as_str(), "invalid_request");
        assert_eq!(
            serde_json::to_string(&TransportErrorKind::Timeout).unwrap(),
            "\"timeout\""
        );
    }

    #[test]
    fn test_config_error_from_figment() {
        let err: RestError = figment::Error::from("missing field `url`".to_owned()).into();
        assert!(matches!(err, RestError::Config(_)));
        assert!(err.to_string().contains("missing field"));
    }
}

use crate::error::{TransportError, TransportErrorKind};
use crate::options::HeaderSet;
use crate::transport::RawResponse;
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;

/// Whether a request ran on its own or as part of a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueMode {
    #[default]
    Single,
    Batch,
}

impl QueueMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Batch => "batch",
        }
    }
}

/// A value looked up through [`Response::field`] or [`TransferInfo::get`]
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Text(String),
    Int(u64),
    /// Durations are reported in seconds
    Float(f64),
    Bool(bool),
}

impl MetaValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Transfer metrics reported for one request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransferInfo {
    pub url: String,
    /// The transport produced a response (any HTTP status)
    pub is_success: bool,
    /// 0 when no response was received
    pub http_code: u16,
    pub content_type: Option<String>,
    pub total_time: Duration,
    pub starttransfer_time: Duration,
    pub size_download: u64,
    pub header_size: u64,
    pub queue: QueueMode,
    pub error_code: Option<TransportErrorKind>,
    pub error: Option<String>,
}

impl TransferInfo {
    /// Look a metric up by name
    #[must_use]
    pub fn get(&self, key: &str) -> Option<MetaValue> {
        match key {
            "url" => Some(MetaValue::Text(self.url.clone())),
            "is_success" => Some(MetaValue::Bool(self.is_success)),
            "http_code" => Some(MetaValue::Int(u64::from(self.http_code))),
            "content_type" => self.content_type.clone().map(MetaValue::Text),
            "total_time" => Some(MetaValue::Float(self.total_time.as_secs_f64())),
            "starttransfer_time" => Some(MetaValue::Float(self.starttransfer_time.as_secs_f64())),
            "size_download" => Some(MetaValue::Int(self.size_download)),
            "header_size" => Some(MetaValue::Int(self.header_size)),
            "queue" => Some(MetaValue::Text(self.queue.as_str().to_owned())),
            "error_code" => self
                .error_code
                .map(|kind| MetaValue::Text(kind.as_str().to_owned())),
            "error" => self.error.clone().map(MetaValue::Text),
            _ => None,
        }
    }
}

/// Outcome of one request, successful or not.
///
/// A failed transfer is still a `Response`: `is_success()` is false, the
/// body is empty and [`TransferInfo::error`] carries the transport message.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    meta: TransferInfo,
    header: HeaderSet,
    data: Bytes,
}

impl Response {
    /// Build a response, parsing `raw_header` when given
    #[must_use]
    pub fn new(meta: TransferInfo, data: Bytes, raw_header: Option<&str>) -> Self {
        Self {
            meta,
            header: raw_header.map(Self::parse_header).unwrap_or_default(),
            data,
        }
    }

    /// Parse a raw header block.
    ///
    /// Each line is split on its first colon; the value is kept verbatim,
    /// including any leading space. Lines without a colon (the status line,
    /// blank lines) are skipped and a repeated label keeps its last value.
    #[must_use]
    pub fn parse_header(raw: &str) -> HeaderSet {
        let mut header = HeaderSet::new();
        for line in raw.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if let Some((label, value)) = line.split_once(':') {
                header.insert(label, value);
            }
        }
        header
    }

    pub(crate) fn from_raw(raw: RawResponse, queue: QueueMode) -> Self {
        let blob = raw.header_blob();
        let meta = TransferInfo {
            url: raw.url,
            is_success: true,
            http_code: raw.status.as_u16(),
            content_type: raw
                .headers
                .get(http::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned),
            total_time: raw.total_time,
            starttransfer_time: raw.starttransfer_time,
            size_download: raw.body.len() as u64,
            // status line and headers plus the terminating blank line
            header_size: blob.len() as u64 + 4,
            queue,
            error_code: None,
            error: None,
        };
        Self::new(meta, raw.body, Some(&blob))
    }

    pub(crate) fn from_error(
        url: impl Into<String>,
        err: &TransportError,
        elapsed: Duration,
        queue: QueueMode,
    ) -> Self {
        let meta = TransferInfo {
            url: url.into(),
            is_success: false,
            total_time: elapsed,
            queue,
            error_code: Some(err.kind()),
            error: Some(err.message().to_owned()),
            ..TransferInfo::default()
        };
        Self::new(meta, Bytes::new(), None)
    }

    #[must_use]
    pub fn meta(&self) -> &TransferInfo {
        &self.meta
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderSet {
        &self.header
    }

    /// Header value by label (ASCII case-insensitive), verbatim as received
    #[must_use]
    pub fn header(&self, label: &str) -> Option<&str> {
        self.header.get(label)
    }

    #[must_use]
    pub fn meta_field(&self, key: &str) -> Option<MetaValue> {
        self.meta.get(key)
    }

    /// Transfer metrics first, then headers.
    ///
    /// An unknown key is not an error: it is reported at `warn` level and
    /// yields `None`.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<MetaValue> {
        if let Some(value) = self.meta.get(key) {
            return Some(value);
        }
        if let Some(value) = self.header.get(key) {
            return Some(MetaValue::Text(value.to_owned()));
        }
        tracing::warn!(key, url = %self.meta.url, "reference to unknown response field");
        None
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.meta.is_success
    }

    #[must_use]
    pub fn http_code(&self) -> u16 {
        self.meta.http_code
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.meta.url
    }

    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Body as text, replacing invalid UTF-8
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    /// Deserialize the body as JSON
    ///
    /// # Errors
    /// Returns the `serde_json` error if the body is not valid JSON for `T`
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.data)
    }
}

use crate::error::RestError;
use crate::profiling::DEFAULT_PROFILING_MAX;
use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Default User-Agent string for requests
pub const DEFAULT_USER_AGENT: &str = concat!("rest-client/", env!("CARGO_PKG_VERSION"));

/// Environment prefix for configuration overrides (`REST_CLIENT_CLIENT__RETRIES_MAX=3`)
pub const ENV_PREFIX: &str = "REST_CLIENT_";

/// Headers sent with every request unless replaced
#[must_use]
pub fn default_headers() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Accept".to_owned(), "application/json".to_owned()),
        ("Accept-Language".to_owned(), "en-us,en".to_owned()),
        ("Accept-Encoding".to_owned(), "gzip, deflate".to_owned()),
    ])
}

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Transport security configuration
///
/// Controls whether plain `http://` URLs are accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// Accept both `http://` and `https://` URLs
    #[default]
    AllowInsecureHttp,
    /// Require TLS for all connections (HTTPS only)
    TlsOnly,
}

/// Client configuration
///
/// Durations use humantime notation (`"200ms"`, `"10s"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[allow(clippy::struct_excessive_bools)]
pub struct ClientConfig {
    /// Total attempts for a single-mode request (default: 1, no retry)
    pub retries_max: u32,

    /// Delay between attempts (default: 200ms)
    #[serde(with = "humantime_duration")]
    pub retry_delay: Duration,

    /// Log every retry at warn level (default: false)
    pub log_retries: bool,

    /// Completed requests slower than this are logged (default: disabled)
    #[serde(with = "humantime_duration::option")]
    pub slow_response: Option<Duration>,

    /// Connection establishment timeout (default: 2s)
    #[serde(with = "humantime_duration")]
    pub connect_timeout: Duration,

    /// Whole-request timeout (default: 10s)
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,

    /// User-Agent header value
    pub user_agent: String,

    /// Referer header value, omitted when empty
    pub referer: String,

    /// Follow 3xx redirects (default: false)
    pub follow_redirects: bool,

    /// Redirect hop limit when following (default: 10)
    pub max_redirects: usize,

    /// Maximum response body size in bytes (default: 10 MB)
    pub max_body_size: usize,

    /// Default request headers
    pub headers: BTreeMap<String, String>,

    /// Root certificate source
    pub tls_roots: TlsRootConfig,

    /// Accept plain `http://` URLs (default: true)
    pub allow_insecure_http: bool,

    /// Start in queue mode (default: false)
    pub queue_enabled: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retries_max: 1,
            retry_delay: Duration::from_millis(200),
            log_retries: false,
            slow_response: None,
            connect_timeout: Duration::from_secs(2),
            timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            referer: String::new(),
            follow_redirects: false,
            max_redirects: 10,
            max_body_size: 10 * 1024 * 1024,
            headers: default_headers(),
            tls_roots: TlsRootConfig::default(),
            allow_insecure_http: true,
            queue_enabled: false,
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn transport_security(&self) -> TransportSecurity {
        if self.allow_insecure_http {
            TransportSecurity::AllowInsecureHttp
        } else {
            TransportSecurity::TlsOnly
        }
    }
}

/// Configuration of one named remote service.
///
/// Only `url` has a fixed meaning; every other key is kept as-is in `settings`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(flatten)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl ServiceConfig {
    /// Look up an arbitrary setting by key
    #[must_use]
    pub fn setting(&self, key: &str) -> Option<&serde_json::Value> {
        self.settings.get(key)
    }
}

/// Named service configurations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServicesConfig {
    services: BTreeMap<String, ServiceConfig>,
}

impl ServicesConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a service
    #[must_use]
    pub fn with_service(mut self, name: impl Into<String>, config: ServiceConfig) -> Self {
        self.services.insert(name.into(), config);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }
}

/// Everything a host application configures for the client, as loaded from
/// one YAML document:
///
/// ```yaml
/// profiling_max: 50
/// client:
///   retries_max: 3
///   retry_delay: 250ms
///   slow_response: 1s
/// services:
///   search:
///     url: https://search.internal/api
///     index: images
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Profiling log capacity for the context
    pub profiling_max: usize,
    pub client: ClientConfig,
    pub services: ServicesConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            profiling_max: DEFAULT_PROFILING_MAX,
            client: ClientConfig::default(),
            services: ServicesConfig::default(),
        }
    }
}

impl Settings {
    /// Extract settings from an already assembled figment
    ///
    /// # Errors
    /// Returns `RestError::Config` if the figment does not deserialize
    pub fn from_figment(figment: &Figment) -> Result<Self, RestError> {
        Ok(figment.extract()?)
    }

    /// Load settings from a YAML file, overridden by `REST_CLIENT_*` variables
    ///
    /// Nested keys are separated by a double underscore:
    /// `REST_CLIENT_SERVICES__SEARCH__URL` sets `services.search.url`.
    ///
    /// # Errors
    /// Returns `RestError::Config` if the file is unreadable or malformed
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, RestError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(figment::Error::from(format!(
                "configuration file not found: {}",
                path.display()
            ))
            .into());
        }
        let figment = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(&figment)
    }
}

/// Serde adapter for humantime-formatted durations
mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(&raw).map_err(de::Error::custom)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer, de};
        use std::time::Duration;

        #[allow(clippy::ref_option)]
        pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => s.collect_str(&humantime::format_duration(*d)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|raw| humantime::parse_duration(&raw).map_err(de::Error::custom))
                .transpose()
        }
    }
}

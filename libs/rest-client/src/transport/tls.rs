//! Root certificates and the HTTPS connector.

use crate::config::{TlsRootConfig, TransportSecurity};
use crate::error::RestError;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls_pki_types::CertificateDer;
use std::sync::{Arc, OnceLock};

/// Native roots, loaded once per process. Empty when the OS store has none.
static NATIVE_ROOTS: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

#[cfg(test)]
static LOAD_COUNT: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

fn load_native_roots() -> Vec<CertificateDer<'static>> {
    #[cfg(test)]
    LOAD_COUNT.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

    let result = rustls_native_certs::load_native_certs();
    for err in &result.errors {
        tracing::warn!(error = %err, "error loading native root certificate");
    }

    if result.certs.is_empty() {
        tracing::warn!("no native root CA certificates found");
    } else {
        tracing::debug!(count = result.certs.len(), "loaded native root certificates");
    }
    result.certs
}

pub(crate) fn native_root_certs() -> &'static [CertificateDer<'static>] {
    NATIVE_ROOTS.get_or_init(load_native_roots).as_slice()
}

/// The globally installed crypto provider, or a private aws-lc-rs one
pub(crate) fn crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

fn native_roots_client_config() -> Result<rustls::ClientConfig, RestError> {
    let certs = native_root_certs();
    if certs.is_empty() {
        return Err(RestError::Tls(
            "no native root CA certificates found in OS certificate store".into(),
        ));
    }

    let mut roots = rustls::RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs.iter().cloned());
    if ignored > 0 {
        tracing::warn!(added, ignored, "some native root certificates could not be parsed");
    }
    if added == 0 {
        return Err(RestError::Tls(
            format!("none of the {} native root CA certificates could be parsed", certs.len())
                .into(),
        ));
    }

    let config = rustls::ClientConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| RestError::Tls(Box::new(e)))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(config)
}

/// Build the HTTPS connector around an already configured `HttpConnector`.
///
/// # Errors
/// Returns `RestError::Tls` when the requested roots are unavailable
pub(crate) fn https_connector(
    http: HttpConnector,
    roots: TlsRootConfig,
    security: TransportSecurity,
) -> Result<HttpsConnector<HttpConnector>, RestError> {
    let builder = match roots {
        TlsRootConfig::WebPki => HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(crypto_provider())
            .map_err(|e| RestError::Tls(Box::new(e)))?,
        TlsRootConfig::Native => {
            HttpsConnectorBuilder::new().with_tls_config(native_roots_client_config()?)
        }
    };

    let connector = match security {
        TransportSecurity::AllowInsecureHttp => builder
            .https_or_http()
            .enable_all_versions()
            .wrap_connector(http),
        TransportSecurity::TlsOnly => builder.https_only().enable_all_versions().wrap_connector(http),
    };
    Ok(connector)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_native_roots_loaded_at_most_once() {
        let before = LOAD_COUNT.load(Ordering::SeqCst);
        let first = native_root_certs();
        let second = native_root_certs();

        assert!(LOAD_COUNT.load(Ordering::SeqCst) <= before + 1);
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn test_webpki_connector_builds() {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        let result = https_connector(
            http,
            TlsRootConfig::WebPki,
            TransportSecurity::AllowInsecureHttp,
        );
        assert!(result.is_ok());
    }
}

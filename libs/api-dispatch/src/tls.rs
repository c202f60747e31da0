//! TLS setup for the dispatcher's connector.
//!
//! Native root certificates are read from the OS store once per process and
//! cached, since some platforms make that lookup slow.

use std::sync::{Arc, OnceLock};

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use rustls_pki_types::CertificateDer;

use crate::config::TlsRootConfig;
use crate::error::ConfigError;
use crate::proxy::ProxyConnector;

static NATIVE_ROOTS: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

fn load_native_roots() -> Vec<CertificateDer<'static>> {
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

/// Use the globally installed crypto provider if there is one, otherwise
/// aws-lc-rs without installing it.
fn crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

fn native_roots_client_config() -> Result<rustls::ClientConfig, ConfigError> {
    let certs = NATIVE_ROOTS.get_or_init(load_native_roots);
    let mut store = rustls::RootCertStore::empty();
    let (added, ignored) = store.add_parsable_certificates(certs.iter().cloned());
    if ignored > 0 {
        tracing::warn!(added, ignored, "some native root certificates could not be parsed");
    }
    if added == 0 {
        return Err(ConfigError::Tls(
            format!("no usable native root CA certificates (found {})", certs.len()).into(),
        ));
    }

    let config = rustls::ClientConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| ConfigError::Tls(Box::new(e)))?
        .with_root_certificates(store)
        .with_no_client_auth();
    Ok(config)
}

/// Wrap the proxy-aware connector with TLS.
///
/// Both `http` and `https` destinations are accepted; the API endpoint
/// scheme is whatever the caller passes.
///
/// # Errors
/// Returns `ConfigError::Tls` if the crypto provider cannot be configured or
/// `TlsRootConfig::Native` finds no usable certificate in the OS store.
pub fn https_connector(
    roots: TlsRootConfig,
    inner: ProxyConnector,
) -> Result<HttpsConnector<ProxyConnector>, ConfigError> {
    let builder = match roots {
        TlsRootConfig::WebPki => HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(crypto_provider())
            .map_err(|e| ConfigError::Tls(Box::new(e)))?,
        TlsRootConfig::Native => {
            HttpsConnectorBuilder::new().with_tls_config(native_roots_client_config()?)
        }
    };
    Ok(builder
        .https_or_http()
        .enable_all_versions()
        .wrap_connector(inner))
}

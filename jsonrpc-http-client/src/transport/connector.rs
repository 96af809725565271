//! TLS setup for the hyper connector.
//!
//! # Feature Flags
//!
//! TLS needs both a crypto provider and root certificates:
//!
//! - **Crypto providers** (choose one):
//!   - `tls-ring` - Use ring crypto (default with `tls` feature)
//!   - `tls-aws-lc` - Use AWS LC crypto
//!
//! - **Root certificates** (choose one):
//!   - `tls-native-roots` - Use system root certificates (default with `tls` feature)
//!   - `tls-webpki-roots` - Use bundled Mozilla root certificates
//!
//! Without a feature-gated provider the process-wide default installed with
//! `CryptoProvider::install_default()` is used. Without any provider the
//! client speaks plain HTTP only.

use std::sync::Arc;

use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::error::ClientBuildError;

/// TLS policy for `https` endpoints.
///
/// Platform defaults apply unless something is set explicitly.
#[derive(Clone, Debug, Default)]
pub struct TlsOptions {
    /// A complete rustls configuration. Takes precedence over the flags below.
    pub config: Option<ClientConfig>,
    /// Accept certificates whose names do not match the host. The chain is
    /// still verified against the trusted roots.
    pub danger_accept_invalid_hostnames: bool,
    /// Accept any certificate at all.
    pub danger_accept_invalid_certs: bool,
}

/// Returns true if a crypto provider is available, either feature-gated or
/// installed as the process default.
pub fn has_tls_support() -> bool {
    crypto_provider().is_some()
}

fn crypto_provider() -> Option<Arc<CryptoProvider>> {
    #[cfg(feature = "tls-ring")]
    return Some(Arc::new(rustls::crypto::ring::default_provider()));

    #[cfg(all(feature = "tls-aws-lc", not(feature = "tls-ring")))]
    return Some(Arc::new(rustls::crypto::aws_lc_rs::default_provider()));

    #[cfg(not(any(feature = "tls-ring", feature = "tls-aws-lc")))]
    {
        CryptoProvider::get_default().cloned()
    }
}

/// Build the root certificate store from enabled features.
///
/// Empty when no root feature is enabled; supply a custom
/// [`ClientConfig`] in that case.
fn root_store() -> RootCertStore {
    #[allow(unused_mut)]
    let mut roots = RootCertStore::empty();

    // Prefer native roots when both are enabled.
    #[cfg(feature = "tls-native-roots")]
    {
        let native_certs = rustls_native_certs::load_native_certs();
        if !native_certs.errors.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::debug!("errors loading native certs: {:?}", native_certs.errors);
        }
        roots.add_parsable_certificates(native_certs.certs);
    }

    #[cfg(all(feature = "tls-webpki-roots", not(feature = "tls-native-roots")))]
    {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    roots
}

/// Build the rustls configuration for `options`.
///
/// Returns `Ok(None)` when no custom configuration was given and no crypto
/// provider is available.
pub fn build_tls_config(options: &TlsOptions) -> Result<Option<ClientConfig>, ClientBuildError> {
    if let Some(config) = &options.config {
        return Ok(Some(config.clone()));
    }
    let Some(provider) = crypto_provider() else {
        if options.danger_accept_invalid_certs || options.danger_accept_invalid_hostnames {
            return Err(ClientBuildError::Tls(
                "certificate policy set but no crypto provider is available".to_string(),
            ));
        }
        return Ok(None);
    };

    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| ClientBuildError::Tls(e.to_string()))?;

    let config = if options.danger_accept_invalid_certs {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DangerousAcceptAnyCertVerifier::new(
                provider,
            )))
            .with_no_client_auth()
    } else if options.danger_accept_invalid_hostnames {
        let verifier = NoHostnameVerifier::new(Arc::new(root_store()), provider)?;
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth()
    } else {
        builder
            .with_root_certificates(root_store())
            .with_no_client_auth()
    };
    Ok(Some(config))
}

/// A certificate verifier that accepts any certificate.
///
/// # Warning
///
/// This is extremely dangerous and should only be used for development/testing!
/// It makes the connection vulnerable to man-in-the-middle attacks.
#[derive(Debug)]
pub struct DangerousAcceptAnyCertVerifier {
    provider: Arc<CryptoProvider>,
}

impl DangerousAcceptAnyCertVerifier {
    pub fn new(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }
}

impl ServerCertVerifier for DangerousAcceptAnyCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Verifies the certificate chain but ignores a host name mismatch.
#[derive(Debug)]
pub struct NoHostnameVerifier {
    inner: Arc<WebPkiServerVerifier>,
}

impl NoHostnameVerifier {
    pub fn new(
        roots: Arc<RootCertStore>,
        provider: Arc<CryptoProvider>,
    ) -> Result<Self, ClientBuildError> {
        let inner = WebPkiServerVerifier::builder_with_provider(roots, provider)
            .build()
            .map_err(|e| ClientBuildError::Tls(e.to_string()))?;
        Ok(Self { inner })
    }
}

fn is_name_mismatch(error: &rustls::Error) -> bool {
    // Newer rustls releases add a context-carrying variant; both start with
    // the same name.
    matches!(error, rustls::Error::InvalidCertificate(cert)
        if format!("{cert:?}").starts_with("NotValidForName"))
}

impl ServerCertVerifier for NoHostnameVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Err(error) if is_name_mismatch(&error) => Ok(ServerCertVerified::assertion()),
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

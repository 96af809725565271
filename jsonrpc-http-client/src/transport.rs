//! HTTP transport layer.
//!
//! This module provides [`ConnectionManager`], which opens one HTTP exchange
//! per call using hyper_util's legacy client. It supports:
//!
//! - HTTP/1.1 and HTTP/2 with automatic protocol negotiation
//! - TLS with rustls (feature-gated)
//! - Connect and read timeouts
//! - A plain-HTTP forward proxy
//! - Redirects (same scheme only)
//! - A size limit on response bodies
//!
//! # Feature Flags
//!
//! TLS support requires enabling the appropriate features:
//!
//! - `tls` (default) - Enables `tls-ring` + `tls-native-roots` for convenience
//! - `tls-ring` / `tls-aws-lc` - Crypto providers
//! - `tls-native-roots` / `tls-webpki-roots` - Root certificates

mod connector;
mod hyper;
mod proxy;

pub use connector::{
    DangerousAcceptAnyCertVerifier, NoHostnameVerifier, TlsOptions, build_tls_config,
    has_tls_support,
};
pub use hyper::{
    ConnectionManager, ConnectionManagerBuilder, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_REDIRECTS,
    DEFAULT_MAX_RESPONSE_SIZE, DEFAULT_READ_TIMEOUT,
};
pub(crate) use hyper::resolve_location;
pub use proxy::{ProxyConnector, ProxyStream};

// Re-export the rustls config type users need for custom TLS.
pub use rustls::ClientConfig as TlsClientConfig;

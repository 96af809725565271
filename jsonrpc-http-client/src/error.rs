//! Client-side error types.
//!
//! This module provides [`ClientError`], the error type for JSON-RPC calls,
//! and [`ClientBuildError`] for failures while building a client.

use std::io;

use bytes::Bytes;
use http::StatusCode;
use jsonrpc_http_core::{CodecError, JsonRpcError};

use crate::resolver::RegistryError;

/// Errors surfaced by a single call.
///
/// Every variant is terminal for the call that produced it. Nothing is
/// retried.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The client is missing a collaborator it needs, for example a service
    /// id without a discovery registry. Raised before any network activity.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Discovery returned no live instance, or the registry backend failed.
    #[error("no live instance for service {service_id:?}")]
    Resolution {
        service_id: String,
        #[source]
        source: Option<RegistryError>,
    },

    /// Connect, write or read failure at the I/O level.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: io::Error,
    },

    /// Neither response channel could be decoded. `body` holds the raw bytes
    /// read from the error channel.
    #[error("protocol error (status {status:?}): {}", String::from_utf8_lossy(.body))]
    Protocol {
        status: Option<StatusCode>,
        body: Bytes,
    },

    /// Codec failure, propagated unchanged.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The server answered with a JSON-RPC error object.
    #[error(transparent)]
    Rpc(JsonRpcError),
}

impl ClientError {
    /// Create a transport error wrapping an I/O failure.
    pub fn transport<S: Into<String>>(message: S, source: io::Error) -> Self {
        ClientError::Transport {
            message: message.into(),
            source,
        }
    }

    /// Create a configuration error.
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        ClientError::Configuration(message.into())
    }

    /// Returns true for configuration errors.
    pub fn is_configuration(&self) -> bool {
        matches!(self, ClientError::Configuration(_))
    }

    /// Returns true for resolution errors.
    pub fn is_resolution(&self) -> bool {
        matches!(self, ClientError::Resolution { .. })
    }

    /// Returns true for transport errors.
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport { .. })
    }

    /// Returns true for protocol errors.
    pub fn is_protocol(&self) -> bool {
        matches!(self, ClientError::Protocol { .. })
    }

    /// Returns true for timeouts.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Transport { source, .. } if source.kind() == io::ErrorKind::TimedOut)
    }

    /// Get the raw error-channel bytes of a protocol error.
    pub fn raw_body(&self) -> Option<&Bytes> {
        match self {
            ClientError::Protocol { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Get the JSON-RPC error object, if the server sent one.
    pub fn rpc_error(&self) -> Option<&JsonRpcError> {
        match self {
            ClientError::Rpc(error) => Some(error),
            _ => None,
        }
    }
}

/// Errors while building a client.
#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    /// The static URL could not be parsed.
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Both or neither of a static URL and a service id were configured.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// A default header could not be represented.
    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },

    /// The proxy address could not be parsed.
    #[error("invalid proxy {proxy:?}: {reason}")]
    InvalidProxy { proxy: String, reason: String },

    /// The TLS configuration could not be built.
    #[error("TLS configuration error: {0}")]
    Tls(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonrpc_http_core::ErrorCode;

    #[test]
    fn test_transport_keeps_source() {
        let err = ClientError::transport(
            "read failed",
            io::Error::new(io::ErrorKind::ConnectionReset, "reset"),
        );
        assert!(err.is_transport());
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "reset");
    }

    #[test]
    fn test_timeout_detection() {
        let err = ClientError::transport("read", io::Error::from(io::ErrorKind::TimedOut));
        assert!(err.is_timeout());
        let err = ClientError::transport("read", io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_protocol_display_is_lossy_text() {
        let err = ClientError::Protocol {
            status: Some(StatusCode::BAD_GATEWAY),
            body: Bytes::from_static(b"<html>bad gateway</html>"),
        };
        assert!(err.to_string().contains("<html>bad gateway</html>"));
        assert_eq!(err.raw_body().unwrap().as_ref(), b"<html>bad gateway</html>");
    }

    #[test]
    fn test_resolution_display() {
        let err = ClientError::Resolution {
            service_id: "calc-service".to_string(),
            source: None,
        };
        assert!(err.is_resolution());
        assert!(err.to_string().contains("calc-service"));
    }

    #[test]
    fn test_rpc_error_accessor() {
        let err = ClientError::Rpc(JsonRpcError::new(ErrorCode::MethodNotFound, "nope"));
        assert_eq!(err.rpc_error().unwrap().code(), ErrorCode::MethodNotFound);
        assert!(ClientError::configuration("x").rpc_error().is_none());
    }
}

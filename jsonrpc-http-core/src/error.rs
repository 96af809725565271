//! JSON-RPC error codes and types.
//!
//! This module provides the error types shared by codecs and clients:
//! - [`ErrorCode`]: Standard and application-defined JSON-RPC error codes
//! - [`JsonRpcError`]: The error object carried in a JSON-RPC response
//! - [`CodecError`]: Failures while encoding a request or decoding a response

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// JSON-RPC 2.0 error codes.
///
/// The reserved range `-32768..=-32000` is split into the five predefined codes
/// and the implementation-defined server error range `-32099..=-32000`. Any
/// other value is application defined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    /// Implementation-defined server error (`-32099..=-32000`).
    ServerError(i64),
    /// Any code outside the reserved range.
    Application(i64),
}

impl ErrorCode {
    /// Get the numeric value of this code.
    pub fn code(&self) -> i64 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
            ErrorCode::ServerError(code) | ErrorCode::Application(code) => *code,
        }
    }

    /// Get the canonical message for the predefined codes.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "Parse error",
            ErrorCode::InvalidRequest => "Invalid Request",
            ErrorCode::MethodNotFound => "Method not found",
            ErrorCode::InvalidParams => "Invalid params",
            ErrorCode::InternalError => "Internal error",
            ErrorCode::ServerError(_) => "Server error",
            ErrorCode::Application(_) => "Application error",
        }
    }
}

impl From<i64> for ErrorCode {
    fn from(code: i64) -> Self {
        match code {
            -32700 => ErrorCode::ParseError,
            -32600 => ErrorCode::InvalidRequest,
            -32601 => ErrorCode::MethodNotFound,
            -32602 => ErrorCode::InvalidParams,
            -32603 => ErrorCode::InternalError,
            -32099..=-32000 => ErrorCode::ServerError(code),
            other => ErrorCode::Application(other),
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.code())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i64::deserialize(deserializer).map(ErrorCode::from)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}

/// A JSON-RPC error object.
///
/// Servers are not always strict about the shape, so `message` defaults to
/// an empty string and `data` is optional.
///
/// # Example
///
/// ```
/// use jsonrpc_http_core::{ErrorCode, JsonRpcError};
///
/// let err: JsonRpcError = serde_json::from_str(r#"{"code":-32000}"#).unwrap();
/// assert_eq!(err.code(), ErrorCode::ServerError(-32000));
/// assert_eq!(err.message(), "");
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("JSON-RPC error {code}: {message}")]
pub struct JsonRpcError {
    code: ErrorCode,
    #[serde(default)]
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl JsonRpcError {
    /// Create a new error object.
    pub fn new<S: Into<String>>(code: ErrorCode, message: S) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured data.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the structured data, if any.
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }
}

/// Errors raised by an [`RpcCodec`](crate::RpcCodec).
///
/// These are codec-level failures (malformed envelope, result-type mismatch).
/// Transports propagate them unchanged and never treat them as a reason to
/// read another response channel.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The request could not be serialized.
    #[error("encode error: {0}")]
    Encode(#[source] serde_json::Error),

    /// The response body is not valid JSON.
    #[error("decode error: {0}")]
    Decode(#[source] serde_json::Error),

    /// The response is JSON but not a JSON-RPC response object.
    #[error("invalid response envelope: {0}")]
    InvalidEnvelope(String),

    /// The `result` member does not have the declared return shape.
    #[error("result type mismatch: {0}")]
    ResultType(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_from_i64() {
        assert_eq!(ErrorCode::from(-32700_i64), ErrorCode::ParseError);
        assert_eq!(ErrorCode::from(-32600_i64), ErrorCode::InvalidRequest);
        assert_eq!(ErrorCode::from(-32601_i64), ErrorCode::MethodNotFound);
        assert_eq!(ErrorCode::from(-32602_i64), ErrorCode::InvalidParams);
        assert_eq!(ErrorCode::from(-32603_i64), ErrorCode::InternalError);
        assert_eq!(ErrorCode::from(-32000_i64), ErrorCode::ServerError(-32000));
        assert_eq!(ErrorCode::from(-32099_i64), ErrorCode::ServerError(-32099));
        assert_eq!(ErrorCode::from(-32100_i64), ErrorCode::Application(-32100));
        assert_eq!(ErrorCode::from(42_i64), ErrorCode::Application(42));
    }

    #[test]
    fn test_error_code_numeric_roundtrip() {
        for code in [-32700_i64, -32600, -32601, -32602, -32603, -32050, 7] {
            assert_eq!(ErrorCode::from(code).code(), code);
        }
    }

    #[test]
    fn test_error_object_lenient_decode() {
        let err: JsonRpcError = serde_json::from_str(r#"{"code":-32601}"#).unwrap();
        assert_eq!(err.code(), ErrorCode::MethodNotFound);
        assert_eq!(err.message(), "");
        assert!(err.data().is_none());
    }

    #[test]
    fn test_error_object_with_data() {
        let err: JsonRpcError =
            serde_json::from_str(r#"{"code":1001,"message":"boom","data":{"field":"a"}}"#)
                .unwrap();
        assert_eq!(err.code(), ErrorCode::Application(1001));
        assert_eq!(err.message(), "boom");
        assert_eq!(err.data().unwrap()["field"], "a");
    }

    #[test]
    fn test_error_object_serializes_numeric_code() {
        let err = JsonRpcError::new(ErrorCode::InvalidParams, "bad");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json, serde_json::json!({"code": -32602, "message": "bad"}));
    }

    #[test]
    fn test_error_display() {
        let err = JsonRpcError::new(ErrorCode::ServerError(-32000), "overloaded");
        assert_eq!(
            err.to_string(),
            "JSON-RPC error Server error (-32000): overloaded"
        );
    }
}

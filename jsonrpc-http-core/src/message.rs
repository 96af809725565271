//! JSON-RPC wire types and the codec contract.
//!
//! Transports never look inside request or response bodies. They hand the
//! method name and marshalled arguments to an [`RpcCodec`] to obtain request
//! bytes, and hand response bytes back to it to obtain a decoded response.
//! [`JsonRpcCodec`] is the JSON-RPC 2.0 implementation used by default.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CodecError, JsonRpcError};

/// Media type sent in `Content-Type` unless the client is configured otherwise.
pub const JSONRPC_CONTENT_TYPE: &str = "application/json-rpc";

/// JSON-RPC protocol version emitted in requests.
pub const JSONRPC_VERSION: &str = "2.0";

/// Encodes requests and decodes responses for a transport.
///
/// Implementations must be cheap to share: a single codec instance serves all
/// concurrent calls of a client.
pub trait RpcCodec: Send + Sync + 'static {
    /// Decoded response handed back to the caller.
    ///
    /// `Serialize` is required so the response can be recorded on trace spans.
    type Response: Serialize + Send + 'static;

    /// Encode a call of `method` with already-marshalled `params`.
    fn encode_request(&self, method: &str, params: &Value) -> Result<Bytes, CodecError>;

    /// Decode a complete (already decompressed) response body.
    fn decode_response(&self, body: &[u8]) -> Result<Self::Response, CodecError>;
}

/// A JSON-RPC 2.0 request object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
    pub id: Value,
}

/// A decoded JSON-RPC response: either a result or an error object.
#[derive(Clone, Debug, PartialEq)]
pub struct JsonRpcResponse {
    id: Option<Value>,
    outcome: Result<Value, JsonRpcError>,
}

impl JsonRpcResponse {
    /// Create a successful response.
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            id,
            outcome: Ok(result),
        }
    }

    /// Create an error response.
    pub fn failure(id: Option<Value>, error: JsonRpcError) -> Self {
        Self {
            id,
            outcome: Err(error),
        }
    }

    /// The response id, when the server echoed one.
    pub fn id(&self) -> Option<&Value> {
        self.id.as_ref()
    }

    /// Returns true if the response carries an error object.
    pub fn is_error(&self) -> bool {
        self.outcome.is_err()
    }

    /// Get the error object, if any.
    pub fn error(&self) -> Option<&JsonRpcError> {
        self.outcome.as_ref().err()
    }

    /// Get the result value, if any.
    pub fn result(&self) -> Option<&Value> {
        self.outcome.as_ref().ok()
    }

    /// Convert into the result value or the error object.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        self.outcome
    }

    /// Deserialize the result into the declared return shape.
    ///
    /// The outer `Result` reports a shape mismatch; the inner one carries the
    /// server's error object.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<Result<T, JsonRpcError>, CodecError> {
        match self.outcome {
            Ok(value) => serde_json::from_value(value)
                .map(Ok)
                .map_err(CodecError::ResultType),
            Err(error) => Ok(Err(error)),
        }
    }
}

/// Wire shape of a response, before validation.
#[derive(Serialize, Deserialize)]
struct RawResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    jsonrpc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

impl Serialize for JsonRpcResponse {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let raw = RawResponse {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: self.id.clone(),
            result: self.outcome.as_ref().ok().cloned(),
            error: self.outcome.as_ref().err().cloned(),
        };
        raw.serialize(serializer)
    }
}

/// The JSON-RPC 2.0 codec.
///
/// Requests carry a numeric id drawn from a per-codec counter. Responses are
/// decoded leniently: `jsonrpc` and `id` may be absent, but exactly one of
/// `result` and `error` must be present. A `"result": null` member counts as
/// present.
#[derive(Debug)]
pub struct JsonRpcCodec {
    next_id: AtomicU64,
}

impl JsonRpcCodec {
    /// Create a codec whose first request id is 1.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for JsonRpcCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// A clone continues from the current id but counts independently.
impl Clone for JsonRpcCodec {
    fn clone(&self) -> Self {
        Self {
            next_id: AtomicU64::new(self.next_id.load(Ordering::Relaxed)),
        }
    }
}

impl RpcCodec for JsonRpcCodec {
    type Response = JsonRpcResponse;

    fn encode_request(&self, method: &str, params: &Value) -> Result<Bytes, CodecError> {
        let request = JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params: params.clone(),
            id: Value::from(self.next_id.fetch_add(1, Ordering::Relaxed)),
        };
        serde_json::to_vec(&request)
            .map(Bytes::from)
            .map_err(CodecError::Encode)
    }

    fn decode_response(&self, body: &[u8]) -> Result<Self::Response, CodecError> {
        let value: Value = serde_json::from_slice(body).map_err(CodecError::Decode)?;
        let Value::Object(mut object) = value else {
            return Err(CodecError::InvalidEnvelope(
                "response is not a JSON object".to_string(),
            ));
        };

        let id = object.remove("id").filter(|id| !id.is_null());
        match (object.remove("result"), object.remove("error")) {
            (Some(_), Some(error)) if !error.is_null() => Err(CodecError::InvalidEnvelope(
                "response carries both result and error".to_string(),
            )),
            (_, Some(error)) if !error.is_null() => {
                let error: JsonRpcError =
                    serde_json::from_value(error).map_err(CodecError::Decode)?;
                Ok(JsonRpcResponse::failure(id, error))
            }
            (Some(result), _) => Ok(JsonRpcResponse::success(id, result)),
            (None, _) => Err(CodecError::InvalidEnvelope(
                "response carries neither result nor error".to_string(),
            )),
        }
    }
}

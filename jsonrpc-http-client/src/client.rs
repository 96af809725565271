//! JSON-RPC client.
//!
//! [`JsonRpcClient`] drives one call through
//! `Idle → Resolving → Connecting → Sending → Reading → Closed`, moving to
//! `Failed` from whichever state an error occurs in. The exchange is closed
//! and the trace span finished on every exit path, including when the call
//! future is dropped.

use std::fmt;
use std::sync::Arc;

use http::HeaderMap;
use jsonrpc_http_core::{CodecError, JsonRpcCodec, RpcCodec};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::builder::ClientBuilder;
use crate::config::{CallOptions, ClientConfig};
use crate::error::ClientError;
use crate::exchange::Exchange;
use crate::reader::ResponseReader;
use crate::tracer::{CLIENT_RECV, CLIENT_SEND, PARAMS_TAG, RESULT_TAG};

/// Where a call is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Resolving,
    Connecting,
    Sending,
    Reading,
    Closed,
    Failed,
}

impl CallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Idle => "idle",
            CallState::Resolving => "resolving",
            CallState::Connecting => "connecting",
            CallState::Sending => "sending",
            CallState::Reading => "reading",
            CallState::Closed => "closed",
            CallState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Closed | CallState::Failed)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call state. Never shared between calls.
struct CallContext<'a> {
    method: &'a str,
    state: CallState,
}

impl<'a> CallContext<'a> {
    fn new(method: &'a str) -> Self {
        Self {
            method,
            state: CallState::Idle,
        }
    }

    fn transition(&mut self, next: CallState) {
        #[cfg(feature = "tracing")]
        tracing::trace!(method = self.method, from = %self.state, to = %next, "call state");
        #[cfg(not(feature = "tracing"))]
        let _ = self.method;
        self.state = next;
    }

    fn fail(&mut self, error: ClientError) -> ClientError {
        self.transition(CallState::Failed);
        error
    }
}

/// JSON-RPC over HTTP client.
///
/// Cheap to clone; clones share the configuration, the codec and the
/// connection pool. Concurrent calls only read shared state.
///
/// # Example
///
/// ```ignore
/// use jsonrpc_http_client::JsonRpcClient;
/// use serde_json::json;
///
/// let client = JsonRpcClient::builder("http://svc.local/rpc").build()?;
///
/// let sum: i64 = client.call("add", &json!({"a": 1, "b": 2})).await?;
/// ```
pub struct JsonRpcClient<C = JsonRpcCodec> {
    inner: Arc<ClientInner<C>>,
}

struct ClientInner<C> {
    config: ClientConfig,
    codec: C,
}

impl<C> Clone for JsonRpcClient<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> fmt::Debug for JsonRpcClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonRpcClient")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl JsonRpcClient {
    /// Start building a client for a static URL.
    pub fn builder<S: Into<String>>(url: S) -> ClientBuilder {
        ClientBuilder::new().url(url)
    }

    /// Start building a client for a service resolved through discovery.
    pub fn for_service<S: Into<String>, P: Into<String>>(service_id: S, path: P) -> ClientBuilder {
        ClientBuilder::new().service(service_id, path)
    }

    /// Call `method` and deserialize its result.
    ///
    /// A JSON-RPC error object in the response becomes [`ClientError::Rpc`].
    pub async fn call<P, R>(&self, method: &str, params: &P) -> Result<R, ClientError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.call_with_options(method, params, CallOptions::default())
            .await
    }

    /// Call `method` with per-call options and deserialize its result.
    pub async fn call_with_options<P, R>(
        &self,
        method: &str,
        params: &P,
        options: CallOptions,
    ) -> Result<R, ClientError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params).map_err(CodecError::Encode)?;
        let response = self.invoke_with_options(method, &params, options).await?;
        response.into_typed::<R>()?.map_err(ClientError::Rpc)
    }
}

impl<C: RpcCodec> JsonRpcClient<C> {
    pub(crate) fn from_parts(config: ClientConfig, codec: C) -> Self {
        Self {
            inner: Arc::new(ClientInner { config, codec }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn codec(&self) -> &C {
        &self.inner.codec
    }

    /// Invoke `method` with already marshalled `params`.
    pub async fn invoke(&self, method: &str, params: &Value) -> Result<C::Response, ClientError> {
        self.invoke_with_options(method, params, CallOptions::default())
            .await
    }

    /// Invoke `method` with per-call headers and an optional parent span.
    pub async fn invoke_with_options(
        &self,
        method: &str,
        params: &Value,
        options: CallOptions,
    ) -> Result<C::Response, ClientError> {
        let call = self.execute(method, params, options);

        #[cfg(feature = "tracing")]
        let call = tracing::Instrument::instrument(
            call,
            tracing::info_span!(
                "rpc.call",
                rpc.method = %method,
                rpc.service = %self.service_label(),
                otel.kind = "client",
            ),
        );

        call.await
    }

    #[cfg(feature = "tracing")]
    fn service_label(&self) -> String {
        match self.inner.config.resolver.target() {
            crate::resolver::Target::Static(endpoint) => endpoint.to_string(),
            crate::resolver::Target::Service { service_id, .. } => service_id.clone(),
        }
    }

    async fn execute(
        &self,
        method: &str,
        params: &Value,
        options: CallOptions,
    ) -> Result<C::Response, ClientError> {
        let config = &self.inner.config;
        let mut call = CallContext::new(method);

        call.transition(CallState::Resolving);
        let endpoint = config
            .resolver
            .resolve()
            .await
            .map_err(|e| call.fail(e))?;

        call.transition(CallState::Connecting);
        config
            .connections
            .prepare(&endpoint)
            .map_err(|e| call.fail(e))?;

        let span_name = config.resolver.service_id().unwrap_or(method);
        let mut span = config
            .propagator
            .start_span(span_name, options.parent_span.as_ref());
        if span.is_open() {
            span.tag(PARAMS_TAG, params.to_string());
        }

        let mut trace_headers = HeaderMap::new();
        config.propagator.to_headers(span.context(), &mut trace_headers);
        let headers = config.compose_headers(&trace_headers, &options.headers);

        call.transition(CallState::Sending);
        let body = self
            .inner
            .codec
            .encode_request(method, params)
            .map_err(|e| call.fail(e.into()))?;

        #[cfg(feature = "tracing")]
        tracing::debug!(endpoint = %endpoint, headers = ?headers, "sending request");

        span.event(CLIENT_SEND);
        let mut exchange = config
            .connections
            .open(&endpoint, &headers, body)
            .await
            .map_err(|e| call.fail(e))?;

        call.transition(CallState::Reading);
        let result = ResponseReader::new(&self.inner.codec)
            .max_size(config.connections.max_response_size())
            .read(&mut exchange)
            .await;
        exchange.close();
        span.event(CLIENT_RECV);

        match result {
            Ok(response) => {
                if span.is_open() {
                    if let Ok(text) = serde_json::to_string(&response) {
                        span.tag(RESULT_TAG, text);
                    }
                }
                span.close();
                call.transition(CallState::Closed);
                Ok(response)
            }
            Err(error) => {
                span.close();
                Err(call.fail(error))
            }
        }
    }
}

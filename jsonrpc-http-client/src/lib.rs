//! JSON-RPC over HTTP client for Rust.
//!
//! This crate invokes remote procedures encoded as JSON-RPC requests over
//! HTTP POST. A client targets either a fixed URL or a logical service id
//! that is resolved through a pluggable [`ServiceRegistry`] on every call.
//!
//! ## Features
//!
//! - Static endpoints or per-call discovery with context-path support
//! - Connect and read timeouts, a plain-HTTP forward proxy, TLS via rustls
//! - Redirect following (same scheme, bounded hops)
//! - Transparent gzip response decompression on both response channels
//! - Fallback from the success channel to the error channel, so JSON-RPC
//!   error bodies sent with a non-2xx status are still decoded
//! - Trace span propagation through B3-style headers
//!
//! ## Example
//!
//! ```ignore
//! use jsonrpc_http_client::JsonRpcClient;
//! use serde_json::json;
//!
//! let client = JsonRpcClient::builder("http://svc.local/rpc").build()?;
//!
//! // Typed call: JSON-RPC error objects become `ClientError::Rpc`.
//! let sum: i64 = client.call("add", &json!({"a": 1, "b": 2})).await?;
//!
//! // Untyped call: the decoded response is returned as is.
//! let response = client.invoke("add", &json!({"a": 1, "b": 2})).await?;
//! if let Some(error) = response.error() {
//!     eprintln!("server error {}: {}", error.code(), error.message());
//! }
//! ```
//!
//! ## Discovery Example
//!
//! ```ignore
//! use jsonrpc_http_client::{JsonRpcClient, LogTracer, ServiceInstance, StaticRegistry};
//!
//! let registry = StaticRegistry::builder()
//!     .instance(
//!         "calc-service",
//!         ServiceInstance::new("10.0.0.5", 8080).with_context_path("/v2"),
//!     )
//!     .build();
//!
//! // Calls go to http://10.0.0.5:8080/v2/jsonrpc/add
//! let client = JsonRpcClient::for_service("calc-service", "add")
//!     .registry(registry)
//!     .tracer(LogTracer::new().process_id("billing-1"))
//!     .build()?;
//! ```
//!
//! ## Errors
//!
//! Every failure is terminal for its call; nothing is retried.
//!
//! - [`ClientError::Configuration`] - a service id without a registry, or an
//!   `https` endpoint that cannot be reached with the configured transport.
//!   Raised before any network activity.
//! - [`ClientError::Resolution`] - discovery found no live instance.
//! - [`ClientError::Transport`] - connect, write or read failure, including
//!   timeouts.
//! - [`ClientError::Protocol`] - neither response channel decoded; carries
//!   the raw error-channel bytes.
//! - [`ClientError::Codec`] - codec failure, propagated unchanged.
//! - [`ClientError::Rpc`] - a JSON-RPC error object, from the typed
//!   [`JsonRpcClient::call`] helper.
//!
//! ## Cancellation
//!
//! Calls are futures. Dropping one releases its connection and closes its
//! trace span, so `tokio::time::timeout` or `tokio::select!` cancel a call
//! cleanly.
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `tls` (default) | `tls-ring` + `tls-native-roots` |
//! | `tls-ring` / `tls-aws-lc` | rustls crypto provider |
//! | `tls-native-roots` / `tls-webpki-roots` | Root certificates |
//! | `compression-deflate` / `compression-br` / `compression-zstd` | Response encodings beyond gzip |
//! | `compression-full` | All response encodings |
//! | `tracing` (default) | Logging of calls, state transitions and closed spans |
//!
//! When `tracing` is enabled, each call runs in an `rpc.call` span with:
//! - `rpc.method`: the JSON-RPC method name
//! - `rpc.service`: the service id, or the static endpoint
//! - `otel.kind`: "client"

mod builder;
mod catalog;
mod client;
pub mod config;
mod error;
pub mod exchange;
pub mod reader;
pub mod resolver;
pub mod tracer;
pub mod transport;

pub use builder::ClientBuilder;
pub use catalog::{CatalogTarget, ServiceCatalog, ServiceCatalogBuilder};
pub use client::{CallState, JsonRpcClient};
pub use config::{CallOptions, ClientConfig, ClientSettings};
pub use error::{ClientBuildError, ClientError};
pub use exchange::{Exchange, HttpExchange};
pub use reader::ResponseReader;
pub use resolver::{
    CONTEXT_PATH_METADATA, Endpoint, EndpointResolver, RegistryError, ServiceInstance,
    ServiceRegistry, StaticRegistry, StaticRegistryBuilder, Target,
};
pub use tracer::{LogTracer, Span, SpanGuard, TracePropagator, Tracer};
pub use transport::{ConnectionManager, ConnectionManagerBuilder, TlsClientConfig, TlsOptions};

// Re-export core types for convenience
pub use jsonrpc_http_core::{
    CodecError, ContentEncoding, ErrorCode, JSONRPC_CONTENT_TYPE, JsonRpcCodec, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, RpcCodec, TraceContext, TraceHeaderError, TraceHeaderNames,
};

// Re-export bytes for convenience
pub use bytes::Bytes;

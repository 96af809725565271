//! Call options for per-request configuration.
//!
//! This module provides [`CallOptions`] for attaching extra headers and a
//! parent trace span to individual calls.

use http::{HeaderMap, HeaderName, HeaderValue};
use jsonrpc_http_core::TraceContext;

/// Options for configuring individual RPC calls.
///
/// Extra headers are applied last, after the content type, the client's
/// default headers and the trace headers, and win on any key they share.
///
/// # Example
///
/// ```ignore
/// use http::{HeaderName, HeaderValue};
/// use jsonrpc_http_client::CallOptions;
///
/// let options = CallOptions::new()
///     .header(
///         HeaderName::from_static("authorization"),
///         HeaderValue::from_static("Bearer token123"),
///     )
///     .try_header("x-request-id", "abc-123")
///     .unwrap_or_default();
///
/// let response = client.invoke_with_options("add", &params, options).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub(crate) headers: HeaderMap,
    pub(crate) parent_span: Option<TraceContext>,
}

impl CallOptions {
    /// Create new default call options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header for this call, replacing earlier values for `name`.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Try to add a header for this call.
    ///
    /// Returns `None` if the header name or value is invalid.
    pub fn try_header<K, V>(mut self, name: K, value: V) -> Option<Self>
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        let name = name.try_into().ok()?;
        let value = value.try_into().ok()?;
        self.headers.insert(name, value);
        Some(self)
    }

    /// Set all extra headers for this call, replacing any existing ones.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Get a reference to the extra headers.
    pub fn get_headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a mutable reference to the extra headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Make the call's span a child of `parent`, typically a context
    /// recovered from an inbound request.
    pub fn parent_span(mut self, parent: TraceContext) -> Self {
        self.parent_span = Some(parent);
        self
    }

    pub fn get_parent_span(&self) -> Option<&TraceContext> {
        self.parent_span.as_ref()
    }
}

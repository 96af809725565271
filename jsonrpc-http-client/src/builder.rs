//! Client builder.
//!
//! Provides a fluent API for configuring and building a [`JsonRpcClient`].

use std::sync::Arc;
use std::time::Duration;

use http::{HeaderMap, HeaderName, HeaderValue, Uri};
use jsonrpc_http_core::{JSONRPC_CONTENT_TYPE, JsonRpcCodec, RpcCodec, TraceHeaderNames};

use crate::client::JsonRpcClient;
use crate::config::{ClientConfig, ClientSettings};
use crate::error::ClientBuildError;
use crate::resolver::{Endpoint, EndpointResolver, ServiceRegistry, Target};
use crate::tracer::{TracePropagator, Tracer};
use crate::transport::{
    ConnectionManager, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_REDIRECTS, DEFAULT_MAX_RESPONSE_SIZE,
    DEFAULT_READ_TIMEOUT, TlsClientConfig, TlsOptions,
};

/// Builder for creating a [`JsonRpcClient`].
///
/// A client targets either a static URL or a service id resolved through a
/// [`ServiceRegistry`] on every call. Setting both, or neither, fails at
/// [`build`](Self::build).
///
/// # Example
///
/// ```ignore
/// use jsonrpc_http_client::{JsonRpcClient, StaticRegistry, ServiceInstance, LogTracer};
/// use std::time::Duration;
///
/// let registry = StaticRegistry::builder()
///     .instance("calc-service", ServiceInstance::new("10.0.0.5", 8080))
///     .build();
///
/// let client = JsonRpcClient::for_service("calc-service", "calculator")
///     .registry(registry)
///     .tracer(LogTracer::new())
///     .header("x-caller", "billing")
///     .read_timeout(Duration::from_secs(10))
///     .build()?;
/// ```
pub struct ClientBuilder<C = JsonRpcCodec> {
    url: Option<String>,
    service_id: Option<String>,
    service_path: String,
    content_type: String,
    headers: Vec<(String, String)>,
    typed_headers: HeaderMap,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    proxy: Option<String>,
    tls: TlsOptions,
    registry: Option<Arc<dyn ServiceRegistry>>,
    tracer: Option<Arc<dyn Tracer>>,
    trace_header_names: TraceHeaderNames,
    follow_redirects: bool,
    max_redirects: usize,
    max_response_size: Option<usize>,
    codec: C,
}

impl<C> std::fmt::Debug for ClientBuilder<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("url", &self.url)
            .field("service_id", &self.service_id)
            .field("service_path", &self.service_path)
            .field("content_type", &self.content_type)
            .field("headers", &self.headers)
            .field("typed_headers", &self.typed_headers)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("proxy", &self.proxy)
            .field("tls", &self.tls)
            .field("registry", &self.registry.is_some())
            .field("tracer", &self.tracer.is_some())
            .field("follow_redirects", &self.follow_redirects)
            .field("max_redirects", &self.max_redirects)
            .field("max_response_size", &self.max_response_size)
            .finish()
    }
}

impl<C: Clone> Clone for ClientBuilder<C> {
    fn clone(&self) -> Self {
        Self {
            url: self.url.clone(),
            service_id: self.service_id.clone(),
            service_path: self.service_path.clone(),
            content_type: self.content_type.clone(),
            headers: self.headers.clone(),
            typed_headers: self.typed_headers.clone(),
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            proxy: self.proxy.clone(),
            tls: self.tls.clone(),
            registry: self.registry.clone(),
            tracer: self.tracer.clone(),
            trace_header_names: self.trace_header_names.clone(),
            follow_redirects: self.follow_redirects,
            max_redirects: self.max_redirects,
            max_response_size: self.max_response_size,
            codec: self.codec.clone(),
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    /// Create a builder with no target and the default settings.
    pub fn new() -> Self {
        Self {
            url: None,
            service_id: None,
            service_path: String::new(),
            content_type: JSONRPC_CONTENT_TYPE.to_string(),
            headers: Vec::new(),
            typed_headers: HeaderMap::new(),
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            proxy: None,
            tls: TlsOptions::default(),
            registry: None,
            tracer: None,
            trace_header_names: TraceHeaderNames::default(),
            follow_redirects: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_response_size: Some(DEFAULT_MAX_RESPONSE_SIZE),
            codec: JsonRpcCodec::new(),
        }
    }

    /// Create a builder from loaded settings.
    ///
    /// Collaborators that cannot be expressed as data, such as the registry
    /// and the tracer, are added afterwards.
    pub fn from_settings(settings: &ClientSettings) -> Self {
        let mut builder = Self::new();
        builder.url = settings.url.clone();
        builder.service_id = settings.service_id.clone();
        builder.service_path = settings.service_path.clone().unwrap_or_default();
        if let Some(content_type) = &settings.content_type {
            builder.content_type = content_type.clone();
        }
        builder.headers = settings
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        if let Some(timeout) = settings.connect_timeout() {
            builder.connect_timeout = timeout;
        }
        if let Some(timeout) = settings.read_timeout() {
            builder.read_timeout = timeout;
        }
        builder.proxy = settings.proxy.clone();
        if let Some(follow) = settings.follow_redirects {
            builder.follow_redirects = follow;
        }
        if let Some(max) = settings.max_redirects {
            builder.max_redirects = max;
        }
        if let Some(max) = settings.max_response_size() {
            builder.max_response_size = max;
        }
        builder.tls.danger_accept_invalid_hostnames = settings.danger_accept_invalid_hostnames;
        builder.tls.danger_accept_invalid_certs = settings.danger_accept_invalid_certs;
        builder
    }
}

impl<C: RpcCodec> ClientBuilder<C> {
    /// Target a static URL.
    pub fn url<S: Into<String>>(mut self, url: S) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Target a logical service resolved through discovery.
    ///
    /// `path` is the service's logical path; the `/jsonrpc/` prefix and the
    /// instance's context path are added at resolution time.
    pub fn service<S: Into<String>, P: Into<String>>(mut self, service_id: S, path: P) -> Self {
        self.service_id = Some(service_id.into());
        self.service_path = path.into();
        self
    }

    /// Set the `Content-Type` of requests. Defaults to `application/json-rpc`.
    pub fn content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Add a default header. Validated at [`build`](Self::build); a later
    /// value for the same name replaces an earlier one.
    pub fn header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add default headers that are already typed. Applied after the
    /// string headers.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        crate::config::overlay(&mut self.typed_headers, &headers);
        self
    }

    /// Bound TCP connection establishment. Defaults to 60 seconds; `None`
    /// waits indefinitely.
    pub fn connect_timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.connect_timeout = timeout.into();
        self
    }

    /// Bound waiting for the response and reading it. Defaults to 120
    /// seconds; `None` waits indefinitely.
    pub fn read_timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.read_timeout = timeout.into();
        self
    }

    /// Route plain-HTTP calls through a forward proxy, `http://host:port`.
    pub fn proxy<S: Into<String>>(mut self, proxy: S) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Use a complete rustls configuration for `https` endpoints.
    pub fn tls_config(mut self, config: TlsClientConfig) -> Self {
        self.tls.config = Some(config);
        self
    }

    /// Accept certificates whose names do not match the host.
    pub fn danger_accept_invalid_hostnames(mut self, accept: bool) -> Self {
        self.tls.danger_accept_invalid_hostnames = accept;
        self
    }

    /// Accept any server certificate.
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.tls.danger_accept_invalid_certs = accept;
        self
    }

    /// Set the discovery registry used to resolve a service id.
    pub fn registry<R: ServiceRegistry + 'static>(mut self, registry: R) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    /// Set the tracer. Without one, calls only carry the not-sampled marker.
    pub fn tracer<T: Tracer + 'static>(mut self, tracer: T) -> Self {
        self.tracer = Some(Arc::new(tracer));
        self
    }

    /// Override the trace header names.
    pub fn trace_header_names(mut self, names: TraceHeaderNames) -> Self {
        self.trace_header_names = names;
        self
    }

    /// Enable or disable following redirects. Enabled by default.
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    /// Limit the number of redirects followed per call. Defaults to 10.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    /// Limit the size of a response body, as received and once
    /// decompressed. Defaults to 4 MiB; `None` removes the limit.
    pub fn max_response_size(mut self, max: impl Into<Option<usize>>) -> Self {
        self.max_response_size = max.into();
        self
    }

    /// Use a different codec.
    pub fn codec<C2: RpcCodec>(self, codec: C2) -> ClientBuilder<C2> {
        ClientBuilder {
            url: self.url,
            service_id: self.service_id,
            service_path: self.service_path,
            content_type: self.content_type,
            headers: self.headers,
            typed_headers: self.typed_headers,
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            proxy: self.proxy,
            tls: self.tls,
            registry: self.registry,
            tracer: self.tracer,
            trace_header_names: self.trace_header_names,
            follow_redirects: self.follow_redirects,
            max_redirects: self.max_redirects,
            max_response_size: self.max_response_size,
            codec,
        }
    }

    /// Build the client.
    ///
    /// A service id without a registry is accepted here and reported as
    /// [`ClientError::Configuration`](crate::ClientError::Configuration) by
    /// every call.
    pub fn build(self) -> Result<JsonRpcClient<C>, ClientBuildError> {
        let target = match (self.url, self.service_id) {
            (Some(url), None) => Target::Static(Endpoint::parse(&url)?),
            (None, Some(service_id)) => Target::Service {
                service_id,
                path: self.service_path,
            },
            (Some(_), Some(_)) => {
                return Err(ClientBuildError::InvalidTarget(
                    "a static url and a service id are mutually exclusive".to_string(),
                ));
            }
            (None, None) => {
                return Err(ClientBuildError::InvalidTarget(
                    "either a url or a service id is required".to_string(),
                ));
            }
        };

        let content_type =
            HeaderValue::from_str(&self.content_type).map_err(|e| ClientBuildError::InvalidHeader {
                name: http::header::CONTENT_TYPE.to_string(),
                reason: e.to_string(),
            })?;

        let mut default_headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let invalid = |reason: String| ClientBuildError::InvalidHeader {
                name: name.clone(),
                reason,
            };
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
            let header_value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
            default_headers.insert(header_name, header_value);
        }
        crate::config::overlay(&mut default_headers, &self.typed_headers);

        let proxy = self.proxy.as_deref().map(parse_proxy).transpose()?;

        let connections = ConnectionManager::builder()
            .connect_timeout(self.connect_timeout)
            .read_timeout(self.read_timeout)
            .proxy(proxy)
            .tls(self.tls)
            .follow_redirects(self.follow_redirects)
            .max_redirects(self.max_redirects)
            .max_response_size(self.max_response_size)
            .build()?;

        let config = ClientConfig {
            content_type,
            default_headers,
            resolver: EndpointResolver::new(target, self.registry),
            propagator: TracePropagator::new(self.tracer, self.trace_header_names),
            connections,
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            target_endpoint = ?config.resolver.target(),
            tls = config.connections.supports_tls(),
            tracer = config.propagator.is_enabled(),
            "built json-rpc client"
        );

        Ok(JsonRpcClient::from_parts(config, self.codec))
    }
}

fn parse_proxy(proxy: &str) -> Result<Uri, ClientBuildError> {
    let invalid = |reason: String| ClientBuildError::InvalidProxy {
        proxy: proxy.to_string(),
        reason,
    };
    let uri: Uri = proxy.parse().map_err(|e: http::uri::InvalidUri| invalid(e.to_string()))?;
    if uri.scheme_str() != Some("http") {
        return Err(invalid("only http:// proxies are supported".to_string()));
    }
    if uri.authority().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(uri)
}

//! Endpoint resolution and the discovery SPI.
//!
//! A client targets either a fixed URL or a logical service id. In the second
//! case every call asks a [`ServiceRegistry`] for a live instance and builds
//! the request URL from the instance address, its `context-path` metadata and
//! the `/jsonrpc/` service path. Nothing is cached between calls.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use http::Uri;
use http::uri::{Authority, PathAndQuery, Scheme};
use jsonrpc_http_core::request_path;

use crate::error::{ClientBuildError, ClientError};

/// Metadata key an instance uses to advertise its context path.
pub const CONTEXT_PATH_METADATA: &str = "context-path";

/// A concrete, connectable request target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    uri: Uri,
}

impl Endpoint {
    /// Parse an absolute `http` or `https` URL.
    pub fn parse(url: &str) -> Result<Self, ClientBuildError> {
        let invalid = |reason: &str| ClientBuildError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };
        let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| invalid(&e.to_string()))?;
        Self::from_uri(uri).map_err(|reason| invalid(&reason))
    }

    /// Wrap an already parsed URI.
    ///
    /// The URI must be absolute with an `http` or `https` scheme.
    pub fn from_uri(uri: Uri) -> Result<Self, String> {
        match uri.scheme_str() {
            Some("http") | Some("https") => {}
            Some(other) => return Err(format!("unsupported scheme {other:?}")),
            None => return Err("missing scheme".to_string()),
        }
        if uri.host().is_none_or(str::is_empty) {
            return Err("missing host".to_string());
        }
        Ok(Self { uri })
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn scheme(&self) -> &str {
        self.uri.scheme_str().unwrap_or("http")
    }

    pub fn host(&self) -> &str {
        self.uri.host().unwrap_or_default()
    }

    /// Explicit port, or the scheme default.
    pub fn port(&self) -> u16 {
        self.uri
            .port_u16()
            .unwrap_or(if self.is_secure() { 443 } else { 80 })
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    pub fn is_secure(&self) -> bool {
        self.scheme() == "https"
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri)
    }
}

impl From<Endpoint> for Uri {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.uri
    }
}

/// A live instance of a service, as reported by a registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceInstance {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub metadata: HashMap<String, String>,
}

impl ServiceInstance {
    /// Create a plain-HTTP instance with no metadata.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            secure: false,
            metadata: HashMap::new(),
        }
    }

    /// Use `https` for this instance.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set the advertised context path.
    pub fn with_context_path(self, context_path: impl Into<String>) -> Self {
        self.with_metadata(CONTEXT_PATH_METADATA, context_path)
    }

    /// The advertised context path, or `""`.
    pub fn context_path(&self) -> &str {
        self.metadata
            .get(CONTEXT_PATH_METADATA)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Build the endpoint for `logical_path` on this instance.
    pub fn endpoint(&self, logical_path: &str) -> Result<Endpoint, RegistryError> {
        let invalid = |reason: String| {
            RegistryError::InvalidInstance(format!("{}:{}: {reason}", self.host, self.port))
        };

        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        let authority: Authority = format!("{host}:{}", self.port)
            .parse()
            .map_err(|e: http::uri::InvalidUri| invalid(e.to_string()))?;
        let path: PathAndQuery = request_path(self.context_path(), logical_path)
            .parse()
            .map_err(|e: http::uri::InvalidUri| invalid(e.to_string()))?;
        let scheme = if self.secure { Scheme::HTTPS } else { Scheme::HTTP };

        let uri = Uri::builder()
            .scheme(scheme)
            .authority(authority)
            .path_and_query(path)
            .build()
            .map_err(|e| invalid(e.to_string()))?;
        Endpoint::from_uri(uri).map_err(invalid)
    }
}

/// Errors reported by a registry backend.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The backend could not be reached.
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    /// The backend failed while answering.
    #[error("registry backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The instance returned cannot be turned into an endpoint.
    #[error("invalid service instance {0}")]
    InvalidInstance(String),
}

/// Discovery capability: maps a service id to a live instance.
///
/// `Ok(None)` means the registry answered but knows no live instance.
pub trait ServiceRegistry: Send + Sync {
    fn lookup<'a>(
        &'a self,
        service_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<ServiceInstance>, RegistryError>>;
}

impl<R: ServiceRegistry + ?Sized> ServiceRegistry for Arc<R> {
    fn lookup<'a>(
        &'a self,
        service_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<ServiceInstance>, RegistryError>> {
        (**self).lookup(service_id)
    }
}

#[derive(Debug)]
struct RegisteredInstance {
    instance: ServiceInstance,
    healthy: AtomicBool,
}

#[derive(Debug, Default)]
struct InstanceSet {
    instances: Vec<RegisteredInstance>,
    counter: AtomicUsize,
}

impl InstanceSet {
    /// Round-robin over healthy instances.
    fn next(&self) -> Option<ServiceInstance> {
        if self.instances.is_empty() {
            return None;
        }

        let len = self.instances.len();
        let start = self.counter.fetch_add(1, Ordering::Relaxed) % len;
        for i in 0..len {
            let entry = &self.instances[(start + i) % len];
            if entry.healthy.load(Ordering::Acquire) {
                return Some(entry.instance.clone());
            }
        }
        None
    }
}

/// In-memory registry supplied at startup.
///
/// Instances can be marked unhealthy at runtime; lookups rotate through the
/// healthy ones.
///
/// # Example
///
/// ```
/// use jsonrpc_http_client::{ServiceInstance, StaticRegistry};
///
/// let registry = StaticRegistry::builder()
///     .instance("calc-service", ServiceInstance::new("10.0.0.5", 8080).with_context_path("/v2"))
///     .instance("calc-service", ServiceInstance::new("10.0.0.6", 8080).with_context_path("/v2"))
///     .build();
/// assert_eq!(registry.instances("calc-service").len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct StaticRegistry {
    services: HashMap<String, InstanceSet>,
}

impl StaticRegistry {
    pub fn builder() -> StaticRegistryBuilder {
        StaticRegistryBuilder::default()
    }

    /// All registered instances of a service, healthy or not.
    pub fn instances(&self, service_id: &str) -> Vec<ServiceInstance> {
        self.services
            .get(service_id)
            .map(|set| set.instances.iter().map(|e| e.instance.clone()).collect())
            .unwrap_or_default()
    }

    /// Mark the instance at `host:port` healthy or unhealthy.
    ///
    /// Returns false if no such instance is registered.
    pub fn set_healthy(&self, service_id: &str, host: &str, port: u16, healthy: bool) -> bool {
        let Some(set) = self.services.get(service_id) else {
            return false;
        };
        let mut found = false;
        for entry in &set.instances {
            if entry.instance.host == host && entry.instance.port == port {
                entry.healthy.store(healthy, Ordering::Release);
                found = true;
            }
        }
        found
    }

    /// Pick the next healthy instance of a service.
    pub fn choose(&self, service_id: &str) -> Option<ServiceInstance> {
        self.services.get(service_id).and_then(InstanceSet::next)
    }
}

impl ServiceRegistry for StaticRegistry {
    fn lookup<'a>(
        &'a self,
        service_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<ServiceInstance>, RegistryError>> {
        futures::future::ready(Ok(self.choose(service_id))).boxed()
    }
}

/// Builder for [`StaticRegistry`].
#[derive(Debug, Default)]
pub struct StaticRegistryBuilder {
    services: HashMap<String, Vec<ServiceInstance>>,
}

impl StaticRegistryBuilder {
    /// Register an instance of a service. Instances start healthy.
    pub fn instance(mut self, service_id: impl Into<String>, instance: ServiceInstance) -> Self {
        self.services
            .entry(service_id.into())
            .or_default()
            .push(instance);
        self
    }

    pub fn build(self) -> StaticRegistry {
        let services = self
            .services
            .into_iter()
            .map(|(id, instances)| {
                let instances = instances
                    .into_iter()
                    .map(|instance| RegisteredInstance {
                        instance,
                        healthy: AtomicBool::new(true),
                    })
                    .collect();
                (
                    id,
                    InstanceSet {
                        instances,
                        counter: AtomicUsize::new(0),
                    },
                )
            })
            .collect();
        StaticRegistry { services }
    }
}

/// What a client is pointed at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// A fixed URL, parsed once at build time.
    Static(Endpoint),
    /// A logical service resolved through discovery on every call.
    Service { service_id: String, path: String },
}

/// Turns a [`Target`] into an [`Endpoint`] for one call.
#[derive(Clone)]
pub struct EndpointResolver {
    target: Target,
    registry: Option<Arc<dyn ServiceRegistry>>,
}

impl fmt::Debug for EndpointResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointResolver")
            .field("target", &self.target)
            .field("registry", &self.registry.is_some())
            .finish()
    }
}

impl EndpointResolver {
    pub fn new(target: Target, registry: Option<Arc<dyn ServiceRegistry>>) -> Self {
        Self { target, registry }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// The service id, when the target is a logical service.
    pub fn service_id(&self) -> Option<&str> {
        match &self.target {
            Target::Static(_) => None,
            Target::Service { service_id, .. } => Some(service_id),
        }
    }

    /// Check that every collaborator the target needs is present.
    ///
    /// Performs no I/O.
    pub fn check(&self) -> Result<(), ClientError> {
        match (&self.target, &self.registry) {
            (Target::Service { service_id, .. }, None) => Err(missing_registry(service_id)),
            _ => Ok(()),
        }
    }

    /// Resolve the endpoint for one call.
    pub async fn resolve(&self) -> Result<Endpoint, ClientError> {
        let (service_id, path) = match &self.target {
            Target::Static(endpoint) => return Ok(endpoint.clone()),
            Target::Service { service_id, path } => (service_id, path),
        };
        let Some(registry) = &self.registry else {
            return Err(missing_registry(service_id));
        };

        let resolution = |source| ClientError::Resolution {
            service_id: service_id.clone(),
            source,
        };
        let instance = registry
            .lookup(service_id)
            .await
            .map_err(|e| resolution(Some(e)))?
            .ok_or_else(|| resolution(None))?;
        let endpoint = instance
            .endpoint(path)
            .map_err(|e| resolution(Some(e)))?;

        #[cfg(feature = "tracing")]
        tracing::debug!(service_id = %service_id, endpoint = %endpoint, "resolved endpoint");

        Ok(endpoint)
    }
}

fn missing_registry(service_id: &str) -> ClientError {
    ClientError::configuration(format!(
        "service {service_id:?} is configured but no discovery registry is set"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingRegistry;

    impl ServiceRegistry for FailingRegistry {
        fn lookup<'a>(
            &'a self,
            _service_id: &'a str,
        ) -> BoxFuture<'a, Result<Option<ServiceInstance>, RegistryError>> {
            async { Err(RegistryError::Unavailable("connection refused".into())) }.boxed()
        }
    }

    #[test]
    fn test_round_robin_survives_counter_wrap() {
        let set = InstanceSet {
            instances: (1..=3)
                .map(|port| RegisteredInstance {
                    instance: ServiceInstance::new("10.0.0.1", port),
                    healthy: AtomicBool::new(port == 3),
                })
                .collect(),
            counter: AtomicUsize::new(usize::MAX),
        };

        for _ in 0..4 {
            assert_eq!(set.next().map(|instance| instance.port), Some(3));
        }
    }

    fn calc_registry() -> Arc<dyn ServiceRegistry> {
        Arc::new(
            StaticRegistry::builder()
                .instance(
                    "calc-service",
                    ServiceInstance::new("10.0.0.5", 8080).with_context_path("/v2"),
                )
                .build(),
        )
    }

    #[test]
    fn test_endpoint_parse() {
        let endpoint = Endpoint::parse("http://svc.local/rpc").unwrap();
        assert_eq!(endpoint.scheme(), "http");
        assert_eq!(endpoint.host(), "svc.local");
        assert_eq!(endpoint.port(), 80);
        assert_eq!(endpoint.path(), "/rpc");
        assert_eq!(endpoint.to_string(), "http://svc.local/rpc");

        let endpoint = Endpoint::parse("https://svc.local:8443/rpc?x=1").unwrap();
        assert!(endpoint.is_secure());
        assert_eq!(endpoint.port(), 8443);
        assert_eq!(endpoint.query(), Some("x=1"));
    }

    #[test]
    fn test_endpoint_parse_rejects() {
        assert!(Endpoint::parse("/rpc").is_err());
        assert!(Endpoint::parse("ftp://svc.local/rpc").is_err());
        assert!(Endpoint::parse("not a url").is_err());
    }

    #[test]
    fn test_instance_endpoint() {
        let instance = ServiceInstance::new("10.0.0.5", 8080).with_context_path("/v2");
        let endpoint = instance.endpoint("add").unwrap();
        assert_eq!(endpoint.to_string(), "http://10.0.0.5:8080/v2/jsonrpc/add");
    }

    #[test]
    fn test_instance_endpoint_collapses_slashes() {
        let instance = ServiceInstance::new("svc", 80).with_context_path("//ctx//");
        let endpoint = instance.endpoint("//math//add").unwrap();
        assert_eq!(endpoint.path(), "/ctx/jsonrpc/math/add");
    }

    #[test]
    fn test_instance_endpoint_ipv6_and_secure() {
        let instance = ServiceInstance::new("::1", 8443).secure(true);
        let endpoint = instance.endpoint("add").unwrap();
        assert_eq!(endpoint.to_string(), "https://[::1]:8443/jsonrpc/add");
    }

    #[test]
    fn test_round_robin_skips_unhealthy() {
        let registry = StaticRegistry::builder()
            .instance("svc", ServiceInstance::new("a", 1))
            .instance("svc", ServiceInstance::new("b", 2))
            .instance("svc", ServiceInstance::new("c", 3))
            .build();

        assert_eq!(registry.choose("svc").unwrap().host, "a");
        assert_eq!(registry.choose("svc").unwrap().host, "b");
        assert_eq!(registry.choose("svc").unwrap().host, "c");
        assert_eq!(registry.choose("svc").unwrap().host, "a");

        assert!(registry.set_healthy("svc", "b", 2, false));
        let hosts: Vec<_> = (0..4).map(|_| registry.choose("svc").unwrap().host).collect();
        assert!(!hosts.contains(&"b".to_string()));

        registry.set_healthy("svc", "a", 1, false);
        registry.set_healthy("svc", "c", 3, false);
        assert!(registry.choose("svc").is_none());
        assert!(registry.choose("unknown").is_none());
        assert!(!registry.set_healthy("unknown", "a", 1, false));
    }

    #[tokio::test]
    async fn test_resolve_static_is_unchanged() {
        let endpoint = Endpoint::parse("http://svc.local/rpc").unwrap();
        let resolver = EndpointResolver::new(Target::Static(endpoint.clone()), None);
        assert_eq!(resolver.resolve().await.unwrap(), endpoint);
    }

    #[tokio::test]
    async fn test_resolve_service() {
        let resolver = EndpointResolver::new(
            Target::Service {
                service_id: "calc-service".into(),
                path: "add".into(),
            },
            Some(calc_registry()),
        );
        let endpoint = resolver.resolve().await.unwrap();
        assert_eq!(endpoint.to_string(), "http://10.0.0.5:8080/v2/jsonrpc/add");
    }

    #[tokio::test]
    async fn test_resolve_without_registry_is_configuration_error() {
        let resolver = EndpointResolver::new(
            Target::Service {
                service_id: "calc-service".into(),
                path: "add".into(),
            },
            None,
        );
        assert!(resolver.check().unwrap_err().is_configuration());
        assert!(resolver.resolve().await.unwrap_err().is_configuration());
    }

    #[tokio::test]
    async fn test_resolve_unknown_service() {
        let resolver = EndpointResolver::new(
            Target::Service {
                service_id: "missing".into(),
                path: "add".into(),
            },
            Some(calc_registry()),
        );
        let err = resolver.resolve().await.unwrap_err();
        assert!(matches!(err, ClientError::Resolution { ref service_id, source: None } if service_id == "missing"));
    }

    #[tokio::test]
    async fn test_resolve_backend_failure_keeps_source() {
        let resolver = EndpointResolver::new(
            Target::Service {
                service_id: "calc-service".into(),
                path: "add".into(),
            },
            Some(Arc::new(FailingRegistry)),
        );
        let err = resolver.resolve().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Resolution {
                source: Some(RegistryError::Unavailable(_)),
                ..
            }
        ));
    }
}

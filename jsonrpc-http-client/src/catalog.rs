//! Explicit registry of service clients.
//!
//! A [`ServiceCatalog`] maps interface names to clients built from one
//! template. Every registration is supplied in code at startup.

use std::collections::BTreeMap;

use http::Uri;
use jsonrpc_http_core::{JsonRpcCodec, RpcCodec, class_name_to_path, collapse_slashes};

use crate::builder::ClientBuilder;
use crate::client::JsonRpcClient;
use crate::error::ClientBuildError;
use crate::transport::resolve_location;

/// Where the catalog's services live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CatalogTarget {
    /// Each service is reached at the base URL joined with its path.
    BaseUrl(String),
    /// Each service is resolved through discovery under this service id,
    /// using its path as the logical path.
    Service(String),
}

/// Clients keyed by interface name.
#[derive(Debug)]
pub struct ServiceCatalog<C = JsonRpcCodec> {
    target: CatalogTarget,
    clients: BTreeMap<String, JsonRpcClient<C>>,
}

impl<C: RpcCodec> ServiceCatalog<C> {
    /// Start a catalog whose clients are built from `template`.
    pub fn builder(target: CatalogTarget, template: ClientBuilder<C>) -> ServiceCatalogBuilder<C> {
        ServiceCatalogBuilder {
            target,
            template,
            entries: Vec::new(),
        }
    }

    pub fn target(&self) -> &CatalogTarget {
        &self.target
    }

    /// Get the client registered under `name`.
    pub fn get(&self, name: &str) -> Option<&JsonRpcClient<C>> {
        self.clients.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// Builder for [`ServiceCatalog`].
#[derive(Debug)]
pub struct ServiceCatalogBuilder<C = JsonRpcCodec> {
    target: CatalogTarget,
    template: ClientBuilder<C>,
    entries: Vec<(String, String)>,
}

impl<C: RpcCodec + Clone> ServiceCatalogBuilder<C> {
    /// Register an interface.
    ///
    /// An absent or empty path defaults to the interface name with `.`
    /// replaced by `/`. Registering a name twice keeps the last registration.
    pub fn register<S: Into<String>>(mut self, name: S, path: Option<&str>) -> Self {
        let name = name.into();
        let path = match path {
            Some(path) if !path.is_empty() => path.to_string(),
            _ => class_name_to_path(&name),
        };
        self.entries.push((name, path));
        self
    }

    /// Build one client per registration.
    pub fn build(self) -> Result<ServiceCatalog<C>, ClientBuildError> {
        if let CatalogTarget::BaseUrl(url) = &self.target {
            parse_base(url)?;
        }

        let mut clients = BTreeMap::new();
        for (name, path) in self.entries {
            let builder = match &self.target {
                CatalogTarget::Service(service_id) => {
                    self.template.clone().service(service_id.clone(), path)
                }
                CatalogTarget::BaseUrl(url) => self.template.clone().url(join(url, &path)?),
            };

            #[cfg(feature = "tracing")]
            tracing::debug!(interface = %name, "registering service client");

            clients.insert(name, builder.build()?);
        }

        Ok(ServiceCatalog {
            target: self.target,
            clients,
        })
    }
}

fn parse_base(url: &str) -> Result<Uri, ClientBuildError> {
    let invalid = |reason: String| ClientBuildError::InvalidUrl {
        url: url.to_string(),
        reason,
    };
    let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| invalid(e.to_string()))?;
    if uri.scheme().is_none() || uri.authority().is_none() {
        return Err(invalid("base url must be absolute".to_string()));
    }
    Ok(uri)
}

/// Resolve `path` against `base` the way a relative link is resolved, then
/// collapse duplicate slashes in the result's path.
fn join(url: &str, path: &str) -> Result<String, ClientBuildError> {
    let base = parse_base(url)?;
    let joined = resolve_location(&base, path).ok_or_else(|| ClientBuildError::InvalidUrl {
        url: url.to_string(),
        reason: format!("cannot join path {path:?}"),
    })?;
    let scheme = joined.scheme_str().unwrap_or("http");
    let authority = joined.authority().map(|a| a.as_str()).unwrap_or_default();
    let mut path = collapse_slashes(joined.path());
    if let Some(query) = joined.query() {
        path.push('?');
        path.push_str(query);
    }
    Ok(format!("{scheme}://{authority}{path}"))
}

//! Client configuration.
//!
//! - [`ClientConfig`]: the immutable configuration shared by every call
//! - [`CallOptions`]: per-call headers and parent span
//! - [`ClientSettings`]: serde-loadable settings mapped onto the builder

mod options;
mod settings;

pub use options::CallOptions;
pub use settings::ClientSettings;

use http::{HeaderMap, HeaderValue, header};

use crate::resolver::EndpointResolver;
use crate::tracer::TracePropagator;
use crate::transport::ConnectionManager;

/// Configuration shared by all calls of a client.
///
/// Built once by [`ClientBuilder`](crate::ClientBuilder) and never mutated
/// afterwards, so concurrent calls read it without synchronization.
#[derive(Debug)]
pub struct ClientConfig {
    pub(crate) content_type: HeaderValue,
    pub(crate) default_headers: HeaderMap,
    pub(crate) resolver: EndpointResolver,
    pub(crate) propagator: TracePropagator,
    pub(crate) connections: ConnectionManager,
}

impl ClientConfig {
    pub fn content_type(&self) -> &HeaderValue {
        &self.content_type
    }

    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    pub fn resolver(&self) -> &EndpointResolver {
        &self.resolver
    }

    pub fn propagator(&self) -> &TracePropagator {
        &self.propagator
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// Compose the headers of one call.
    ///
    /// Stages apply in order: content type, default headers, trace headers,
    /// extra headers. A later stage replaces every value an earlier stage set
    /// for the same name.
    pub fn compose_headers(&self, trace: &HeaderMap, extra: &HeaderMap) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, self.content_type.clone());
        overlay(&mut headers, &self.default_headers);
        overlay(&mut headers, trace);
        overlay(&mut headers, extra);
        headers
    }
}

/// Replace the values of every name in `layer`, keeping multi-valued
/// headers intact.
pub(crate) fn overlay(target: &mut HeaderMap, layer: &HeaderMap) {
    for name in layer.keys() {
        target.remove(name);
        for value in layer.get_all(name) {
            target.append(name.clone(), value.clone());
        }
    }
}

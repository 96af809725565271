//! Hyper-based connection manager.
//!
//! [`ConnectionManager`] turns a resolved endpoint, a composed header set and
//! an encoded body into an open [`HttpExchange`]. It owns the connect and read
//! timeouts, the optional forward proxy, the TLS policy and redirect handling.

use std::borrow::Cow;
use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method, Request, StatusCode, Uri, header};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};

use super::connector::{TlsOptions, build_tls_config};
use super::proxy::ProxyConnector;
use crate::error::{ClientBuildError, ClientError};
use crate::exchange::HttpExchange;
use crate::resolver::Endpoint;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(120);

/// Maximum number of redirects followed for one call.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Default limit on a response body, both as received and once decompressed.
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 4 * 1024 * 1024;

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const POOL_MAX_IDLE_PER_HOST: usize = 32;

type HttpsClient = Client<HttpsConnector<ProxyConnector>, Full<Bytes>>;
type PlainClient = Client<ProxyConnector, Full<Bytes>>;

/// The hyper client, with or without TLS support.
#[derive(Clone, Debug)]
enum HyperClient {
    Https(HttpsClient),
    Plain(PlainClient),
}

impl HyperClient {
    async fn request(
        &self,
        request: Request<Full<Bytes>>,
    ) -> Result<http::Response<Incoming>, hyper_util::client::legacy::Error> {
        match self {
            HyperClient::Https(client) => client.request(request).await,
            HyperClient::Plain(client) => client.request(request).await,
        }
    }
}

/// Opens HTTP exchanges.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone, Debug)]
pub struct ConnectionManager {
    client: HyperClient,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    proxy: Option<Uri>,
    follow_redirects: bool,
    max_redirects: usize,
    max_response_size: Option<usize>,
}

impl ConnectionManager {
    /// Create a new builder.
    pub fn builder() -> ConnectionManagerBuilder {
        ConnectionManagerBuilder::new()
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    pub fn proxy(&self) -> Option<&Uri> {
        self.proxy.as_ref()
    }

    /// Largest response body accepted, or `None` if unlimited.
    pub fn max_response_size(&self) -> Option<usize> {
        self.max_response_size
    }

    /// Returns true if `https` endpoints can be reached.
    pub fn supports_tls(&self) -> bool {
        matches!(self.client, HyperClient::Https(_))
    }

    /// Check that `endpoint` can be reached with this configuration.
    ///
    /// Performs no I/O.
    pub fn prepare(&self, endpoint: &Endpoint) -> Result<(), ClientError> {
        if !endpoint.is_secure() {
            return Ok(());
        }
        if self.proxy.is_some() {
            return Err(ClientError::configuration(format!(
                "{endpoint} cannot be reached through an HTTP proxy"
            )));
        }
        if !self.supports_tls() {
            return Err(ClientError::configuration(format!(
                "{endpoint} requires TLS but no crypto provider is available"
            )));
        }
        Ok(())
    }

    /// POST `body` to `endpoint` and wait for the response head.
    ///
    /// Redirects are followed by re-sending the same request to the new
    /// location, as long as the scheme does not change. Once a redirect
    /// leaves the original host or port, credential headers are dropped for
    /// the rest of the call.
    pub async fn open(
        &self,
        endpoint: &Endpoint,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<HttpExchange, ClientError> {
        self.prepare(endpoint)?;

        let mut headers = Cow::Borrowed(headers);
        let mut uri = endpoint.uri().clone();
        let mut hops = 0;
        loop {
            let response = self.send(&uri, &headers, body.clone()).await?;
            let Some(next) = self.redirect_target(&uri, &response) else {
                return Ok(HttpExchange::new(response, self.read_timeout)
                    .with_max_size(self.max_response_size));
            };

            hops += 1;
            if hops > self.max_redirects {
                return Err(ClientError::transport(
                    format!("too many redirects from {endpoint}"),
                    io::Error::other(format!("stopped after {} redirects", self.max_redirects)),
                ));
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(from = %uri, to = %next, status = %response.status(), "following redirect");

            if next.authority() != uri.authority() {
                strip_credentials(headers.to_mut());
            }
            drop(response);
            uri = next;
        }
    }

    async fn send(
        &self,
        uri: &Uri,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<http::Response<Incoming>, ClientError> {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri(uri.clone())
            .body(Full::new(body))
            .map_err(|e| {
                ClientError::transport(
                    format!("failed to build request for {uri}"),
                    io::Error::new(io::ErrorKind::InvalidInput, e),
                )
            })?;
        *request.headers_mut() = headers.clone();

        let sending = self.client.request(request);
        let result = match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, sending).await.map_err(|_| {
                ClientError::transport(
                    format!("no response from {uri}"),
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("timed out after {limit:?} waiting for response"),
                    ),
                )
            })?,
            None => sending.await,
        };

        result.map_err(|e| {
            let message = if e.is_connect() {
                format!("failed to connect to {uri}")
            } else {
                format!("request to {uri} failed")
            };
            ClientError::transport(message, into_io_error(e))
        })
    }

    fn redirect_target<B>(&self, current: &Uri, response: &http::Response<B>) -> Option<Uri> {
        if !self.follow_redirects || !is_redirect(response.status()) {
            return None;
        }
        let location = response.headers().get(header::LOCATION)?.to_str().ok()?;
        let next = resolve_location(current, location)?;
        (next.scheme() == current.scheme()).then_some(next)
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// Resolve a `Location` header value against the request URI.
pub(crate) fn resolve_location(base: &Uri, location: &str) -> Option<Uri> {
    let location = location.trim();
    if location.is_empty() {
        return None;
    }
    if let Ok(uri) = location.parse::<Uri>() {
        if uri.scheme().is_some() && uri.authority().is_some() {
            return Some(uri);
        }
    }

    let scheme = base.scheme()?.clone();
    let authority = base.authority()?.clone();
    let path = if location.starts_with('/') {
        location.to_string()
    } else {
        let base_path = base.path();
        let dir = &base_path[..base_path.rfind('/').map_or(0, |i| i + 1)];
        format!("{}{location}", if dir.is_empty() { "/" } else { dir })
    };
    Uri::builder()
        .scheme(scheme)
        .authority(authority)
        .path_and_query(path)
        .build()
        .ok()
}

/// Remove headers that must not follow a redirect to another origin.
fn strip_credentials(headers: &mut HeaderMap) {
    for name in [header::AUTHORIZATION, header::PROXY_AUTHORIZATION, header::COOKIE] {
        headers.remove(name);
    }
}

/// Keep the most specific I/O error kind found in the source chain.
fn into_io_error(error: hyper_util::client::legacy::Error) -> io::Error {
    let kind = std::iter::successors(error.source(), |&e| e.source())
        .find_map(|e| e.downcast_ref::<io::Error>())
        .map(io::Error::kind)
        .unwrap_or(io::ErrorKind::Other);
    io::Error::new(kind, error)
}

/// Builder for [`ConnectionManager`].
///
/// # Example
///
/// ```ignore
/// use jsonrpc_http_client::transport::ConnectionManager;
/// use std::time::Duration;
///
/// let connections = ConnectionManager::builder()
///     .connect_timeout(Duration::from_secs(5))
///     .read_timeout(Duration::from_secs(30))
///     .build()?;
/// ```
#[derive(Debug)]
pub struct ConnectionManagerBuilder {
    tls: TlsOptions,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    proxy: Option<Uri>,
    follow_redirects: bool,
    max_redirects: usize,
    max_response_size: Option<usize>,
}

impl Default for ConnectionManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManagerBuilder {
    /// Create a builder with the default timeouts and redirect policy.
    pub fn new() -> Self {
        Self {
            tls: TlsOptions::default(),
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            proxy: None,
            follow_redirects: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_response_size: Some(DEFAULT_MAX_RESPONSE_SIZE),
        }
    }

    /// Bound TCP connection establishment. `None` waits indefinitely.
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bound waiting for the response head and reading each body channel.
    /// `None` waits indefinitely.
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Route plain-HTTP requests through a forward proxy.
    pub fn proxy(mut self, proxy: Option<Uri>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Set the TLS policy.
    pub fn tls(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }

    /// Enable or disable following redirects.
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    /// Limit the number of redirects followed for one call.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    /// Limit the size of a response body, before and after decompression.
    /// `None` removes the limit.
    pub fn max_response_size(mut self, max: Option<usize>) -> Self {
        self.max_response_size = max;
        self
    }

    /// Build the connection manager.
    pub fn build(self) -> Result<ConnectionManager, ClientBuildError> {
        let connector = ProxyConnector::new(self.connect_timeout, self.proxy.clone());

        let mut builder = Client::builder(TokioExecutor::new());
        // Required for pool_idle_timeout to take effect.
        builder.pool_timer(TokioTimer::new());
        builder.pool_idle_timeout(POOL_IDLE_TIMEOUT);
        builder.pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST);

        let client = match build_tls_config(&self.tls)? {
            Some(config) => {
                let https = HttpsConnectorBuilder::new()
                    .with_tls_config(config)
                    .https_or_http()
                    .enable_all_versions()
                    .wrap_connector(connector);
                HyperClient::Https(builder.build(https))
            }
            None => HyperClient::Plain(builder.build(connector)),
        };

        Ok(ConnectionManager {
            client,
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            proxy: self.proxy,
            follow_redirects: self.follow_redirects,
            max_redirects: self.max_redirects,
            max_response_size: self.max_response_size,
        })
    }
}

//! Forward-proxy support for plain-HTTP endpoints.
//!
//! [`ProxyConnector`] dials the proxy instead of the origin and marks the
//! connection as proxied, which makes hyper write requests in absolute form.
//! There is no `CONNECT` tunnelling, so `https` origins cannot go through a
//! proxy.

use std::future::Future;
use std::io::{self, IoSlice};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use http::Uri;
use http::uri::Scheme;
use hyper::rt::{Read, ReadBufCursor, Write};
use hyper_util::client::legacy::connect::{Connected, Connection, HttpConnector};
use hyper_util::rt::TokioIo;
use pin_project_lite::pin_project;
use tokio::net::TcpStream;
use tower_service::Service;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// TCP connector that optionally routes through an HTTP forward proxy.
#[derive(Clone, Debug)]
pub struct ProxyConnector {
    http: HttpConnector,
    proxy: Option<Uri>,
}

impl ProxyConnector {
    /// Create a connector with the given connect timeout.
    pub fn new(connect_timeout: Option<Duration>, proxy: Option<Uri>) -> Self {
        let mut http = HttpConnector::new();
        // TLS is layered on top by hyper-rustls.
        http.enforce_http(false);
        http.set_connect_timeout(connect_timeout);
        http.set_nodelay(true);
        Self { http, proxy }
    }

    pub fn proxy(&self) -> Option<&Uri> {
        self.proxy.as_ref()
    }
}

impl Service<Uri> for ProxyConnector {
    type Response = ProxyStream<TokioIo<TcpStream>>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.http.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let (target, proxied) = match &self.proxy {
            Some(_) if dst.scheme() == Some(&Scheme::HTTPS) => {
                let err: BoxError = io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("cannot reach {dst} through an HTTP proxy"),
                )
                .into();
                return Box::pin(async move { Err::<Self::Response, _>(err) });
            }
            Some(proxy) => (proxy.clone(), true),
            None => (dst, false),
        };

        let connecting = self.http.call(target);
        Box::pin(async move {
            let io = connecting.await?;
            Ok::<_, BoxError>(ProxyStream { inner: io, proxied })
        })
    }
}

pin_project! {
    /// A connection that may lead to a proxy rather than the origin.
    #[derive(Debug)]
    pub struct ProxyStream<T> {
        #[pin]
        inner: T,
        proxied: bool,
    }
}

impl<T> ProxyStream<T> {
    pub fn is_proxied(&self) -> bool {
        self.proxied
    }
}

impl<T: Connection> Connection for ProxyStream<T> {
    fn connected(&self) -> Connected {
        self.inner.connected().proxy(self.proxied)
    }
}

impl<T: Read> Read for ProxyStream<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        self.project().inner.poll_read(cx, buf)
    }
}

impl<T: Write> Write for ProxyStream<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.project().inner.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        self.project().inner.poll_write_vectored(cx, bufs)
    }
}

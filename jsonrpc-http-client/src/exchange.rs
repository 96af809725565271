//! One request/response interaction and its two read channels.
//!
//! HTTP routes a success status and a failure status to different channels
//! ("primary" and "error"), yet a JSON-RPC response may arrive on either. An
//! [`Exchange`] exposes both so the response reader can fall back from one to
//! the other.

use std::future::Future;
use std::io;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, StatusCode, header};
use http_body::Body;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use jsonrpc_http_core::ContentEncoding;

/// An open request/response interaction.
///
/// Each channel can be read once. `close` releases the underlying connection
/// and may be called any number of times.
pub trait Exchange: Send {
    /// Encoding declared by the `Content-Encoding` response header.
    fn content_encoding(&self) -> ContentEncoding;

    /// HTTP status, when the transport has one.
    fn status(&self) -> Option<StatusCode>;

    /// Read the complete success channel.
    fn read_primary(&mut self) -> impl Future<Output = io::Result<Bytes>> + Send;

    /// Read the complete error channel.
    fn read_error(&mut self) -> impl Future<Output = io::Result<Bytes>> + Send;

    /// Release the exchange.
    fn close(&mut self);
}

/// An [`Exchange`] over one HTTP response.
///
/// The primary channel is the body of a 2xx response; the error channel is
/// the body of any other response.
#[derive(Debug)]
pub struct HttpExchange<B = Incoming> {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<B>,
    read_timeout: Option<Duration>,
    max_size: Option<usize>,
}

impl<B> HttpExchange<B>
where
    B: Body<Data = Bytes> + Send + Unpin + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    /// Wrap a response. `read_timeout` bounds collecting either channel.
    pub fn new(response: http::Response<B>, read_timeout: Option<Duration>) -> Self {
        let (parts, body) = response.into_parts();
        Self {
            status: parts.status,
            headers: parts.headers,
            body: Some(body),
            read_timeout,
            max_size: None,
        }
    }

    /// Fail a channel read once the body grows past `max_size` bytes.
    pub fn with_max_size(mut self, max_size: Option<usize>) -> Self {
        self.max_size = max_size;
        self
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn is_closed(&self) -> bool {
        self.body.is_none()
    }

    fn take_body(&mut self) -> io::Result<B> {
        self.body.take().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotConnected,
                "response body already consumed or exchange closed",
            )
        })
    }

    async fn collect(&mut self) -> io::Result<Bytes> {
        let body = self.take_body()?;
        let max_size = self.max_size;
        let collecting = async move {
            match max_size {
                Some(max) => Limited::new(body, max).collect().await,
                None => body.collect().await.map_err(Into::into),
            }
        };
        let collected = match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, collecting)
                .await
                .map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("reading response body timed out after {limit:?}"),
                    )
                })?,
            None => collecting.await,
        };
        collected
            .map(|collected| collected.to_bytes())
            .map_err(|err| {
                if err.is::<LengthLimitError>() {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("response body exceeds {} bytes", max_size.unwrap_or_default()),
                    )
                } else {
                    io::Error::other(err)
                }
            })
    }
}

impl<B> Exchange for HttpExchange<B>
where
    B: Body<Data = Bytes> + Send + Unpin + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    fn content_encoding(&self) -> ContentEncoding {
        ContentEncoding::from_header(
            self.headers
                .get(header::CONTENT_ENCODING)
                .and_then(|value| value.to_str().ok()),
        )
    }

    fn status(&self) -> Option<StatusCode> {
        Some(self.status)
    }

    async fn read_primary(&mut self) -> io::Result<Bytes> {
        if !self.status.is_success() {
            return Err(io::Error::other(format!(
                "server returned HTTP status {}",
                self.status
            )));
        }
        self.collect().await
    }

    async fn read_error(&mut self) -> io::Result<Bytes> {
        if self.status.is_success() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no error channel for HTTP status {}", self.status),
            ));
        }
        self.collect().await
    }

    fn close(&mut self) {
        if self.body.take().is_some() {
            #[cfg(feature = "tracing")]
            tracing::trace!(status = %self.status, "exchange closed before body was read");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;

    fn exchange(status: StatusCode, body: &'static [u8]) -> HttpExchange<Full<Bytes>> {
        let response = http::Response::builder()
            .status(status)
            .header(header::CONTENT_ENCODING, "GZIP")
            .body(Full::new(Bytes::from_static(body)))
            .unwrap();
        HttpExchange::new(response, Some(Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn test_success_reads_primary_only() {
        let mut exchange = exchange(StatusCode::OK, b"{}");
        assert_eq!(exchange.status(), Some(StatusCode::OK));
        assert_eq!(exchange.content_encoding(), ContentEncoding::Gzip);
        assert!(exchange.read_error().await.is_err());
        assert_eq!(exchange.read_primary().await.unwrap(), Bytes::from_static(b"{}"));
    }

    #[tokio::test]
    async fn test_failure_status_routes_to_error_channel() {
        let mut exchange = exchange(StatusCode::INTERNAL_SERVER_ERROR, b"oops");
        let err = exchange.read_primary().await.unwrap_err();
        assert!(err.to_string().contains("500"));
        assert_eq!(exchange.read_error().await.unwrap(), Bytes::from_static(b"oops"));
    }

    #[tokio::test]
    async fn test_channel_reads_once() {
        let mut exchange = exchange(StatusCode::OK, b"{}");
        exchange.read_primary().await.unwrap();
        let err = exchange.read_primary().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn test_oversized_body_fails_channel() {
        let mut oversized = exchange(StatusCode::OK, b"0123456789").with_max_size(Some(4));
        let err = oversized.read_primary().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("exceeds 4 bytes"));

        let mut at_limit = exchange(StatusCode::BAD_GATEWAY, b"0123").with_max_size(Some(4));
        assert_eq!(at_limit.read_error().await.unwrap(), Bytes::from_static(b"0123"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut exchange = exchange(StatusCode::OK, b"{}");
        exchange.close();
        exchange.close();
        assert!(exchange.is_closed());
        assert!(exchange.read_primary().await.is_err());
    }
}
